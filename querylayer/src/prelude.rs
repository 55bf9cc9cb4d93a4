//! Convenient re-exports of commonly used types from querylayer.
//!
//! ```ignore
//! use querylayer::prelude::*;
//! ```
//!
//! This provides access to:
//! - The facade (`DocumentManager`, `TableQuery`, `FindOptions`)
//! - Expression building blocks (`Operator`, `Direction`, `JoinKind`, ...)
//! - Relationships, pagination and schema blueprints
//! - Configuration, the connection registry and error types

pub use querylayer_core::{
    document::{Document, DocumentExt},
    error::{DatabaseError, DatabaseResult},
    executor::{BackendKind, QueryExecutor},
    expression::{Connective, Direction, JoinClause, JoinKind, Operator, Predicate, QueryExpression},
    manager::{DocumentManager, FindOptions, TableQuery},
    page::{Page, PaginationParams},
    relationship::{Relationship, RelationshipResolver},
    schema::{AlterOperation, ColumnDefinition, ColumnType, SchemaManager, TableBlueprint},
    validator::DocumentValidator,
};

pub use crate::{
    config::{ConnectionConfig, DatabaseConfig},
    registry::{ConnectionRegistry, ConnectionResolver, DriverTable, NativeClient},
};
