//! Main querylayer crate: one query surface over relational and document stores.
//!
//! This crate is the entry point for applications. It re-exports the core
//! types, wires the bundled drivers into a [`DriverTable`](registry::DriverTable),
//! and owns the connection lifecycle through
//! [`ConnectionRegistry`](registry::ConnectionRegistry).
//!
//! # Features
//!
//! - **Two backend families** - SQL databases and document stores behind the same `TableQuery` API
//! - **Canonical identifiers** - Every row comes back with a string `id`, whatever the store uses natively
//! - **Joins everywhere** - Native SQL joins, emulated joins on document stores, same result shape
//! - **Relationships** - Belongs-to, has-many and eager loading with one query per relation
//! - **Transactions** - Commit on success, roll back and return the error otherwise
//!
//! # Quick Start
//!
//! ```ignore
//! use querylayer::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> DatabaseResult<()> {
//!     let config = DatabaseConfig::new("main").connection("main", ConnectionConfig::sqlite(":memory:"));
//!     let registry = ConnectionRegistry::boot(config, &DriverTable::default()).await?;
//!
//!     registry
//!         .schema(None)
//!         .await?
//!         .create_table(&TableBlueprint::new("people").string("name").integer("age"))
//!         .await?;
//!
//!     let people = registry.document_manager(None).await?.table("people");
//!     let bob = people.clone().insert_one(doc! { "name": "Bob", "age": 29_i64 }).await?;
//!
//!     let adults = people.where_("age", Operator::Gte, 18_i64).get().await?;
//!     assert_eq!(adults, vec![bob]);
//!
//!     registry.shutdown().await
//! }
//! ```
//!
//! # Drivers
//!
//! - [`sqlite`] - Embedded SQLite through `rusqlite`
//! - [`memory`] - In-process document store for development and testing
//! - [`mongodb`] - MongoDB document store (requires the `mongodb` feature)

pub mod config;
pub mod prelude;
pub mod registry;

pub use querylayer_core::{
    document, driver, error, executor, expression, identifier, manager, page, relationship, schema, sql, validator,
};

// Re-export BSON types for convenience
pub use bson;
pub use bson::doc;

/// SQLite driver.
pub mod sqlite {
    pub use querylayer_sqlite::{SqliteDriver, SqliteDriverBuilder, SqliteTransaction};
}

/// In-memory document driver.
pub mod memory {
    pub use querylayer_memory::{MemoryDriver, MemoryDriverBuilder, MemoryTransaction};
}

/// MongoDB document driver.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use querylayer_mongodb::{MongoDriver, MongoDriverBuilder, MongoTransaction};
}
