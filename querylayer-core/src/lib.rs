//! A backend-neutral query layer over relational and document stores.
//!
//! This crate is the core of the querylayer project and provides:
//!
//! - **Query expressions** ([`expression`]) - A backend-neutral description of selects and writes
//! - **Relational backend** ([`sql`]) - SQL compilation, execution, joins and DDL
//! - **Document backend** ([`document`]) - Filter-document compilation and join emulation
//! - **Identifiers** ([`identifier`]) - Conversion between native keys and the canonical `id`
//! - **Validation** ([`validator`]) - Document shape checks performed before writes
//! - **Relationships** ([`relationship`]) - Belongs-to and has-many resolution
//! - **Facade** ([`manager`]) - The fluent [`TableQuery`](manager::TableQuery) surface and transactions
//! - **Drivers** ([`driver`]) - Interfaces native database drivers implement
//! - **Schema** ([`schema`]) - Table blueprints and the schema manager interface
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use querylayer_core::{document::DocumentExecutor, manager::DocumentManager};
//!
//! let manager = DocumentManager::new(Arc::new(DocumentExecutor::new(driver)));
//! let bob = manager.table("people").insert_one(doc! { "name": "Bob" }).await?;
//! let found = manager.table("people").find_by_id(bob.get_str("id")?).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as querylayer_core;

pub mod document;
pub mod driver;
pub mod error;
pub mod executor;
pub mod expression;
pub mod identifier;
pub mod manager;
pub mod page;
pub mod relationship;
pub mod schema;
pub mod sql;
pub mod validator;
