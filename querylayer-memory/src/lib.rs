//! In-memory document driver for querylayer.
//!
//! This crate provides a thread-safe, in-memory implementation of the
//! [`DocumentDriver`](querylayer_core::driver::DocumentDriver) trait. It
//! evaluates the same filter documents a MongoDB-compatible store would, which
//! makes it the backend of choice for development and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Filter evaluation** - Logical, comparison, membership and `$regex` operators
//! - **Sorting and paging** - Multi-key sorts, skip, limit and projections
//! - **Transactions** - Writes staged on a private copy, published on commit
//!
//! # Quick Start
//!
//! ```ignore
//! use querylayer_core::{document::DocumentExecutor, manager::DocumentManager};
//! use querylayer_memory::MemoryDriver;
//!
//! let manager = DocumentManager::new(Arc::new(DocumentExecutor::new(Arc::new(MemoryDriver::new()))));
//! let ann = manager.table("people").insert_one(doc! { "name": "Ann" }).await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as querylayer_memory;

pub mod evaluator;
pub mod store;
pub mod transaction;

pub use store::{MemoryDriver, MemoryDriverBuilder};
pub use transaction::MemoryTransaction;
