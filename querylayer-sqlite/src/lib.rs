//! SQLite driver for querylayer.
//!
//! This crate implements the relational [`SqlDriver`](querylayer_core::driver::SqlDriver)
//! interface on top of `rusqlite`. A driver owns one connection guarded by an
//! async-aware mutex. A transaction opened with `begin` takes that connection
//! until it commits or rolls back, and statements issued through the driver
//! in the meantime wait for it.
//!
//! # Quick Start
//!
//! ```ignore
//! use querylayer_core::{manager::DocumentManager, sql::RelationalExecutor};
//! use querylayer_sqlite::SqliteDriver;
//!
//! let driver = SqliteDriver::builder().in_memory().connect()?;
//! let manager = DocumentManager::new(Arc::new(RelationalExecutor::new(Arc::new(driver))));
//! ```

#[allow(unused_extern_crates)]
extern crate self as querylayer_sqlite;

pub mod driver;
pub mod transaction;
pub mod value;

pub use driver::{SqliteDriver, SqliteDriverBuilder};
pub use transaction::SqliteTransaction;
