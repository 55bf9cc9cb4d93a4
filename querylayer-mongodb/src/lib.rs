//! MongoDB driver for querylayer.
//!
//! This crate implements the [`DocumentDriver`](querylayer_core::driver::DocumentDriver)
//! trait on top of the official `mongodb` client. Filter, sort and projection
//! documents produced by the document compiler are passed to the server as
//! they are.
//!
//! To use this driver through the umbrella crate, enable its `mongodb` feature:
//!
//! ```toml
//! [dependencies]
//! querylayer = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Example
//!
//! ```ignore
//! use querylayer_mongodb::MongoDriver;
//!
//! let driver = MongoDriver::builder("mongodb://localhost:27017", "app")
//!     .connect()
//!     .await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as querylayer_mongodb;

pub mod driver;

pub use driver::{MongoDriver, MongoDriverBuilder, MongoTransaction};
