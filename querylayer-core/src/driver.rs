//! Native driver abstraction for the two backend families.
//!
//! The executors in [`crate::sql`] and [`crate::document`] never talk to a
//! database directly. They compile a [`QueryExpression`](crate::expression::QueryExpression)
//! into a native call ([`CompiledStatement`] or [`NativeQuery`]) and hand it to
//! a driver implementing [`SqlDriver`] or [`DocumentDriver`]. Drivers are treated
//! as black boxes: one call in, one result or error out. Pooling, queuing and
//! retries, if any, live below this line.
//!
//! # Traits
//!
//! - [`SqlDriver`]: runs parameterized SQL text
//! - [`DocumentDriver`]: runs filter/sort/projection documents against collections
//! - [`SqlTransaction`] / [`DocumentTransaction`]: an open transaction with its own scoped driver
//! - [`SqlDriverBuilder`] / [`DocumentDriverBuilder`]: connect a driver from configuration

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{
    document::Document,
    error::{DatabaseError, DatabaseResult},
    expression::Binding,
    sql::SqlDialect,
};

/// A SQL statement with positional placeholders and its ordered bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub bindings: Vec<Binding>,
}

impl CompiledStatement {
    pub fn new(sql: impl Into<String>, bindings: Vec<Binding>) -> Self {
        Self { sql: sql.into(), bindings }
    }

    /// A statement without parameters.
    pub fn plain(sql: impl Into<String>) -> Self {
        Self::new(sql, Vec::new())
    }
}

/// A compiled document-store read.
///
/// `filter`, `sort` and `projection` use the operator vocabulary of
/// MongoDB-compatible stores (`$and`, `$or`, `$in`, `$regex`, `1`/`-1` sorts...).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NativeQuery {
    pub filter: Document,
    pub sort: Option<Document>,
    pub projection: Option<Document>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

/// Relational driver interface.
///
/// Implementations must be thread-safe. Result rows are returned as documents
/// keyed by column name (or column alias).
#[async_trait]
pub trait SqlDriver: Send + Sync + Debug {
    /// The SQL flavor this driver speaks.
    fn dialect(&self) -> SqlDialect;

    /// Runs a statement that returns rows.
    async fn query(&self, statement: &CompiledStatement) -> DatabaseResult<Vec<Document>>;

    /// Runs a statement that does not return rows, returning the affected row count.
    async fn execute(&self, statement: &CompiledStatement) -> DatabaseResult<u64>;

    /// Opens a native transaction. Until it finishes, the transaction owns
    /// the connection and statements issued through this driver wait for it.
    async fn begin(&self) -> DatabaseResult<Box<dyn SqlTransaction>>;

    /// Releases the underlying connection. The default is a no-op.
    async fn close(&self) -> DatabaseResult<()> {
        Ok(())
    }
}

/// An open relational transaction.
///
/// Statements run through [`driver`](Self::driver) belong to the transaction.
/// Once it is committed or rolled back, that driver fails every call.
#[async_trait]
pub trait SqlTransaction: Send + Sync + Debug {
    fn driver(&self) -> Arc<dyn SqlDriver>;

    async fn commit(&self) -> DatabaseResult<()>;

    async fn rollback(&self) -> DatabaseResult<()>;
}

/// Document-store driver interface.
///
/// Documents crossing this boundary are in native form (`_id` carries the
/// store's identifier type).
#[async_trait]
pub trait DocumentDriver: Send + Sync + Debug {
    /// Returns the documents of `collection` matching `query`, in sort order.
    async fn find(&self, collection: &str, query: &NativeQuery) -> DatabaseResult<Vec<Document>>;

    /// Counts the documents of `collection` matching `filter`.
    async fn count(&self, collection: &str, filter: &Document) -> DatabaseResult<u64>;

    /// Inserts documents, each already carrying its native `_id`.
    async fn insert_many(&self, collection: &str, documents: Vec<Document>) -> DatabaseResult<()>;

    /// Applies `$set: set` to every document matching `filter`, returning the match count.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Document,
        set: &Document,
    ) -> DatabaseResult<u64>;

    /// Deletes every document matching `filter`, returning the deleted count.
    async fn delete_many(&self, collection: &str, filter: &Document) -> DatabaseResult<u64>;

    /// Creates an empty collection.
    async fn create_collection(&self, name: &str) -> DatabaseResult<()>;

    /// Drops a collection with all its documents.
    async fn drop_collection(&self, name: &str) -> DatabaseResult<()>;

    /// Lists collection names.
    async fn list_collections(&self) -> DatabaseResult<Vec<String>>;

    /// Opens a transaction. Stores without multi-document transactions keep the default.
    async fn begin(&self) -> DatabaseResult<Box<dyn DocumentTransaction>> {
        Err(DatabaseError::Unsupported("transactions on this document store".to_string()))
    }

    /// Releases the underlying client. The default is a no-op.
    async fn shutdown(&self) -> DatabaseResult<()> {
        Ok(())
    }
}

/// An open document-store transaction, see [`SqlTransaction`].
#[async_trait]
pub trait DocumentTransaction: Send + Sync + Debug {
    fn driver(&self) -> Arc<dyn DocumentDriver>;

    async fn commit(&self) -> DatabaseResult<()>;

    async fn rollback(&self) -> DatabaseResult<()>;
}

/// Error returned by a transaction-scoped driver used after commit or rollback.
pub fn transaction_finished() -> DatabaseError {
    DatabaseError::Backend("transaction is no longer open".to_string())
}

/// Connects a [`SqlDriver`] from configuration.
#[async_trait]
pub trait SqlDriverBuilder: Send + Sync + Debug {
    async fn build(&self) -> DatabaseResult<Arc<dyn SqlDriver>>;
}

/// Connects a [`DocumentDriver`] from configuration.
#[async_trait]
pub trait DocumentDriverBuilder: Send + Sync + Debug {
    async fn build(&self) -> DatabaseResult<Arc<dyn DocumentDriver>>;
}
