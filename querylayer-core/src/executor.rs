//! The compiler/executor interface shared by both backends.
//!
//! [`QueryExecutor`] has exactly two implementations,
//! [`RelationalExecutor`](crate::sql::RelationalExecutor) and
//! [`DocumentExecutor`](crate::document::DocumentExecutor). Which one serves a
//! connection is decided once, when the connection is registered, by looking
//! the configured driver name up in a driver table.

use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{document::Document, error::DatabaseResult, expression::QueryExpression};

/// The storage family behind an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Relational,
    Document,
}

/// Outcome of a write statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    /// Rows/documents inserted, updated or deleted.
    pub affected: u64,
    /// Canonical copies of inserted documents, each carrying its generated `id`.
    pub inserted: Vec<Document>,
}

/// Compiles and runs [`QueryExpression`]s against one backend.
///
/// Results are always canonical documents: native identifiers never cross
/// this boundary.
///
/// # Read and write failure policy
///
/// An identifier that cannot be parsed for the backend degrades to an empty
/// result in [`select`](Self::select) and [`count`](Self::count), and
/// propagates as [`DatabaseError::InvalidIdentifier`](crate::error::DatabaseError::InvalidIdentifier)
/// from [`execute`](Self::execute).
#[async_trait]
pub trait QueryExecutor: Send + Sync + Debug {
    fn backend(&self) -> BackendKind;

    /// Runs a select and returns the matching rows.
    async fn select(&self, expression: &QueryExpression) -> DatabaseResult<Vec<Document>>;

    /// Counts the rows a select would return, ignoring paging.
    async fn count(&self, expression: &QueryExpression) -> DatabaseResult<u64>;

    /// Runs the insert, update or delete described by `expression.mutation`.
    async fn execute(&self, expression: &QueryExpression) -> DatabaseResult<WriteOutcome>;

    /// Removes every row of `table`, keeping the table itself.
    async fn truncate(&self, table: &str) -> DatabaseResult<()>;

    /// Opens a transaction. The returned [`Transaction`] carries an executor
    /// scoped to it; work issued through `self` meanwhile waits for it to finish.
    async fn begin(&self) -> DatabaseResult<Transaction>;
}

/// Commit and rollback of a backend transaction.
#[async_trait]
pub trait TransactionHandle: Send + Sync + Debug {
    async fn commit(&self) -> DatabaseResult<()>;

    async fn rollback(&self) -> DatabaseResult<()>;
}

/// A transaction opened by [`QueryExecutor::begin`].
///
/// Dropping it without calling [`commit`](Self::commit) discards its writes.
#[derive(Debug)]
pub struct Transaction {
    executor: Arc<dyn QueryExecutor>,
    handle: Box<dyn TransactionHandle>,
}

impl Transaction {
    pub fn new(executor: Arc<dyn QueryExecutor>, handle: Box<dyn TransactionHandle>) -> Self {
        Self { executor, handle }
    }

    /// The executor bound to this transaction.
    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub async fn commit(self) -> DatabaseResult<()> {
        self.handle.commit().await
    }

    pub async fn rollback(self) -> DatabaseResult<()> {
        self.handle.rollback().await
    }
}
