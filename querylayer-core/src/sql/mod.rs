//! Relational backend: SQL compilation, execution and DDL.
//!
//! [`SqlCompiler`] turns expressions into [`CompiledStatement`]s,
//! [`RelationalExecutor`] runs them through a [`SqlDriver`] and folds joined
//! columns back into nested documents, and [`RelationalSchema`] implements
//! [`SchemaManager`](crate::schema::SchemaManager) with real DDL.

mod compiler;
mod dialect;
mod executor;
mod schema;

pub use compiler::{JoinColumns, SqlCompiler};
pub use dialect::SqlDialect;
pub use executor::RelationalExecutor;
pub use schema::RelationalSchema;

use tracing::debug;

use crate::{
    document::Document,
    driver::{CompiledStatement, SqlDriver},
    error::DatabaseResult,
};

pub(crate) async fn run_query(driver: &dyn SqlDriver, statement: &CompiledStatement) -> DatabaseResult<Vec<Document>> {
    debug!(sql = %statement.sql, params = statement.bindings.len(), "running query");
    driver.query(statement).await
}

pub(crate) async fn run_statement(driver: &dyn SqlDriver, statement: &CompiledStatement) -> DatabaseResult<u64> {
    debug!(sql = %statement.sql, params = statement.bindings.len(), "running statement");
    driver.execute(statement).await
}
