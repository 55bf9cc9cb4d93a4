use async_trait::async_trait;
use mea::mutex::{Mutex, OwnedMutexGuard};
use rusqlite::Connection;
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

use querylayer_core::{
    document::Document,
    driver::{CompiledStatement, SqlDriver, SqlTransaction, transaction_finished},
    error::{DatabaseError, DatabaseResult},
    sql::SqlDialect,
};

use crate::driver::{backend_error, run_execute, run_query};

/// The connection held by an open transaction. Released by commit, rollback
/// or drop; dropping it while still open rolls the transaction back.
struct OpenConnection {
    connection: Option<OwnedMutexGuard<Connection>>,
}

impl OpenConnection {
    fn connection(&self) -> DatabaseResult<&Connection> {
        self.connection.as_deref().ok_or_else(transaction_finished)
    }

    fn finish(&mut self, sql: &str) -> DatabaseResult<()> {
        let connection = self.connection.take().ok_or_else(transaction_finished)?;

        connection.execute_batch(sql).map_err(|error| {
            if !connection.is_autocommit() {
                if let Err(rollback_error) = connection.execute_batch("ROLLBACK") {
                    warn!(statement = sql, error = %rollback_error, "rollback after a failed statement failed");
                }
            }
            backend_error(error)
        })
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!("rolling back abandoned sqlite transaction");

            if let Err(error) = connection.execute_batch("ROLLBACK") {
                warn!(%error, "rolling back abandoned sqlite transaction failed");
            }
        }
    }
}

/// A transaction on a [`SqliteDriver`](crate::SqliteDriver).
///
/// Holds the driver's connection from `BEGIN` until `COMMIT` or `ROLLBACK`.
/// Clones share the transaction; [`SqlTransaction::driver`] hands out one.
#[derive(Clone)]
pub struct SqliteTransaction {
    state: Arc<Mutex<OpenConnection>>,
}

impl SqliteTransaction {
    pub(crate) async fn begin(connection: Arc<Mutex<Connection>>) -> DatabaseResult<Self> {
        let connection = connection.lock_owned().await;
        connection.execute_batch("BEGIN").map_err(backend_error)?;

        Ok(Self {
            state: Arc::new(Mutex::new(OpenConnection { connection: Some(connection) })),
        })
    }
}

impl fmt::Debug for SqliteTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteTransaction").finish_non_exhaustive()
    }
}

#[async_trait]
impl SqlDriver for SqliteTransaction {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn query(&self, statement: &CompiledStatement) -> DatabaseResult<Vec<Document>> {
        run_query(self.state.lock().await.connection()?, statement)
    }

    async fn execute(&self, statement: &CompiledStatement) -> DatabaseResult<u64> {
        run_execute(self.state.lock().await.connection()?, statement)
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn SqlTransaction>> {
        Err(DatabaseError::Unsupported("nested transactions on sqlite".to_string()))
    }
}

#[async_trait]
impl SqlTransaction for SqliteTransaction {
    fn driver(&self) -> Arc<dyn SqlDriver> {
        Arc::new(self.clone())
    }

    async fn commit(&self) -> DatabaseResult<()> {
        self.state.lock().await.finish("COMMIT")?;
        debug!("committed sqlite transaction");
        Ok(())
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        self.state.lock().await.finish("ROLLBACK")?;
        debug!("rolled back sqlite transaction");
        Ok(())
    }
}
