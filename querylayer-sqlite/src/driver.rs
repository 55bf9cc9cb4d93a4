use async_trait::async_trait;
use mea::mutex::Mutex;
use rusqlite::{Connection, params_from_iter};
use std::{fmt, sync::Arc};
use tracing::{debug, info};

use querylayer_core::{
    document::Document,
    driver::{CompiledStatement, SqlDriver, SqlDriverBuilder, SqlTransaction},
    error::{DatabaseError, DatabaseResult},
    sql::SqlDialect,
};

use crate::{
    transaction::SqliteTransaction,
    value::{from_value_ref, to_sql_value},
};

const IN_MEMORY: &str = ":memory:";

pub(crate) fn backend_error(err: rusqlite::Error) -> DatabaseError {
    DatabaseError::Backend(err.to_string())
}

pub(crate) fn run_query(connection: &Connection, statement: &CompiledStatement) -> DatabaseResult<Vec<Document>> {
    let params = statement
        .bindings
        .iter()
        .map(to_sql_value)
        .collect::<DatabaseResult<Vec<_>>>()?;

    let mut prepared = connection.prepare(&statement.sql).map_err(backend_error)?;
    let names = prepared
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = prepared.query(params_from_iter(params)).map_err(backend_error)?;
    let mut documents = Vec::new();

    while let Some(row) = rows.next().map_err(backend_error)? {
        let mut document = Document::new();

        for (index, name) in names.iter().enumerate() {
            let value = row.get_ref(index).map_err(backend_error)?;
            document.insert(name.as_str(), from_value_ref(value)?);
        }

        documents.push(document);
    }

    Ok(documents)
}

pub(crate) fn run_execute(connection: &Connection, statement: &CompiledStatement) -> DatabaseResult<u64> {
    let params = statement
        .bindings
        .iter()
        .map(to_sql_value)
        .collect::<DatabaseResult<Vec<_>>>()?;

    let changed = connection
        .execute(&statement.sql, params_from_iter(params))
        .map_err(backend_error)?;

    Ok(changed as u64)
}

/// [`SqlDriver`] over a single `rusqlite` connection.
///
/// Statements are serialized through an async mutex. A transaction takes the
/// connection for its whole lifetime, so statements issued through the driver
/// meanwhile wait for it to finish.
#[derive(Clone)]
pub struct SqliteDriver {
    path: String,
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDriver {
    pub fn builder() -> SqliteDriverBuilder {
        SqliteDriverBuilder::default()
    }

    /// Wraps an already opened connection.
    pub fn from_connection(connection: Connection) -> Self {
        let path = connection
            .path()
            .filter(|path| !path.is_empty())
            .unwrap_or(IN_MEMORY)
            .to_string();

        Self { path, connection: Arc::new(Mutex::new(connection)) }
    }

    /// The database file, or `:memory:`.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Debug for SqliteDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDriver").field("path", &self.path).finish()
    }
}

#[async_trait]
impl SqlDriver for SqliteDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }

    async fn query(&self, statement: &CompiledStatement) -> DatabaseResult<Vec<Document>> {
        run_query(&*self.connection.lock().await, statement)
    }

    async fn execute(&self, statement: &CompiledStatement) -> DatabaseResult<u64> {
        run_execute(&*self.connection.lock().await, statement)
    }

    async fn begin(&self) -> DatabaseResult<Box<dyn SqlTransaction>> {
        let transaction = SqliteTransaction::begin(self.connection.clone()).await?;
        debug!(path = %self.path, "began sqlite transaction");

        Ok(Box::new(transaction))
    }
}

/// Opens a [`SqliteDriver`].
///
/// Without a path, or with `:memory:`, the database lives in memory and is
/// discarded with the driver.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriverBuilder {
    path: Option<String>,
}

impl SqliteDriverBuilder {
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn in_memory(mut self) -> Self {
        self.path = Some(IN_MEMORY.to_string());
        self
    }

    pub fn connect(&self) -> DatabaseResult<SqliteDriver> {
        let path = self.path.as_deref().unwrap_or(IN_MEMORY);

        let connection = match path {
            IN_MEMORY => Connection::open_in_memory(),
            file => Connection::open(file),
        }
        .map_err(|e| DatabaseError::Initialization(format!("opening sqlite database '{path}': {e}")))?;

        info!(path, "opened sqlite database");

        Ok(SqliteDriver { path: path.to_string(), connection: Arc::new(Mutex::new(connection)) })
    }
}

#[async_trait]
impl SqlDriverBuilder for SqliteDriverBuilder {
    async fn build(&self) -> DatabaseResult<Arc<dyn SqlDriver>> {
        Ok(Arc::new(self.connect()?))
    }
}
