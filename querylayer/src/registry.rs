//! Named connections and their boot lifecycle.
//!
//! A [`ConnectionRegistry`] is constructed explicitly from a
//! [`DatabaseConfig`] and a [`DriverTable`]. Booting registers every
//! configured connection, then connects the default connection followed by
//! the keep-alive connections. Any other connection is connected the first
//! time it is used.
//!
//! Application code should depend on the [`ConnectionResolver`] trait rather
//! than the registry itself so tests can substitute their own resolver.
//!
//! # Example
//!
//! ```ignore
//! use querylayer::{config::DatabaseConfig, registry::{ConnectionRegistry, ConnectionResolver, DriverTable}};
//!
//! let registry = ConnectionRegistry::boot(DatabaseConfig::from_path("database.toml")?, &DriverTable::default()).await?;
//! let people = registry.document_manager(None).await?.table("people").get().await?;
//! ```

use async_trait::async_trait;
use mea::rwlock::RwLock;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{info, warn};

use querylayer_core::{
    document::{DocumentExecutor, DocumentSchema},
    driver::{DocumentDriver, DocumentDriverBuilder, SqlDriver, SqlDriverBuilder},
    error::{DatabaseError, DatabaseResult},
    executor::QueryExecutor,
    manager::DocumentManager,
    schema::SchemaManager,
    sql::{RelationalExecutor, RelationalSchema},
};
use querylayer_memory::MemoryDriverBuilder;
use querylayer_sqlite::SqliteDriverBuilder;

use crate::config::{ConnectionConfig, DatabaseConfig};

/// The driver builder for one connection, tagged with its backend family.
#[derive(Debug)]
pub enum Backend {
    Relational(Box<dyn SqlDriverBuilder>),
    Document(Box<dyn DocumentDriverBuilder>),
}

/// Produces the driver builder for a connection's settings.
pub type DriverFactory = fn(&ConnectionConfig) -> DatabaseResult<Backend>;

/// Lookup table from driver name to [`DriverFactory`].
///
/// [`DriverTable::default`] knows `sqlite`, `memory`, and `mongodb` when the
/// `mongodb` feature is enabled. [`DriverTable::new`] starts empty.
#[derive(Clone)]
pub struct DriverTable {
    factories: HashMap<String, DriverFactory>,
}

impl DriverTable {
    pub fn new() -> Self {
        Self { factories: HashMap::new() }
    }

    /// Adds or replaces the factory for `name`.
    pub fn register(mut self, name: impl Into<String>, factory: DriverFactory) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn backend(&self, config: &ConnectionConfig) -> DatabaseResult<Backend> {
        let factory = self
            .factories
            .get(&config.driver)
            .ok_or_else(|| DatabaseError::InvalidDatabaseDriver(config.driver.clone()))?;

        factory(config)
    }
}

impl Default for DriverTable {
    fn default() -> Self {
        let table = Self::new()
            .register("sqlite", sqlite_backend)
            .register("memory", memory_backend);

        #[cfg(feature = "mongodb")]
        let table = table.register("mongodb", mongodb_backend);

        table
    }
}

impl fmt::Debug for DriverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.factories.keys().collect::<Vec<_>>();
        names.sort();

        f.debug_struct("DriverTable").field("drivers", &names).finish()
    }
}

fn sqlite_backend(config: &ConnectionConfig) -> DatabaseResult<Backend> {
    let path = config
        .path
        .clone()
        .or_else(|| {
            config
                .url
                .as_deref()
                .and_then(|url| url.strip_prefix("sqlite://"))
                .map(str::to_string)
        })
        .or_else(|| config.database.clone());

    let builder = match path {
        Some(path) => SqliteDriverBuilder::default().path(path),
        None => SqliteDriverBuilder::default().in_memory(),
    };

    Ok(Backend::Relational(Box::new(builder)))
}

fn memory_backend(_config: &ConnectionConfig) -> DatabaseResult<Backend> {
    Ok(Backend::Document(Box::new(MemoryDriverBuilder)))
}

#[cfg(feature = "mongodb")]
fn mongodb_backend(config: &ConnectionConfig) -> DatabaseResult<Backend> {
    let url = config
        .url
        .as_deref()
        .ok_or_else(|| DatabaseError::Configuration("mongodb connections need a url".to_string()))?;
    let database = config
        .database
        .as_deref()
        .ok_or_else(|| DatabaseError::Configuration("mongodb connections need a database".to_string()))?;

    Ok(Backend::Document(Box::new(querylayer_mongodb::MongoDriverBuilder::new(url, database))))
}

/// The native driver behind a connection.
#[derive(Debug, Clone)]
pub enum NativeClient {
    Sql(Arc<dyn SqlDriver>),
    Document(Arc<dyn DocumentDriver>),
}

impl NativeClient {
    async fn close(&self) -> DatabaseResult<()> {
        match self {
            NativeClient::Sql(driver) => driver.close().await,
            NativeClient::Document(driver) => driver.shutdown().await,
        }
    }
}

/// Everything derived from one connected driver.
#[derive(Debug, Clone)]
struct Connected {
    client: NativeClient,
    manager: DocumentManager,
    schema: Arc<dyn SchemaManager>,
}

impl Connected {
    async fn open(backend: &Backend) -> DatabaseResult<Self> {
        Ok(match backend {
            Backend::Relational(builder) => {
                let driver = builder.build().await?;
                let executor: Arc<dyn QueryExecutor> = Arc::new(RelationalExecutor::new(driver.clone()));

                Self {
                    manager: DocumentManager::new(executor),
                    schema: Arc::new(RelationalSchema::new(driver.clone())),
                    client: NativeClient::Sql(driver),
                }
            }
            Backend::Document(builder) => {
                let driver = builder.build().await?;
                let executor: Arc<dyn QueryExecutor> = Arc::new(DocumentExecutor::new(driver.clone()));

                Self {
                    manager: DocumentManager::new(executor),
                    schema: Arc::new(DocumentSchema::new(driver.clone())),
                    client: NativeClient::Document(driver),
                }
            }
        })
    }
}

#[derive(Debug)]
struct Slot {
    config: ConnectionConfig,
    backend: Arc<Backend>,
    connected: Option<Connected>,
}

/// Resolves connection names to managers, schemas and native clients.
///
/// `None` always means the default connection. Unknown names fail with
/// [`DatabaseError::InvalidDatabaseConnection`].
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    async fn document_manager(&self, connection: Option<&str>) -> DatabaseResult<DocumentManager>;

    async fn schema(&self, connection: Option<&str>) -> DatabaseResult<Arc<dyn SchemaManager>>;

    async fn client(&self, connection: Option<&str>) -> DatabaseResult<NativeClient>;

    /// Whether the connection is configured with the driver named `driver`.
    async fn is_adapter(&self, driver: &str, connection: Option<&str>) -> DatabaseResult<bool>;
}

/// Owns every configured connection.
#[derive(Debug)]
pub struct ConnectionRegistry {
    default: String,
    slots: RwLock<HashMap<String, Slot>>,
}

impl ConnectionRegistry {
    /// Registers every connection in `config`, then connects the default
    /// connection and the keep-alive connections, in that order.
    pub async fn boot(config: DatabaseConfig, drivers: &DriverTable) -> DatabaseResult<Self> {
        config.validate(drivers)?;

        let mut slots = HashMap::with_capacity(config.connections.len());

        for (name, connection) in config.connections {
            let backend = drivers.backend(&connection)?;
            info!(connection = %name, driver = %connection.driver, "registered connection");

            slots.insert(name, Slot { config: connection, backend: Arc::new(backend), connected: None });
        }

        let registry = Self { default: config.default, slots: RwLock::new(slots) };

        registry.connect(&registry.default).await?;
        for name in &config.keep_alive {
            registry.connect(name).await?;
        }

        Ok(registry)
    }

    pub fn default_connection(&self) -> &str {
        &self.default
    }

    pub async fn connection_names(&self) -> Vec<String> {
        let mut names = self.slots.read().await.keys().cloned().collect::<Vec<_>>();
        names.sort();
        names
    }

    pub async fn is_connected(&self, connection: &str) -> bool {
        self.slots
            .read()
            .await
            .get(connection)
            .is_some_and(|slot| slot.connected.is_some())
    }

    /// Closes every connected driver. Connections reconnect lazily if used again.
    ///
    /// A failed close is logged and the remaining connections are still
    /// closed; the first failure is returned.
    pub async fn shutdown(&self) -> DatabaseResult<()> {
        let connected = {
            let mut slots = self.slots.write().await;
            slots
                .iter_mut()
                .filter_map(|(name, slot)| slot.connected.take().map(|connected| (name.clone(), connected)))
                .collect::<Vec<_>>()
        };

        let mut first_error = None;

        for (name, connected) in connected {
            match connected.client.close().await {
                Ok(()) => info!(connection = %name, "closed connection"),
                Err(error) => {
                    warn!(connection = %name, %error, "closing connection failed");
                    first_error.get_or_insert(error);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn resolve_name<'a>(&'a self, connection: Option<&'a str>) -> &'a str {
        connection.unwrap_or(&self.default)
    }

    /// Returns the connection's drivers, connecting it first if needed.
    ///
    /// Connecting runs without holding the registry lock. If two callers race
    /// to connect the same name, the first to finish wins and the other
    /// closes its driver.
    async fn connect(&self, name: &str) -> DatabaseResult<Connected> {
        let backend = {
            let slots = self.slots.read().await;
            let slot = slots
                .get(name)
                .ok_or_else(|| DatabaseError::InvalidDatabaseConnection(name.to_string()))?;

            if let Some(connected) = &slot.connected {
                return Ok(connected.clone());
            }
            slot.backend.clone()
        };

        let opened = Connected::open(&backend).await?;

        let existing = {
            let mut slots = self.slots.write().await;
            let slot = slots
                .get_mut(name)
                .ok_or_else(|| DatabaseError::InvalidDatabaseConnection(name.to_string()))?;

            match &slot.connected {
                Some(existing) => existing.clone(),
                None => {
                    info!(connection = %name, driver = %slot.config.driver, "connected");
                    slot.connected = Some(opened.clone());
                    return Ok(opened);
                }
            }
        };

        if let Err(error) = opened.client.close().await {
            warn!(connection = %name, %error, "closing a redundant connection failed");
        }
        Ok(existing)
    }
}

#[async_trait]
impl ConnectionResolver for ConnectionRegistry {
    async fn document_manager(&self, connection: Option<&str>) -> DatabaseResult<DocumentManager> {
        Ok(self.connect(self.resolve_name(connection)).await?.manager)
    }

    async fn schema(&self, connection: Option<&str>) -> DatabaseResult<Arc<dyn SchemaManager>> {
        Ok(self.connect(self.resolve_name(connection)).await?.schema)
    }

    async fn client(&self, connection: Option<&str>) -> DatabaseResult<NativeClient> {
        Ok(self.connect(self.resolve_name(connection)).await?.client)
    }

    async fn is_adapter(&self, driver: &str, connection: Option<&str>) -> DatabaseResult<bool> {
        let name = self.resolve_name(connection);

        self.slots
            .read()
            .await
            .get(name)
            .map(|slot| slot.config.driver == driver)
            .ok_or_else(|| DatabaseError::InvalidDatabaseConnection(name.to_string()))
    }
}
