//! Connection configuration.
//!
//! A [`DatabaseConfig`] names every connection the application may use, the
//! connection used when none is named, and the connections that are opened
//! eagerly at boot. It can be loaded from TOML or assembled in code:
//!
//! ```toml
//! default = "main"
//! keep_alive = ["cache"]
//!
//! [connections.main]
//! driver = "sqlite"
//! path = "app.db"
//!
//! [connections.cache]
//! driver = "memory"
//! ```

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};

use querylayer_core::error::{DatabaseError, DatabaseResult};

use crate::registry::DriverTable;

fn default_connection() -> String {
    "default".to_string()
}

/// Top-level database configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection used when a caller does not name one.
    #[serde(default = "default_connection")]
    pub default: String,
    /// Connections opened at boot in addition to the default one.
    #[serde(default)]
    pub keep_alive: Vec<String>,
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,
}

/// Settings for one named connection.
///
/// Which fields matter depends on the driver: `sqlite` reads `path` (or a
/// `sqlite://` url), `mongodb` needs `url` and `database`, `memory` reads
/// nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub driver: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Driver specific settings passed through untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl DatabaseConfig {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            default: default.into(),
            keep_alive: Vec::new(),
            connections: BTreeMap::new(),
        }
    }

    pub fn from_toml_str(source: &str) -> DatabaseResult<Self> {
        toml::from_str(source).map_err(|e| DatabaseError::Configuration(e.to_string()))
    }

    pub fn from_path(path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| DatabaseError::Configuration(format!("reading {}: {e}", path.display())))?;

        Self::from_toml_str(&source)
    }

    pub fn to_toml_string(&self) -> DatabaseResult<String> {
        toml::to_string_pretty(self).map_err(|e| DatabaseError::Configuration(e.to_string()))
    }

    pub fn connection(mut self, name: impl Into<String>, connection: ConnectionConfig) -> Self {
        self.connections.insert(name.into(), connection);
        self
    }

    pub fn keep_alive(mut self, name: impl Into<String>) -> Self {
        self.keep_alive.push(name.into());
        self
    }

    /// Checks that every referenced connection exists and every driver is known.
    pub fn validate(&self, drivers: &DriverTable) -> DatabaseResult<()> {
        for name in std::iter::once(&self.default).chain(&self.keep_alive) {
            if !self.connections.contains_key(name) {
                return Err(DatabaseError::InvalidDatabaseConnection(name.clone()));
            }
        }

        for connection in self.connections.values() {
            if !drivers.contains(&connection.driver) {
                return Err(DatabaseError::InvalidDatabaseDriver(connection.driver.clone()));
            }
        }

        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new(default_connection())
    }
}

impl ConnectionConfig {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            url: None,
            database: None,
            path: None,
            options: BTreeMap::new(),
        }
    }

    pub fn sqlite(path: impl Into<String>) -> Self {
        Self::new("sqlite").path(path)
    }

    pub fn memory() -> Self {
        Self::new("memory")
    }

    pub fn mongodb(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self::new("mongodb").url(url).database(database)
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_connections_from_toml() {
        let config = DatabaseConfig::from_toml_str(
            r#"
            default = "main"
            keep_alive = ["cache"]

            [connections.main]
            driver = "sqlite"
            path = ":memory:"

            [connections.cache]
            driver = "memory"
            options = { flavour = "test" }
            "#,
        )
        .unwrap();

        assert_eq!(config.default, "main");
        assert_eq!(config.connections["main"], ConnectionConfig::sqlite(":memory:"));
        assert_eq!(config.connections["cache"].options["flavour"], "test");
        assert!(config.validate(&DriverTable::default()).is_ok());
    }

    #[test]
    fn malformed_toml_is_a_configuration_error() {
        let err = DatabaseConfig::from_toml_str("default = [").unwrap_err();
        assert!(matches!(err, DatabaseError::Configuration(_)));
    }

    #[test]
    fn validation_names_the_offending_entry() {
        let drivers = DriverTable::default();

        let missing_default = DatabaseConfig::new("main").connection("other", ConnectionConfig::memory());
        assert!(matches!(
            missing_default.validate(&drivers),
            Err(DatabaseError::InvalidDatabaseConnection(name)) if name == "main"
        ));

        let missing_keep_alive = DatabaseConfig::new("main")
            .connection("main", ConnectionConfig::memory())
            .keep_alive("ghost");
        assert!(matches!(
            missing_keep_alive.validate(&drivers),
            Err(DatabaseError::InvalidDatabaseConnection(name)) if name == "ghost"
        ));

        let unknown_driver = DatabaseConfig::new("main").connection("main", ConnectionConfig::new("oracle"));
        assert!(matches!(
            unknown_driver.validate(&drivers),
            Err(DatabaseError::InvalidDatabaseDriver(name)) if name == "oracle"
        ));
    }

    #[test]
    fn round_trips_through_toml() {
        let config = DatabaseConfig::new("main").connection("main", ConnectionConfig::sqlite("app.db"));
        let parsed = DatabaseConfig::from_toml_str(&config.to_toml_string().unwrap()).unwrap();

        assert_eq!(parsed, config);
    }
}
