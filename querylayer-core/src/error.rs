//! Error types and result types for query and document operations.
//!
//! Every fallible operation in the workspace returns [`DatabaseResult<T>`].
//! Driver crates map their native errors into [`DatabaseError::Backend`],
//! keeping the original message text.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors raised by the query layer.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// A CRUD or compile operation ran before a table/collection was bound.
    #[error("No table bound to the query")]
    MissingTable,
    /// An identifier string cannot be parsed into the backend's native id type.
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// The document shape is wrong for the operation (arity, missing or unexpected `id`).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The named connection is not registered.
    #[error("Invalid database connection: {0}")]
    InvalidDatabaseConnection(String),
    /// The driver name is not present in the driver table.
    #[error("Invalid database driver: {0}")]
    InvalidDatabaseDriver(String),
    /// The active backend cannot perform the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Conversion between BSON, JSON, or driver values failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The configuration could not be parsed or is inconsistent.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A driver could not be constructed or connected.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error reported by the underlying driver.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl DatabaseError {
    /// Returns `true` for identifier parse failures, which read paths degrade to "not found".
    pub fn is_invalid_identifier(&self) -> bool {
        matches!(self, DatabaseError::InvalidIdentifier(_))
    }
}

/// A specialized `Result` type for query layer operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl From<BsonError> for DatabaseError {
    fn from(err: BsonError) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DatabaseError {
    fn from(err: SerdeJsonError) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}
