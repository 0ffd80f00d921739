//! Error types for the ORM system
//!
//! One error enum covers name resolution, schema construction, row/entity
//! conversion, query rendering and the storage layer itself.

use thiserror::Error;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Entity metadata is missing or malformed
    #[error("Name resolve error: {0}")]
    NameResolve(String),
    /// The schema could not be synthesized from the registered entities
    #[error("Schema init error: {0}")]
    SchemaInit(String),
    /// A single field could not be converted between row and entity
    #[error("Conversion error on field '{field}': {message}")]
    Conversion { field: String, message: String },
    /// Runtime name or field resolution failed
    #[error("Mapping error: {0}")]
    Mapping(String),
    /// The query could not be rendered
    #[error("Query build error: {0}")]
    QueryBuild(String),
    /// A join could not be resolved against the schema
    #[error("Illegal join: {0}")]
    IllegalJoin(String),
    /// Database connection or statement error
    #[error("Database error: {0}")]
    Database(String),
    /// Transaction lifecycle error
    #[error("Transaction error: {0}")]
    Transaction(String),
    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),
    /// The stored schema version is newer than the requested one
    #[error("Cannot downgrade database from version {from} to {to}")]
    Downgrade { from: u32, to: u32 },
    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ModelError {
    /// Build a conversion error for the given field
    pub fn conversion(field: impl Into<String>, message: impl Into<String>) -> Self {
        ModelError::Conversion {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Whether the error aborts only the row being materialized
    pub fn is_row_local(&self) -> bool {
        matches!(self, ModelError::Conversion { .. })
    }
}

impl From<rusqlite::Error> for ModelError {
    fn from(err: rusqlite::Error) -> Self {
        ModelError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Migration(err.to_string())
    }
}
