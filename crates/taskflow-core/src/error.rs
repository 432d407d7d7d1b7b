//! Error types for taskflow.

use thiserror::Error;

/// Result type alias using taskflow's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for taskflow operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    /// Notification not found (or not visible to the caller)
    #[error("Notification not found: {0}")]
    NotificationNotFound(uuid::Uuid),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Write rejected because the record changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
