//! Common error types for Rame

use thiserror::Error;

/// Common result type for Rame operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Rame crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested list or item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation not permitted on the target, or malformed input
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}
