//! Error types for the companion core.

use thiserror::Error;

/// Top-level error type for core operations.
#[derive(Error, Debug)]
pub enum AsunaError {
    /// A fragment with the given id does not exist in the ledger.
    #[error("Memory fragment not found: {0}")]
    FragmentNotFound(crate::FragmentId),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, AsunaError>;
