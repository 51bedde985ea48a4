//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A record or entry refused on write: a non-canonical hash reference,
    /// or an initial ledger that is not a chain owned by its identity.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// Identity or entry not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task failed or a lock was poisoned.
    #[error("task error: {0}")]
    Task(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
