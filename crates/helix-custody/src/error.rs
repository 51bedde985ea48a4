//! Error types for custody operations.

use helix_custody_core::{ContentHash, CoreError, HashRef, IntegrityFailure};
use helix_custody_store::StoreError;
use thiserror::Error;

/// Errors that can occur during custody operations.
#[derive(Debug, Error)]
pub enum CustodyError {
    /// Building a record, entry or petition failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// No identity with this merkle root is stored.
    #[error("agent not found: {0}")]
    AgentNotFound(ContentHash),

    /// An identity with this merkle root is already stored. Nothing was written.
    #[error("agent already exists: {0}")]
    AlreadyExists(ContentHash),

    /// Another writer extended the ledger first. Nothing was written.
    #[error("ledger of {identity} moved: built on {expected:?}, tail is now {current:?}")]
    StaleTail {
        identity: ContentHash,
        expected: Option<HashRef>,
        current: Option<ContentHash>,
    },

    /// The ledger ends in a custody revocation and accepts no more entries.
    #[error("custody of {0} was revoked")]
    Revoked(ContentHash),

    /// The stored ledger tail failed re-verification before an append.
    #[error("stored ledger of {identity} failed verification ({} findings)", .failures.len())]
    Integrity {
        identity: ContentHash,
        failures: Vec<IntegrityFailure>,
    },

    /// The injected renderer failed.
    #[error("rendering failed: {0:#}")]
    Rendering(anyhow::Error),
}

/// Result type for custody operations.
pub type Result<T> = std::result::Result<T, CustodyError>;
