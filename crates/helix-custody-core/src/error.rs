//! Error types for Helix custody core.

use serde::Serialize;
use thiserror::Error;

use crate::crypto::{ContentHash, HashRef};

/// Errors raised on the write path: building records, entries and petitions.
///
/// Write operations fail before anything is returned, so a caller never holds
/// a partially built record.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("unsupported schema version: {0}")]
    UnsupportedVersion(String),

    #[error("not authorized: {0}")]
    Unauthorized(String),

    #[error("signature from {member_id} rejected: {reason}")]
    SignatureRejected { member_id: String, reason: String },

    #[error("entry is tethered to {found}, expected {expected}")]
    Tether {
        expected: ContentHash,
        found: HashRef,
    },

    #[error("entry does not extend the ledger tail: expected {expected:?}, got {got:?}")]
    StaleTail {
        expected: Option<HashRef>,
        got: Option<HashRef>,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single finding produced by the integrity verifier.
///
/// Findings are data, not errors: verification always evaluates every check
/// and returns the full list.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum IntegrityFailure {
    #[error("content tampered: stored hash {stored}, recomputed {recomputed}")]
    ContentTampered {
        stored: HashRef,
        recomputed: ContentHash,
    },

    #[error("chain broken: stored accumulator {stored}, recomputed {recomputed}")]
    ChainBroken {
        stored: HashRef,
        recomputed: ContentHash,
    },

    #[error("genesis broken: stored accumulator {stored}, entry hash {recomputed}")]
    GenesisBroken {
        stored: HashRef,
        recomputed: ContentHash,
    },

    #[error("tether broken: entry owned by {found}, identity is {expected}")]
    TetherBroken {
        expected: ContentHash,
        found: HashRef,
    },

    #[error("linkage broken: previous reference {found:?}, predecessor hash {expected}")]
    LinkageBroken {
        expected: HashRef,
        found: Option<HashRef>,
    },

    #[error("malformed hash in {field}: {value:?}")]
    MalformedHash { field: String, value: String },

    #[error("identifier mismatch: stored {stored}, derived {derived}")]
    IdentifierMismatch { stored: String, derived: String },

    #[error("unsupported schema version: {0}")]
    UnsupportedVersion(String),

    #[error("content cannot be canonically encoded: {0}")]
    Unencodable(String),
}

impl IntegrityFailure {
    /// Short, stable name of the failure kind, for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContentTampered { .. } => "content-tampered",
            Self::ChainBroken { .. } => "chain-broken",
            Self::GenesisBroken { .. } => "genesis-broken",
            Self::TetherBroken { .. } => "tether-broken",
            Self::LinkageBroken { .. } => "linkage-broken",
            Self::MalformedHash { .. } => "malformed-hash",
            Self::IdentifierMismatch { .. } => "identifier-mismatch",
            Self::UnsupportedVersion(_) => "unsupported-version",
            Self::Unencodable(_) => "unencodable",
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
