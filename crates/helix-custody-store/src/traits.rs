//! Store trait: the abstract interface for identity and ledger persistence.
//!
//! This trait keeps the orchestrator storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use helix_custody_core::{ContentHash, IdentityRecord, LedgerEntry};

use crate::error::Result;

/// Result of inserting an identity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Record was inserted.
    Inserted,
    /// A record with the same merkle root already exists (idempotent).
    AlreadyExists,
}

/// Result of appending a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendResult {
    /// Entry became the new tail at position `seq` (0-based).
    Appended { seq: u64 },
    /// The entry does not extend the current tail. Nothing was written.
    StaleTail {
        /// Entry hash of the current tail; `None` for an empty ledger.
        current: Option<ContentHash>,
    },
    /// The entry's owner is not a stored identity. Nothing was written.
    UnknownIdentity,
}

/// The Store trait: async interface for custody persistence.
///
/// # Design Notes
///
/// - **Content-addressed identities**: records are keyed by merkle root, so
///   inserting the same record twice returns `AlreadyExists`.
/// - **Compare-and-append**: an entry is written only if its `previous_hash`
///   equals the ledger's current tail (or both are empty). The check and the
///   write happen atomically, so at most one entry ever succeeds per tail.
/// - **Verbatim documents**: records and entries are stored in their wire
///   form and read back unchanged, so stored hashes stay verifiable.
/// - **Canonical writes**: an entry carrying a non-canonical hash reference
///   is refused with `StoreError::InvalidEntry`.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Identity Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an identity record.
    async fn insert_identity(&self, record: &IdentityRecord) -> Result<InsertResult>;

    /// Insert an identity together with the first entries of its ledger.
    ///
    /// All or nothing: on `AlreadyExists` or any error, neither the record
    /// nor any entry is written. `entries` must chain from genesis and be
    /// owned by `record`.
    async fn insert_agent(
        &self,
        record: &IdentityRecord,
        entries: &[LedgerEntry],
    ) -> Result<InsertResult>;

    /// Get an identity by merkle root.
    async fn get_identity(&self, merkle_root: &ContentHash) -> Result<Option<IdentityRecord>>;

    /// List all identities in insertion order.
    async fn list_identities(&self) -> Result<Vec<IdentityRecord>>;

    /// Identities minted as successors of `parent`.
    async fn get_successors(&self, parent: &ContentHash) -> Result<Vec<IdentityRecord>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Ledger Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append an entry to the ledger of `entry.owner`.
    async fn append_entry(&self, entry: &LedgerEntry) -> Result<AppendResult>;

    /// All entries of an identity's ledger, in append order.
    async fn get_ledger(&self, identity: &ContentHash) -> Result<Vec<LedgerEntry>>;

    /// Entry hash of the ledger's last entry.
    async fn ledger_tail(&self, identity: &ContentHash) -> Result<Option<ContentHash>>;

    /// Number of entries in an identity's ledger.
    async fn ledger_len(&self, identity: &ContentHash) -> Result<u64>;
}
