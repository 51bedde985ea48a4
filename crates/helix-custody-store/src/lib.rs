//! # Helix Custody Store
//!
//! Storage abstraction for Helix custody. Provides a trait-based interface
//! for identity and ledger persistence with SQLite and in-memory
//! implementations.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`AppendResult`] - Outcome of a compare-and-append on a ledger tail
//!
//! Entries are only written with canonical hash references. Documents with
//! non-canonical references can still be read back and verified; they just
//! never enter a store through these APIs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use helix_custody_core::{append_entry, create_identity, Event};
//! use helix_custody_store::{AppendResult, SqliteStore, Store};
//!
//! async fn example() -> helix_custody_store::Result<()> {
//!     let store = SqliteStore::open("custody.db")?;
//!
//!     let identity = create_identity("custodian_alice_001", "Alpha-Agent-01").unwrap();
//!     store.insert_identity(&identity).await?;
//!
//!     let entry = append_entry(
//!         &identity.merkle_root,
//!         Event::custom("NOTE", Default::default()),
//!         None,
//!     )
//!     .unwrap();
//!     assert_eq!(store.append_entry(&entry).await?, AppendResult::Appended { seq: 0 });
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{AppendResult, InsertResult, Store};

use helix_custody_core::{ContentHash, IdentityRecord, LedgerEntry};

/// Current time in Unix milliseconds, for bookkeeping columns.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// Owner of an entry about to be written. Every hash reference must be canonical.
pub(crate) fn writable_owner(entry: &LedgerEntry) -> Result<ContentHash> {
    let malformed = entry.malformed_fields();
    match entry.owner.digest() {
        Some(owner) if malformed.is_empty() => Ok(owner),
        _ => Err(StoreError::InvalidEntry(format!(
            "{} has malformed {}",
            entry.entry_id,
            malformed.join(", ")
        ))),
    }
}

/// Check that `entries` form a chain from genesis owned by `record`.
pub(crate) fn check_initial_ledger(record: &IdentityRecord, entries: &[LedgerEntry]) -> Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        if writable_owner(entry)? != record.merkle_root {
            return Err(StoreError::InvalidEntry(format!(
                "{} is not owned by {}",
                entry.entry_id, record.id
            )));
        }
        let expected = i.checked_sub(1).map(|prev| &entries[prev].entry_hash);
        if entry.previous_hash.as_ref() != expected {
            return Err(StoreError::InvalidEntry(format!(
                "{} does not extend entry {} of {}",
                entry.entry_id, i, record.id
            )));
        }
    }
    Ok(())
}
