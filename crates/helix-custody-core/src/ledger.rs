//! Ledger: an identity's ordered, append-only list of entries.
//!
//! The in-memory counterpart of what a store persists. Appends are accepted
//! only when they are tethered to the ledger's identity and extend its
//! current tail.

use crate::crypto::{ContentHash, HashRef};
use crate::entry::{EntryBuilder, LedgerEntry};
use crate::error::{CoreError, Result};
use crate::event::Event;
use crate::types::{SchemaVersion, Timestamp};
use crate::verify::{verify_ledger, LedgerReport};

/// State reported for a ledger with no state changes.
pub const UNKNOWN_STATE: &str = "UNKNOWN";

/// The ledger of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    identity: ContentHash,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// An empty ledger for `identity`.
    pub fn new(identity: ContentHash) -> Self {
        Self {
            identity,
            entries: Vec::new(),
        }
    }

    /// Wrap entries read from storage. Nothing is checked; use [`Ledger::verify`].
    pub fn from_entries(identity: ContentHash, entries: Vec<LedgerEntry>) -> Self {
        Self { identity, entries }
    }

    pub fn identity(&self) -> &ContentHash {
        &self.identity
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<LedgerEntry> {
        self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry hash of the last entry, which the next entry must reference.
    pub fn tail_hash(&self) -> Option<HashRef> {
        self.entries.last().map(|e| e.entry_hash.clone())
    }

    /// Append a prebuilt entry.
    pub fn append(&mut self, entry: LedgerEntry) -> Result<&LedgerEntry> {
        if entry.owner != self.identity {
            return Err(CoreError::Tether {
                expected: self.identity,
                found: entry.owner.clone(),
            });
        }
        let tail = self.tail_hash();
        if entry.previous_hash != tail {
            return Err(CoreError::StaleTail {
                expected: tail,
                got: entry.previous_hash,
            });
        }

        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Build an entry for `event` on the current tail and append it.
    pub fn record(&mut self, event: Event) -> Result<&LedgerEntry> {
        self.record_with(event, SchemaVersion::CURRENT, Timestamp::now())
    }

    /// As [`Ledger::record`], with an explicit version and timestamp.
    pub fn record_with(
        &mut self,
        event: Event,
        version: SchemaVersion,
        timestamp: Timestamp,
    ) -> Result<&LedgerEntry> {
        let entry = EntryBuilder::new(self.identity, event)
            .previous(self.tail_hash())
            .version(version)
            .timestamp(timestamp)
            .build()?;
        self.append(entry)
    }

    pub fn verify(&self) -> LedgerReport {
        verify_ledger(&self.entries, &self.identity)
    }

    /// The `to` state of the most recent state change, or [`UNKNOWN_STATE`].
    pub fn current_state(&self) -> &str {
        self.entries
            .iter()
            .rev()
            .find_map(|e| e.event.state_change())
            .map(|change| change.to.as_str())
            .unwrap_or(UNKNOWN_STATE)
    }

    /// Whether the ledger ends in a custody revocation.
    pub fn is_revoked(&self) -> bool {
        self.entries.last().is_some_and(|e| e.event.is_revocation())
    }
}
