//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use helix_custody_core::{ContentHash, HashRef, IdentityRecord, LedgerEntry};

use crate::error::{Result, StoreError};
use crate::traits::{AppendResult, InsertResult, Store};
use crate::{check_initial_ledger, writable_owner};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Identities indexed by merkle root.
    identities: HashMap<ContentHash, IdentityRecord>,

    /// Insertion order of identities.
    order: Vec<ContentHash>,

    /// Ledgers indexed by owning identity.
    ledgers: HashMap<ContentHash, Vec<LedgerEntry>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Task(format!("lock poisoned: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_identity(&self, record: &IdentityRecord) -> Result<InsertResult> {
        let mut inner = self.write()?;

        if inner.identities.contains_key(&record.merkle_root) {
            return Ok(InsertResult::AlreadyExists);
        }

        inner.identities.insert(record.merkle_root, record.clone());
        inner.order.push(record.merkle_root);
        Ok(InsertResult::Inserted)
    }

    async fn insert_agent(
        &self,
        record: &IdentityRecord,
        entries: &[LedgerEntry],
    ) -> Result<InsertResult> {
        check_initial_ledger(record, entries)?;
        let mut inner = self.write()?;

        if inner.identities.contains_key(&record.merkle_root) {
            return Ok(InsertResult::AlreadyExists);
        }

        inner.identities.insert(record.merkle_root, record.clone());
        inner.order.push(record.merkle_root);
        inner.ledgers.insert(record.merkle_root, entries.to_vec());
        Ok(InsertResult::Inserted)
    }

    async fn get_identity(&self, merkle_root: &ContentHash) -> Result<Option<IdentityRecord>> {
        let inner = self.read()?;
        Ok(inner.identities.get(merkle_root).cloned())
    }

    async fn list_identities(&self) -> Result<Vec<IdentityRecord>> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|hash| inner.identities.get(hash).cloned())
            .collect())
    }

    async fn get_successors(&self, parent: &ContentHash) -> Result<Vec<IdentityRecord>> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|hash| inner.identities.get(hash))
            .filter(|record| record.parent.as_ref().is_some_and(|p| p == parent))
            .cloned()
            .collect())
    }

    async fn append_entry(&self, entry: &LedgerEntry) -> Result<AppendResult> {
        let owner = writable_owner(entry)?;
        let mut inner = self.write()?;

        if !inner.identities.contains_key(&owner) {
            return Ok(AppendResult::UnknownIdentity);
        }

        let ledger = inner.ledgers.entry(owner).or_default();
        let current = ledger.last().and_then(|e| e.entry_hash.digest());
        if entry.previous_hash.as_ref().and_then(HashRef::digest) != current {
            debug!(identity = %owner, "append rejected: stale tail");
            return Ok(AppendResult::StaleTail { current });
        }

        ledger.push(entry.clone());
        Ok(AppendResult::Appended {
            seq: (ledger.len() - 1) as u64,
        })
    }

    async fn get_ledger(&self, identity: &ContentHash) -> Result<Vec<LedgerEntry>> {
        let inner = self.read()?;
        Ok(inner.ledgers.get(identity).cloned().unwrap_or_default())
    }

    async fn ledger_tail(&self, identity: &ContentHash) -> Result<Option<ContentHash>> {
        let inner = self.read()?;
        Ok(inner
            .ledgers
            .get(identity)
            .and_then(|ledger| ledger.last())
            .and_then(|e| e.entry_hash.digest()))
    }

    async fn ledger_len(&self, identity: &ContentHash) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.ledgers.get(identity).map_or(0, |l| l.len() as u64))
    }
}
