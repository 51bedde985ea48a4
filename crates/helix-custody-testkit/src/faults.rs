//! A store wrapper that fails chosen operations on demand.
//!
//! Used to check that multi-step custody operations leave a state they can
//! be retried from when a write fails part way.

use std::collections::HashSet;
use std::io;
use std::sync::Mutex;

use async_trait::async_trait;
use helix_custody_core::{ContentHash, IdentityRecord, LedgerEntry};
use helix_custody_store::{AppendResult, InsertResult, Result, Store, StoreError};

/// Write operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    InsertIdentity,
    InsertAgent,
    AppendEntry,
}

/// Delegates to `inner` except for operations marked as failing.
///
/// A failing operation returns an I/O error before reaching `inner`, so it
/// writes nothing.
pub struct FaultyStore<S> {
    inner: S,
    failing: Mutex<HashSet<StoreOp>>,
}

impl<S: Store> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make every call of `op` fail until [`FaultyStore::heal`].
    pub fn fail(&self, op: StoreOp) {
        self.ops().insert(op);
    }

    pub fn heal(&self, op: StoreOp) {
        self.ops().remove(&op);
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn ops(&self) -> std::sync::MutexGuard<'_, HashSet<StoreOp>> {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(&self, op: StoreOp) -> Result<()> {
        if self.ops().contains(&op) {
            return Err(StoreError::Io(io::Error::new(
                io::ErrorKind::Other,
                format!("simulated {:?} failure", op),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: Store> Store for FaultyStore<S> {
    async fn insert_identity(&self, record: &IdentityRecord) -> Result<InsertResult> {
        self.check(StoreOp::InsertIdentity)?;
        self.inner.insert_identity(record).await
    }

    async fn insert_agent(
        &self,
        record: &IdentityRecord,
        entries: &[LedgerEntry],
    ) -> Result<InsertResult> {
        self.check(StoreOp::InsertAgent)?;
        self.inner.insert_agent(record, entries).await
    }

    async fn get_identity(&self, merkle_root: &ContentHash) -> Result<Option<IdentityRecord>> {
        self.inner.get_identity(merkle_root).await
    }

    async fn list_identities(&self) -> Result<Vec<IdentityRecord>> {
        self.inner.list_identities().await
    }

    async fn get_successors(&self, parent: &ContentHash) -> Result<Vec<IdentityRecord>> {
        self.inner.get_successors(parent).await
    }

    async fn append_entry(&self, entry: &LedgerEntry) -> Result<AppendResult> {
        self.check(StoreOp::AppendEntry)?;
        self.inner.append_entry(entry).await
    }

    async fn get_ledger(&self, identity: &ContentHash) -> Result<Vec<LedgerEntry>> {
        self.inner.get_ledger(identity).await
    }

    async fn ledger_tail(&self, identity: &ContentHash) -> Result<Option<ContentHash>> {
        self.inner.ledger_tail(identity).await
    }

    async fn ledger_len(&self, identity: &ContentHash) -> Result<u64> {
        self.inner.ledger_len(identity).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestFixture;
    use helix_custody_store::MemoryStore;

    #[tokio::test]
    async fn test_failing_op_writes_nothing() {
        let fixture = TestFixture::new();
        let identity = fixture.make_identity("c1", "A");
        let store = FaultyStore::new(MemoryStore::new());

        store.fail(StoreOp::InsertIdentity);
        assert!(matches!(
            store.insert_identity(&identity).await,
            Err(StoreError::Io(_))
        ));
        assert!(store.list_identities().await.unwrap().is_empty());

        store.heal(StoreOp::InsertIdentity);
        assert_eq!(
            store.insert_identity(&identity).await.unwrap(),
            InsertResult::Inserted
        );
        assert_eq!(store.inner().list_identities().await.unwrap(), vec![identity]);
    }
}
