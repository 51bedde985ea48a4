//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info};

use helix_custody_core::{ContentHash, HashRef, IdentityRecord, LedgerEntry};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::{check_initial_ledger, now_millis, writable_owner};
use crate::traits::{AppendResult, InsertResult, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        info!(path = %path.display(), "opened custody store");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = lock(&conn)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock()
        .map_err(|e| StoreError::Task(format!("mutex poisoned: {}", e)))
}

fn hash_from_blob(bytes: Vec<u8>) -> Result<ContentHash> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|b: Vec<u8>| StoreError::Serialization(format!("hash blob of {} bytes", b.len())))?;
    Ok(ContentHash::from_bytes(arr))
}

fn parent_blob(record: &IdentityRecord) -> Option<Vec<u8>> {
    record
        .parent
        .as_ref()
        .and_then(HashRef::digest)
        .map(|p| p.as_bytes().to_vec())
}

/// Insert the identity row. Returns whether a row was written.
fn insert_identity_row(conn: &Connection, record: &IdentityRecord, document: &str) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO identities
            (merkle_root, record_id, agent_name, custodian_id, parent, document, inserted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.merkle_root.as_bytes().as_slice(),
            record.id.as_str(),
            record.agent_name,
            record.custodian_id,
            parent_blob(record),
            document,
            now_millis(),
        ],
    )?;
    Ok(changed > 0)
}

fn insert_entry_row(
    conn: &Connection,
    owner: &ContentHash,
    seq: i64,
    entry: &LedgerEntry,
    document: &str,
) -> Result<()> {
    conn.execute(
        "INSERT INTO entries
            (identity, seq, entry_hash, previous_hash, event_type, document, appended_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            owner.as_bytes().as_slice(),
            seq,
            entry.entry_hash.digest().map(|h| h.as_bytes().to_vec()),
            entry
                .previous_hash
                .as_ref()
                .and_then(HashRef::digest)
                .map(|p| p.as_bytes().to_vec()),
            entry.event.event_type(),
            document,
            now_millis(),
        ],
    )?;
    Ok(())
}

fn decode_identities(documents: Vec<String>) -> Result<Vec<IdentityRecord>> {
    documents
        .iter()
        .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_identity(&self, record: &IdentityRecord) -> Result<InsertResult> {
        let document = serde_json::to_string(record)?;
        let record = record.clone();

        self.run(move |conn| {
            if insert_identity_row(conn, &record, &document)? {
                debug!(record_id = %record.id, "identity inserted");
                Ok(InsertResult::Inserted)
            } else {
                Ok(InsertResult::AlreadyExists)
            }
        })
        .await
    }

    async fn insert_agent(
        &self,
        record: &IdentityRecord,
        entries: &[LedgerEntry],
    ) -> Result<InsertResult> {
        check_initial_ledger(record, entries)?;
        let document = serde_json::to_string(record)?;
        let entry_documents = entries
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let record = record.clone();
        let entries = entries.to_vec();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            // Dropping the transaction rolls back.
            if !insert_identity_row(&tx, &record, &document)? {
                return Ok(InsertResult::AlreadyExists);
            }
            for (seq, (entry, doc)) in entries.iter().zip(&entry_documents).enumerate() {
                insert_entry_row(&tx, &record.merkle_root, seq as i64, entry, doc)?;
            }
            tx.commit()?;

            debug!(record_id = %record.id, entries = entries.len(), "agent inserted");
            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_identity(&self, merkle_root: &ContentHash) -> Result<Option<IdentityRecord>> {
        let key = *merkle_root;

        self.run(move |conn| {
            let document: Option<String> = conn
                .query_row(
                    "SELECT document FROM identities WHERE merkle_root = ?1",
                    params![key.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;

            document
                .map(|doc| serde_json::from_str(&doc).map_err(StoreError::from))
                .transpose()
        })
        .await
    }

    async fn list_identities(&self) -> Result<Vec<IdentityRecord>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT document FROM identities ORDER BY rowid")?;
            let documents = stmt
                .query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            decode_identities(documents)
        })
        .await
    }

    async fn get_successors(&self, parent: &ContentHash) -> Result<Vec<IdentityRecord>> {
        let parent = *parent;

        self.run(move |conn| {
            let mut stmt =
                conn.prepare("SELECT document FROM identities WHERE parent = ?1 ORDER BY rowid")?;
            let documents = stmt
                .query_map(params![parent.as_bytes().as_slice()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;
            decode_identities(documents)
        })
        .await
    }

    async fn append_entry(&self, entry: &LedgerEntry) -> Result<AppendResult> {
        let owner_hash = writable_owner(entry)?;
        let document = serde_json::to_string(entry)?;
        let entry = entry.clone();

        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let owner = owner_hash.as_bytes().to_vec();

            let known: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM identities WHERE merkle_root = ?1",
                    params![owner],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Ok(AppendResult::UnknownIdentity);
            }

            let tail: Option<(i64, Vec<u8>)> = tx
                .query_row(
                    "SELECT seq, entry_hash FROM entries WHERE identity = ?1
                     ORDER BY seq DESC LIMIT 1",
                    params![owner],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let (next_seq, current) = match tail {
                Some((seq, hash)) => (seq + 1, Some(hash_from_blob(hash)?)),
                None => (0, None),
            };

            if entry.previous_hash.as_ref().and_then(HashRef::digest) != current {
                debug!(identity = %owner_hash, "append rejected: stale tail");
                return Ok(AppendResult::StaleTail { current });
            }

            insert_entry_row(&tx, &owner_hash, next_seq, &entry, &document)?;
            tx.commit()?;

            Ok(AppendResult::Appended {
                seq: next_seq as u64,
            })
        })
        .await
    }

    async fn get_ledger(&self, identity: &ContentHash) -> Result<Vec<LedgerEntry>> {
        let identity = *identity;

        self.run(move |conn| {
            let mut stmt =
                conn.prepare("SELECT document FROM entries WHERE identity = ?1 ORDER BY seq")?;
            let documents = stmt
                .query_map(params![identity.as_bytes().as_slice()], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<String>>>()?;

            documents
                .iter()
                .map(|doc| serde_json::from_str(doc).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn ledger_tail(&self, identity: &ContentHash) -> Result<Option<ContentHash>> {
        let identity = *identity;

        self.run(move |conn| {
            let hash: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT entry_hash FROM entries WHERE identity = ?1
                     ORDER BY seq DESC LIMIT 1",
                    params![identity.as_bytes().as_slice()],
                    |row| row.get(0),
                )
                .optional()?;
            hash.map(hash_from_blob).transpose()
        })
        .await
    }

    async fn ledger_len(&self, identity: &ContentHash) -> Result<u64> {
        let identity = *identity;

        self.run(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM entries WHERE identity = ?1",
                params![identity.as_bytes().as_slice()],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helix_custody_core::{
        append_entry, create_identity, mint_successor, verify_ledger, Event, Lineage,
        StateChange, SuccessorSeed,
    };
    use serde_json::{json, Map};

    fn chain(identity: &IdentityRecord, n: usize) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = Vec::new();
        for i in 0..n {
            let mut details = Map::new();
            details.insert("n".into(), json!(i));
            let prev = entries.last().map(|e| e.entry_hash.clone());
            entries.push(
                append_entry(&identity.merkle_root, Event::custom("NOTE", details), prev).unwrap(),
            );
        }
        entries
    }

    #[tokio::test]
    async fn test_insert_and_get_identity() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = create_identity("c1", "A").unwrap();

        let result = store.insert_identity(&identity).await.unwrap();
        assert_eq!(result, InsertResult::Inserted);

        let retrieved = store.get_identity(&identity.merkle_root).await.unwrap().unwrap();
        assert_eq!(retrieved, identity);

        let missing = store.get_identity(&ContentHash::digest(b"none")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_idempotent_insert() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = create_identity("c1", "A").unwrap();

        let r1 = store.insert_identity(&identity).await.unwrap();
        assert_eq!(r1, InsertResult::Inserted);

        let r2 = store.insert_identity(&identity).await.unwrap();
        assert_eq!(r2, InsertResult::AlreadyExists);
    }

    #[tokio::test]
    async fn test_ledger_roundtrip_verifies() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = create_identity("c1", "A").unwrap();
        store.insert_identity(&identity).await.unwrap();

        let entries = chain(&identity, 4);
        for (i, entry) in entries.iter().enumerate() {
            let result = store.append_entry(entry).await.unwrap();
            assert_eq!(result, AppendResult::Appended { seq: i as u64 });
        }

        let stored = store.get_ledger(&identity.merkle_root).await.unwrap();
        assert_eq!(stored, entries);
        assert!(verify_ledger(&stored, &identity.merkle_root).is_valid());
        assert_eq!(store.ledger_len(&identity.merkle_root).await.unwrap(), 4);
        assert_eq!(
            store.ledger_tail(&identity.merkle_root).await.unwrap(),
            entries[3].entry_hash.digest()
        );
    }

    #[tokio::test]
    async fn test_stale_tail_rejected() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = create_identity("c1", "A").unwrap();
        store.insert_identity(&identity).await.unwrap();

        let entries = chain(&identity, 2);
        store.append_entry(&entries[0]).await.unwrap();
        store.append_entry(&entries[1]).await.unwrap();

        // Built on entry 0, but entry 1 is already the tail.
        let late = append_entry(
            &identity.merkle_root,
            Event::StateChange(StateChange::new("ACTIVE", "PAUSED")),
            Some(entries[0].entry_hash.clone()),
        )
        .unwrap();
        assert_eq!(
            store.append_entry(&late).await.unwrap(),
            AppendResult::StaleTail {
                current: entries[1].entry_hash.digest()
            }
        );
        assert_eq!(store.ledger_len(&identity.merkle_root).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_appends_single_winner() {
        let store = Arc::new(SqliteStore::open_memory().unwrap());
        let identity = create_identity("c1", "A").unwrap();
        store.insert_identity(&identity).await.unwrap();

        let genesis = chain(&identity, 1).remove(0);
        store.append_entry(&genesis).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let mut details = Map::new();
            details.insert("writer".into(), json!(i));
            let entry = append_entry(
                &identity.merkle_root,
                Event::custom("NOTE", details),
                Some(genesis.entry_hash.clone()),
            )
            .unwrap();
            handles.push(tokio::spawn(async move { store.append_entry(&entry).await }));
        }

        let mut appended = 0;
        for handle in handles {
            if let AppendResult::Appended { .. } = handle.await.unwrap().unwrap() {
                appended += 1;
            }
        }
        assert_eq!(appended, 1);
        assert_eq!(store.ledger_len(&identity.merkle_root).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_unknown_identity() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = create_identity("c1", "A").unwrap();
        let entry = chain(&identity, 1).remove(0);

        assert_eq!(
            store.append_entry(&entry).await.unwrap(),
            AppendResult::UnknownIdentity
        );
    }

    #[tokio::test]
    async fn test_successor_lookup() {
        let store = SqliteStore::open_memory().unwrap();
        let root = create_identity("c1", "A").unwrap();
        let seed = SuccessorSeed {
            agent_id: "A".into(),
            custodian_pubkey: "new-key".into(),
            lineage: Lineage::RecoveredViaQuorum,
        };
        let successor = mint_successor(&seed, &root.merkle_root).unwrap();

        store.insert_identity(&root).await.unwrap();
        store.insert_identity(&successor).await.unwrap();

        let found = store.get_successors(&root.merkle_root).await.unwrap();
        assert_eq!(found, vec![successor.clone()]);
        assert_eq!(store.list_identities().await.unwrap(), vec![root, successor]);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custody.db");
        let identity = create_identity("c1", "A").unwrap();
        let entries = chain(&identity, 3);

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_identity(&identity).await.unwrap();
            for entry in &entries {
                store.append_entry(entry).await.unwrap();
            }
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(
            store.get_identity(&identity.merkle_root).await.unwrap(),
            Some(identity.clone())
        );
        assert_eq!(store.get_ledger(&identity.merkle_root).await.unwrap(), entries);
    }

    #[tokio::test]
    async fn test_insert_agent_rolls_back_on_conflict() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = create_identity("c1", "A").unwrap();
        let entries = chain(&identity, 3);

        assert_eq!(
            store.insert_agent(&identity, &entries).await.unwrap(),
            InsertResult::Inserted
        );
        assert_eq!(store.get_ledger(&identity.merkle_root).await.unwrap(), entries);

        assert_eq!(
            store.insert_agent(&identity, &chain(&identity, 1)).await.unwrap(),
            InsertResult::AlreadyExists
        );
        assert_eq!(store.ledger_len(&identity.merkle_root).await.unwrap(), 3);

        // The next append continues after the inserted entries.
        let next = append_entry(
            &identity.merkle_root,
            Event::custom("NOTE", Map::new()),
            Some(entries[2].entry_hash.clone()),
        )
        .unwrap();
        assert_eq!(
            store.append_entry(&next).await.unwrap(),
            AppendResult::Appended { seq: 3 }
        );
    }

    #[tokio::test]
    async fn test_insert_agent_refuses_foreign_entries() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = create_identity("c1", "A").unwrap();
        let other = create_identity("c2", "B").unwrap();

        let result = store.insert_agent(&identity, &chain(&other, 1)).await;
        assert!(matches!(result, Err(StoreError::InvalidEntry(_))));
        assert!(store.list_identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stored_document_with_bad_reference_still_loads() {
        let store = SqliteStore::open_memory().unwrap();
        let identity = create_identity("c1", "A").unwrap();
        let entries = chain(&identity, 3);
        store.insert_agent(&identity, &entries).await.unwrap();

        let mut document = serde_json::to_value(&entries[1]).unwrap();
        document["previous_hash"] = json!("tampered");
        {
            let conn = lock(&store.conn).unwrap();
            conn.execute(
                "UPDATE entries SET document = ?1 WHERE seq = 1",
                params![document.to_string()],
            )
            .unwrap();
        }

        let stored = store.get_ledger(&identity.merkle_root).await.unwrap();
        let report = verify_ledger(&stored, &identity.merkle_root);
        assert_eq!(report.failing_indices(), vec![1]);
    }
}
