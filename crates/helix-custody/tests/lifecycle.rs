//! End-to-end custody lifecycle over SQLite.

use std::sync::Arc;

use helix_custody::core::{
    kinds, EntryBuilder, Event, PetitionStatus, QuorumPetition, StateChange, Timestamp,
    DEFAULT_THRESHOLD,
};
use helix_custody::store::{MemoryStore, SqliteStore, Store};
use helix_custody::{Custody, CustodyConfig, CustodyError, RenderCache, RenderSubject, Renderer};
use helix_custody_testkit::fixtures::{member_keys, roster};
use tempfile::TempDir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn open(dir: &TempDir) -> Custody<SqliteStore> {
    let store = SqliteStore::open(dir.path().join("custody.db")).unwrap();
    Custody::new(store, CustodyConfig::default())
}

#[tokio::test]
async fn test_agent_survives_reopen() {
    init_tracing();
    let dir = TempDir::new().unwrap();

    let root = {
        let custody = open(&dir);
        let agent = custody
            .create_agent("custodian_alice_001", "Alpha-Agent-01")
            .await
            .unwrap();
        custody
            .update_state(&agent.identity.merkle_root, "RESTRICTED", "policy review")
            .await
            .unwrap();
        agent.identity.merkle_root
    };

    let custody = open(&dir);
    let report = custody.verify_agent(&root).await.unwrap();
    assert!(report.is_valid());
    assert!(report.tethered);
    assert_eq!(report.entry_count, 4);
    assert_eq!(custody.current_state(&root).await.unwrap(), "RESTRICTED");

    let summary = custody.agent_summary(&root).await.unwrap();
    assert_eq!(summary.agent_name, "Alpha-Agent-01");
    assert_eq!(summary.entry_count, 4);
    assert!(!summary.revoked);
}

#[tokio::test]
async fn test_quorum_recovery_with_verified_signatures() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let custody = open(&dir);

    let agent = custody.create_agent("c1", "Alpha").await.unwrap();
    let old_root = agent.identity.merkle_root;

    let members = member_keys(4);
    let mut petition = QuorumPetition::with_check(
        agent.identity.id.as_str(),
        "new-custodian-key",
        DEFAULT_THRESHOLD,
        roster(&members),
    )
    .unwrap();
    let message = petition.signing_message().unwrap();

    // A forged signature is refused and not counted.
    let forged = members[1].1.sign_hex(b"something else");
    assert!(petition.sign(members[0].0.clone(), forged).is_err());
    assert_eq!(petition.distinct_signers(), 0);

    for (id, key) in members.iter().take(3) {
        petition.sign(id.clone(), key.sign_hex(&message)).unwrap();
    }
    assert_eq!(petition.status(), PetitionStatus::Ratified);

    let recovery = custody.execute_recovery(&petition, &old_root).await.unwrap();
    assert_eq!(recovery.revocation.event.event_type(), kinds::CUSTODY_FORCE_TRANSFER);
    assert_eq!(recovery.successor.parent, Some(old_root.into()));
    assert!(recovery.successor_genesis.is_genesis());

    // The old ledger is closed.
    let refused = custody
        .update_state(&old_root, "ACTIVE", "after revocation")
        .await;
    assert!(matches!(refused, Err(CustodyError::Revoked(_))));
    assert!(custody.verify_agent(&old_root).await.unwrap().is_valid());

    let successor = recovery.successor.merkle_root;
    assert!(custody.verify_agent(&successor).await.unwrap().is_valid());

    let lineage = custody.lineage(&successor).await.unwrap();
    let roots: Vec<_> = lineage.iter().map(|r| r.merkle_root).collect();
    assert_eq!(roots, vec![successor, old_root]);

    let agents = custody.list_agents().await.unwrap();
    assert_eq!(agents.len(), 2);
    assert!(agents[0].revoked);
    assert!(!agents[1].revoked);
}

#[tokio::test]
async fn test_concurrent_updates_never_fork() {
    init_tracing();
    let custody = Arc::new(Custody::new(
        MemoryStore::new(),
        CustodyConfig::default(),
    ));
    let agent = custody.create_agent("c1", "Racer").await.unwrap();
    let root = agent.identity.merkle_root;

    let mut handles = Vec::new();
    for i in 0..8 {
        let custody = Arc::clone(&custody);
        handles.push(tokio::spawn(async move {
            custody
                .update_state(&root, &format!("STATE_{}", i), "race")
                .await
        }));
    }

    let mut appended = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => appended += 1,
            Err(CustodyError::StaleTail { .. }) => {}
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert!(appended >= 1);
    let report = custody.verify_agent(&root).await.unwrap();
    assert!(report.is_valid());
    assert_eq!(report.entry_count, 3 + appended);
}

#[tokio::test]
async fn test_corrupt_tail_blocks_append() {
    init_tracing();
    let custody = Custody::new(MemoryStore::new(), CustodyConfig::default());
    let agent = custody.create_agent("c1", "A").await.unwrap();
    let root = agent.identity.merkle_root;

    let mut bad = EntryBuilder::new(root, Event::StateChange(StateChange::new("ACTIVE", "IDLE")))
        .previous(agent.entries.last().map(|e| e.entry_hash.clone()))
        .timestamp(Timestamp::from_text("2025-12-29T12:00:00.000000Z"))
        .build()
        .unwrap();
    bad.event = Event::StateChange(StateChange::new("ACTIVE", "UNRESTRICTED"));
    custody.store().append_entry(&bad).await.unwrap();

    let result = custody.update_state(&root, "ACTIVE", "resume").await;
    assert!(matches!(result, Err(CustodyError::Integrity { .. })));

    let report = custody.verify_agent(&root).await.unwrap();
    assert_eq!(report.ledger.failing_indices(), vec![3]);
}

#[tokio::test]
async fn test_corrupt_tail_allowed_without_preflight() {
    let config = CustodyConfig {
        verify_before_append: false,
        ..CustodyConfig::default()
    };
    let custody = Custody::new(MemoryStore::new(), config);
    let agent = custody.create_agent("c1", "A").await.unwrap();
    let root = agent.identity.merkle_root;

    let mut bad = EntryBuilder::new(root, Event::StateChange(StateChange::new("ACTIVE", "IDLE")))
        .previous(agent.entries.last().map(|e| e.entry_hash.clone()))
        .build()
        .unwrap();
    bad.timestamp = Timestamp::from_text("1999-01-01T00:00:00.000000Z");
    custody.store().append_entry(&bad).await.unwrap();

    custody.update_state(&root, "ACTIVE", "resume").await.unwrap();
    let report = custody.verify_agent(&root).await.unwrap();
    assert_eq!(report.ledger.failing_indices(), vec![3]);
}

#[tokio::test]
async fn test_render_is_cached_per_state() {
    struct Badge;
    impl Renderer for Badge {
        fn render(&self, subject: &RenderSubject) -> anyhow::Result<String> {
            Ok(format!("<svg><text>{} {}</text></svg>", subject.agent_name, subject.state))
        }
    }

    let custody =
        Custody::new(MemoryStore::new(), CustodyConfig::default()).with_renderer(Arc::new(Badge));
    let agent = custody.create_agent("c1", "A").await.unwrap();
    let root = agent.identity.merkle_root;
    let mut cache = RenderCache::new();

    let first = custody.render(&root, &mut cache).await.unwrap().unwrap();
    assert!(first.contains("ACTIVE"));
    custody.render(&root, &mut cache).await.unwrap();
    assert_eq!(cache.hits(), 1);

    custody.update_state(&root, "RESTRICTED", "review").await.unwrap();
    let after = custody.render(&root, &mut cache).await.unwrap().unwrap();
    assert!(after.contains("RESTRICTED"));
    assert_eq!(cache.misses(), 2);
}
