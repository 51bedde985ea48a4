//! Test fixtures and helpers.
//!
//! Common setup code for integration tests. Timestamps come from a fixed
//! clock so that every hash a fixture produces is reproducible.

use std::sync::atomic::{AtomicU32, Ordering};

use helix_custody_core::{
    CapabilityInit, Ed25519Roster, Event, IdentityBuilder, IdentityRecord, Instantiation,
    Keypair, Ledger, QuorumPetition, SchemaVersion, StateChange, Timestamp,
};
use helix_custody_store::MemoryStore;

/// A test fixture with a memory store and a deterministic clock.
pub struct TestFixture {
    pub store: MemoryStore,
    pub version: SchemaVersion,
    tick: AtomicU32,
}

impl TestFixture {
    /// Create a new fixture writing the current schema version.
    pub fn new() -> Self {
        Self::with_version(SchemaVersion::CURRENT)
    }

    pub fn with_version(version: SchemaVersion) -> Self {
        Self {
            store: MemoryStore::new(),
            version,
            tick: AtomicU32::new(0),
        }
    }

    /// The next timestamp, one second after the previous one.
    pub fn timestamp(&self) -> Timestamp {
        let n = self.tick.fetch_add(1, Ordering::SeqCst);
        Timestamp::from_text(format!(
            "2025-12-29T{:02}:{:02}:{:02}.000000Z",
            12 + (n / 3600) % 12,
            (n / 60) % 60,
            n % 60
        ))
    }

    /// Build a root identity.
    pub fn make_identity(&self, custodian_id: &str, agent_name: &str) -> IdentityRecord {
        IdentityBuilder::new(custodian_id, agent_name)
            .version(self.version.clone())
            .timestamp(self.timestamp())
            .build()
            .expect("fixture identity inputs are valid")
    }

    /// Build a ledger of `len` entries: instantiation, capability init, then
    /// alternating state changes.
    pub fn make_ledger(&self, identity: &IdentityRecord, len: usize) -> Ledger {
        let mut ledger = Ledger::new(identity.merkle_root);
        for event in self.standard_events(len) {
            ledger
                .record_with(event, self.version.clone(), self.timestamp())
                .expect("fixture events are encodable");
        }
        ledger
    }

    /// The first `len` events of a typical agent history.
    pub fn standard_events(&self, len: usize) -> Vec<Event> {
        let mut events = vec![
            Event::Instantiation(Instantiation {
                status: "created".into(),
                resources: vec!["compute".into(), "memory".into()],
                purpose: Some("autonomous_agent".into()),
            }),
            Event::CapabilityInit(CapabilityInit {
                capabilities: vec!["reasoning".into()],
                restrictions: vec!["no_financial_transfers".into()],
            }),
            Event::StateChange(StateChange::new("CREATED", "ACTIVE")),
        ];
        let mut state = "ACTIVE";
        while events.len() < len {
            let next = if state == "ACTIVE" { "RESTRICTED" } else { "ACTIVE" };
            events.push(Event::StateChange(StateChange::new(state, next)));
            state = next;
        }
        events.truncate(len);
        events
    }

    /// A petition for `target` that has been signed by `signers` distinct
    /// members, without signature verification.
    pub fn signed_petition(&self, target: &str, threshold: usize, signers: usize) -> QuorumPetition {
        let mut petition = QuorumPetition::new(target, "custodian-successor-key", threshold)
            .expect("fixture petition inputs are valid");
        for i in 0..signers {
            petition
                .sign_at(format!("member-{}", i), format!("sig-{}", i), self.timestamp())
                .expect("opaque signatures accept non-empty input");
        }
        petition
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic quorum members with Ed25519 keys.
pub fn member_keys(count: usize) -> Vec<(String, Keypair)> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            (format!("member-{}", i), Keypair::from_seed(&seed))
        })
        .collect()
}

/// Quorum members with freshly generated keys.
pub fn random_member_keys(count: usize) -> Vec<(String, Keypair)> {
    (0..count)
        .map(|i| {
            let seed: [u8; 32] = rand::random();
            (format!("member-{}", i), Keypair::from_seed(&seed))
        })
        .collect()
}

/// A roster registering every member's public key.
pub fn roster(members: &[(String, Keypair)]) -> Ed25519Roster {
    members
        .iter()
        .fold(Ed25519Roster::new(), |roster, (id, key)| {
            roster.with_member(id.clone(), key.public_key())
        })
}
