//! Custody: the orchestrator over identities, ledgers and quorum recovery.
//!
//! Every write goes through the store's compare-and-append, so two callers
//! racing on the same ledger can never fork it: one wins, the other gets
//! [`CustodyError::StaleTail`] and nothing is written.
//!
//! Multi-record operations are ordered so that a failure part way leaves a
//! state the same call can resume from: an agent's identity and first
//! entries are stored in one atomic insert, and a recovery stores the
//! successor before it closes the old ledger.

use std::sync::Arc;

use helix_custody_core::{
    verify_entry, verify_identity, verify_ledger, CapabilityInit, ContentHash, EntryBuilder,
    Event, HashRef, IdentityBuilder, IdentityRecord, IdentityReport, Instantiation,
    IntegrityFailure, Ledger, LedgerEntry, LedgerReport, OpaqueSignatures, QuorumPetition,
    RecordId, SignatureCheck, StateChange, SuccessorSeed, Timestamp,
};
use helix_custody_store::{AppendResult, InsertResult, Store};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CustodyConfig;
use crate::error::{CustodyError, Result};
use crate::render::{RenderCache, RenderSubject, Renderer};

/// Status of a freshly created agent.
const CREATED_STATUS: &str = "created";
/// Purpose recorded on a root agent's INSTANTIATION entry.
const AGENT_PURPOSE: &str = "autonomous_agent";
const STATE_CREATED: &str = "CREATED";
const STATE_ACTIVE: &str = "ACTIVE";

/// A new agent: its identity and the entries recorded at creation.
#[derive(Debug, Clone)]
pub struct CreatedAgent {
    pub identity: IdentityRecord,
    pub entries: Vec<LedgerEntry>,
}

/// Result of a full integrity audit.
#[derive(Debug, Clone, Serialize)]
pub struct CustodyReport {
    pub identity: IdentityReport,
    pub ledger: LedgerReport,
    /// Every entry is owned by the identity.
    pub tethered: bool,
    pub entry_count: usize,
}

impl CustodyReport {
    pub fn is_valid(&self) -> bool {
        self.identity.is_valid() && self.ledger.is_valid()
    }
}

/// One line of an agent listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSummary {
    pub record_id: RecordId,
    pub merkle_root: ContentHash,
    pub agent_name: String,
    pub custodian_id: String,
    pub state: String,
    pub entry_count: usize,
    pub last_activity: Option<Timestamp>,
    pub parent: Option<HashRef>,
    pub revoked: bool,
}

/// Outcome of an executed quorum recovery.
#[derive(Debug, Clone)]
pub struct Recovery {
    /// Terminal entry appended to the old ledger.
    pub revocation: LedgerEntry,
    pub successor: IdentityRecord,
    /// Genesis entry of the successor's ledger.
    pub successor_genesis: LedgerEntry,
}

/// The custody orchestrator.
pub struct Custody<S: Store> {
    store: Arc<S>,
    config: CustodyConfig,
    renderer: Option<Arc<dyn Renderer>>,
}

impl<S: Store> Custody<S> {
    /// Create an orchestrator over `store`.
    pub fn new(store: S, config: CustodyConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
            renderer: None,
        }
    }

    /// Inject a renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Agent Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an agent: its identity plus INSTANTIATION, CAPABILITY_INIT and
    /// a CREATED → ACTIVE state change.
    pub async fn create_agent(&self, custodian_id: &str, agent_name: &str) -> Result<CreatedAgent> {
        self.create_agent_at(custodian_id, agent_name, Timestamp::now())
            .await
    }

    /// As [`Custody::create_agent`], stamping the identity and its first
    /// entries with `timestamp`.
    ///
    /// Nothing is stored unless all of it is. An identical record already in
    /// the store is [`CustodyError::AlreadyExists`].
    pub async fn create_agent_at(
        &self,
        custodian_id: &str,
        agent_name: &str,
        timestamp: Timestamp,
    ) -> Result<CreatedAgent> {
        let identity = IdentityBuilder::new(custodian_id, agent_name)
            .version(self.config.schema_version.clone())
            .timestamp(timestamp.clone())
            .build()?;

        let events = [
            Event::Instantiation(Instantiation {
                status: CREATED_STATUS.to_string(),
                resources: self.config.initial_resources.clone(),
                purpose: Some(AGENT_PURPOSE.to_string()),
            }),
            Event::CapabilityInit(CapabilityInit {
                capabilities: self.config.initial_capabilities.clone(),
                restrictions: self.config.initial_restrictions.clone(),
            }),
            Event::StateChange(StateChange::new(STATE_CREATED, STATE_ACTIVE)),
        ];

        let mut ledger = Ledger::new(identity.merkle_root);
        for event in events {
            ledger.record_with(event, self.config.schema_version.clone(), timestamp.clone())?;
        }
        let entries = ledger.into_entries();

        if self.store.insert_agent(&identity, &entries).await? == InsertResult::AlreadyExists {
            return Err(CustodyError::AlreadyExists(identity.merkle_root));
        }

        info!(
            record_id = %identity.id,
            agent = %identity.agent_name,
            custodian = %identity.custodian_id,
            "agent created"
        );
        Ok(CreatedAgent { identity, entries })
    }

    /// Append an event to an agent's ledger.
    pub async fn append_event(&self, identity: &ContentHash, event: Event) -> Result<LedgerEntry> {
        self.require_identity(identity).await?;
        let ledger = self.store.get_ledger(identity).await?;

        if let Some(tail) = ledger.last() {
            if self.config.verify_before_append {
                self.check_tail(identity, tail)?;
            }
            if tail.event.is_revocation() {
                return Err(CustodyError::Revoked(*identity));
            }
        }

        let previous = ledger.last().map(|e| e.entry_hash.clone());
        self.commit(identity, event, previous).await
    }

    /// Record a state change from the agent's current state to `new_state`.
    pub async fn update_state(
        &self,
        identity: &ContentHash,
        new_state: &str,
        reason: &str,
    ) -> Result<LedgerEntry> {
        let from = self.current_state(identity).await?;
        let change = StateChange::new(from, new_state).with_reason(reason, Timestamp::now());
        self.append_event(identity, Event::StateChange(change)).await
    }

    /// The `to` state of the agent's latest state change, or `UNKNOWN`.
    pub async fn current_state(&self, identity: &ContentHash) -> Result<String> {
        Ok(self.load_ledger(identity).await?.current_state().to_string())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Verification
    // ─────────────────────────────────────────────────────────────────────────

    /// Verify an agent's identity and full ledger.
    pub async fn verify_agent(&self, identity: &ContentHash) -> Result<CustodyReport> {
        let record = self.require_identity(identity).await?;
        let entries = self.store.get_ledger(identity).await?;

        let identity_report = verify_identity(&record);
        // The tether is the record's stored root, not a recomputed one.
        let ledger = verify_ledger(&entries, &record.merkle_root);

        let report = CustodyReport {
            tethered: ledger.tethered(),
            entry_count: entries.len(),
            identity: identity_report,
            ledger,
        };

        if report.is_valid() {
            debug!(record_id = %record.id, entries = report.entry_count, "agent verified");
        } else {
            warn!(record_id = %record.id, "agent failed verification");
        }
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Summaries of every stored agent, in creation order.
    pub async fn list_agents(&self) -> Result<Vec<AgentSummary>> {
        let mut summaries = Vec::new();
        for record in self.store.list_identities().await? {
            summaries.push(self.summarize(record).await?);
        }
        Ok(summaries)
    }

    /// Summary of one agent.
    pub async fn agent_summary(&self, identity: &ContentHash) -> Result<AgentSummary> {
        let record = self.require_identity(identity).await?;
        self.summarize(record).await
    }

    /// The agent's identity followed by its ancestors, back to the root.
    pub async fn lineage(&self, identity: &ContentHash) -> Result<Vec<IdentityRecord>> {
        let mut chain = vec![self.require_identity(identity).await?];
        while let Some(parent) = chain
            .last()
            .and_then(|r| r.parent.as_ref())
            .and_then(HashRef::digest)
        {
            if chain.iter().any(|r| r.merkle_root == parent) {
                break;
            }
            match self.store.get_identity(&parent).await? {
                Some(record) => chain.push(record),
                None => break,
            }
        }
        Ok(chain)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Quorum Recovery
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a petition with the configured threshold.
    pub fn new_petition(
        &self,
        target_agent_id: &str,
        new_custodian_key: &str,
    ) -> Result<QuorumPetition<OpaqueSignatures>> {
        Ok(QuorumPetition::new(
            target_agent_id,
            new_custodian_key,
            self.config.default_quorum_threshold,
        )?)
    }

    /// Execute a ratified petition against `old_identity`.
    ///
    /// Stores the successor identity with its genesis entry, then appends the
    /// revocation as the terminal entry of the old ledger. If a previous call
    /// stored the successor but failed to revoke, the stored successor is
    /// reused, so retrying completes the same recovery.
    pub async fn execute_recovery<C: SignatureCheck>(
        &self,
        petition: &QuorumPetition<C>,
        old_identity: &ContentHash,
    ) -> Result<Recovery> {
        let ledger = self.load_ledger(old_identity).await?;
        let artifacts = petition.execute_override(old_identity)?;

        if let Some(tail) = ledger.entries().last() {
            if self.config.verify_before_append {
                self.check_tail(old_identity, tail)?;
            }
        }
        if ledger.is_revoked() {
            return Err(CustodyError::Revoked(*old_identity));
        }

        let (successor, successor_genesis) =
            match self.pending_successor(old_identity, &artifacts.successor).await? {
                Some(pending) => pending,
                None => self.store_successor(old_identity, &artifacts.successor).await?,
            };

        let revocation = self
            .append_event(old_identity, artifacts.revocation.into_event())
            .await?;

        info!(
            revoked = %old_identity,
            successor = %successor.id,
            signatures = petition.signatures().len(),
            "custody transferred by quorum"
        );
        Ok(Recovery {
            revocation,
            successor,
            successor_genesis,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rendering
    // ─────────────────────────────────────────────────────────────────────────

    /// Render the agent's current visual identity through `cache`.
    ///
    /// Returns `None` when no renderer was injected.
    pub async fn render(
        &self,
        identity: &ContentHash,
        cache: &mut RenderCache,
    ) -> Result<Option<Arc<str>>> {
        let Some(renderer) = &self.renderer else {
            return Ok(None);
        };

        let record = self.require_identity(identity).await?;
        let state = self.current_state(identity).await?;
        let subject = RenderSubject {
            merkle_root: record.merkle_root,
            state,
            custodian_id: record.custodian_id,
            agent_name: record.agent_name,
        };

        cache
            .get_or_render(renderer.as_ref(), &subject)
            .map(Some)
            .map_err(CustodyError::Rendering)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    /// A successor of `parent` matching `seed` left by an earlier attempt.
    async fn pending_successor(
        &self,
        parent: &ContentHash,
        seed: &SuccessorSeed,
    ) -> Result<Option<(IdentityRecord, LedgerEntry)>> {
        let found = self.store.get_successors(parent).await?.into_iter().find(|r| {
            r.custodian_id == seed.custodian_pubkey
                && r.agent_name == seed.agent_id
                && r.creation_reason == seed.lineage.as_str()
        });
        let Some(successor) = found else {
            return Ok(None);
        };

        let genesis = match self.store.get_ledger(&successor.merkle_root).await?.into_iter().next() {
            Some(genesis) => genesis,
            None => {
                let event = self.successor_genesis_event(seed);
                self.commit(&successor.merkle_root, event, None).await?
            }
        };
        debug!(successor = %successor.id, "resuming recovery with stored successor");
        Ok(Some((successor, genesis)))
    }

    /// Mint the successor and store it with its genesis entry in one insert.
    async fn store_successor(
        &self,
        parent: &ContentHash,
        seed: &SuccessorSeed,
    ) -> Result<(IdentityRecord, LedgerEntry)> {
        let successor = IdentityBuilder::successor(seed, *parent)
            .version(self.config.schema_version.clone())
            .build()?;
        let genesis = EntryBuilder::new(successor.merkle_root, self.successor_genesis_event(seed))
            .version(self.config.schema_version.clone())
            .build()?;

        match self
            .store
            .insert_agent(&successor, std::slice::from_ref(&genesis))
            .await?
        {
            InsertResult::Inserted => Ok((successor, genesis)),
            InsertResult::AlreadyExists => Err(CustodyError::AlreadyExists(successor.merkle_root)),
        }
    }

    fn successor_genesis_event(&self, seed: &SuccessorSeed) -> Event {
        Event::Instantiation(Instantiation {
            status: CREATED_STATUS.to_string(),
            resources: self.config.initial_resources.clone(),
            purpose: Some(seed.lineage.as_str().to_string()),
        })
    }

    async fn require_identity(&self, identity: &ContentHash) -> Result<IdentityRecord> {
        self.store
            .get_identity(identity)
            .await?
            .ok_or(CustodyError::AgentNotFound(*identity))
    }

    async fn load_ledger(&self, identity: &ContentHash) -> Result<Ledger> {
        self.require_identity(identity).await?;
        let entries = self.store.get_ledger(identity).await?;
        Ok(Ledger::from_entries(*identity, entries))
    }

    async fn summarize(&self, record: IdentityRecord) -> Result<AgentSummary> {
        let ledger = Ledger::from_entries(
            record.merkle_root,
            self.store.get_ledger(&record.merkle_root).await?,
        );

        Ok(AgentSummary {
            state: ledger.current_state().to_string(),
            entry_count: ledger.len(),
            last_activity: ledger.entries().last().map(|e| e.timestamp.clone()),
            revoked: ledger.is_revoked(),
            record_id: record.id,
            merkle_root: record.merkle_root,
            agent_name: record.agent_name,
            custodian_id: record.custodian_id,
            parent: record.parent,
        })
    }

    fn check_tail(&self, identity: &ContentHash, tail: &LedgerEntry) -> Result<()> {
        let mut failures: Vec<IntegrityFailure> = Vec::new();
        if tail.owner != *identity {
            failures.push(IntegrityFailure::TetherBroken {
                expected: *identity,
                found: tail.owner.clone(),
            });
        }
        failures.extend(verify_entry(tail).failures);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(CustodyError::Integrity {
                identity: *identity,
                failures,
            })
        }
    }

    /// Build an entry on `previous` and compare-and-append it.
    async fn commit(
        &self,
        identity: &ContentHash,
        event: Event,
        previous: Option<HashRef>,
    ) -> Result<LedgerEntry> {
        let entry = EntryBuilder::new(*identity, event)
            .previous(previous)
            .version(self.config.schema_version.clone())
            .build()?;

        match self.store.append_entry(&entry).await? {
            AppendResult::Appended { seq } => {
                debug!(
                    identity = %identity,
                    seq,
                    entry_id = %entry.entry_id,
                    event_type = entry.event.event_type(),
                    "entry appended"
                );
                Ok(entry)
            }
            AppendResult::StaleTail { current } => Err(CustodyError::StaleTail {
                identity: *identity,
                expected: entry.previous_hash.clone(),
                current,
            }),
            AppendResult::UnknownIdentity => Err(CustodyError::AgentNotFound(*identity)),
        }
    }
}
