//! Integrity verification for identities and ledgers.
//!
//! Verification never fails fast and never returns `Err`: every check runs
//! and every finding is reported. Stored hashes are only ever compared
//! against; recomputation uses hash-relevant fields alone.

use serde::Serialize;
use tracing::{debug, warn};

use crate::canonical::{content_hash_with, EncodingRule};
use crate::crypto::{ContentHash, HashRef};
use crate::entry::{chain_value, LedgerEntry};
use crate::error::IntegrityFailure;
use crate::identity::IdentityRecord;
use crate::types::{EntryId, RecordId, SchemaVersion};

/// Findings for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryReport {
    pub entry_id: EntryId,
    pub failures: Vec<IntegrityFailure>,
}

impl EntryReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Findings for a whole ledger, one report per entry in ledger order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub identity: ContentHash,
    pub entries: Vec<EntryReport>,
}

impl LedgerReport {
    pub fn is_valid(&self) -> bool {
        self.entries.iter().all(EntryReport::is_valid)
    }

    /// Every finding with the index of the entry it belongs to.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &IntegrityFailure)> {
        self.entries
            .iter()
            .enumerate()
            .flat_map(|(i, report)| report.failures.iter().map(move |f| (i, f)))
    }

    /// Indices of entries with at least one finding.
    pub fn failing_indices(&self) -> Vec<usize> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, report)| !report.is_valid())
            .map(|(i, _)| i)
            .collect()
    }

    /// Whether every entry is owned by the identity.
    pub fn tethered(&self) -> bool {
        !self
            .failures()
            .any(|(_, f)| matches!(f, IntegrityFailure::TetherBroken { .. }))
    }
}

/// Findings for an identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityReport {
    pub record_id: RecordId,
    pub failures: Vec<IntegrityFailure>,
}

impl IdentityReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Rule for `version`, or the current rule after reporting the version.
fn rule_for(version: &SchemaVersion, failures: &mut Vec<IntegrityFailure>) -> EncodingRule {
    match version.encoding_rule() {
        Some(rule) => rule,
        None => {
            failures.push(IntegrityFailure::UnsupportedVersion(version.as_str().to_string()));
            SchemaVersion::CURRENT
                .encoding_rule()
                .unwrap_or(EncodingRule::Compact)
        }
    }
}

fn malformed(field: &str, hash: &HashRef) -> Option<IntegrityFailure> {
    match hash {
        HashRef::Malformed(value) => Some(IntegrityFailure::MalformedHash {
            field: field.to_string(),
            value: value.clone(),
        }),
        HashRef::Digest(_) => None,
    }
}

/// Recompute an entry's content hash and chain accumulator.
pub fn verify_entry(entry: &LedgerEntry) -> EntryReport {
    let mut failures = Vec::new();
    let rule = rule_for(&entry.version, &mut failures);
    failures.extend(entry.hash_refs().filter_map(|(field, hash)| malformed(field, hash)));

    let recomputed = entry
        .content_value()
        .and_then(|content| content_hash_with(&content, rule));

    match recomputed {
        Ok(recomputed) => {
            if entry.entry_hash != recomputed {
                failures.push(IntegrityFailure::ContentTampered {
                    stored: entry.entry_hash.clone(),
                    recomputed,
                });
            }

            let expected_chain = chain_value(entry.previous_hash.as_ref(), &recomputed);
            if entry.hash_chain != expected_chain {
                failures.push(if entry.previous_hash.is_some() {
                    IntegrityFailure::ChainBroken {
                        stored: entry.hash_chain.clone(),
                        recomputed: expected_chain,
                    }
                } else {
                    IntegrityFailure::GenesisBroken {
                        stored: entry.hash_chain.clone(),
                        recomputed: expected_chain,
                    }
                });
            }
        }
        Err(e) => failures.push(IntegrityFailure::Unencodable(e.to_string())),
    }

    EntryReport {
        entry_id: entry.entry_id.clone(),
        failures,
    }
}

/// Verify every entry, its tether to `identity`, and its link to the entry
/// before it.
pub fn verify_ledger(entries: &[LedgerEntry], identity: &ContentHash) -> LedgerReport {
    let mut reports = Vec::with_capacity(entries.len());

    for (index, entry) in entries.iter().enumerate() {
        let mut failures = Vec::new();
        if entry.owner != *identity {
            failures.push(IntegrityFailure::TetherBroken {
                expected: *identity,
                found: entry.owner.clone(),
            });
        }

        failures.extend(verify_entry(entry).failures);

        if index > 0 {
            let expected = &entries[index - 1].entry_hash;
            if entry.previous_hash.as_ref() != Some(expected) {
                failures.push(IntegrityFailure::LinkageBroken {
                    expected: expected.clone(),
                    found: entry.previous_hash.clone(),
                });
            }
        }

        let report = EntryReport {
            entry_id: entry.entry_id.clone(),
            failures,
        };

        for failure in &report.failures {
            warn!(
                index,
                entry_id = %report.entry_id,
                kind = failure.kind(),
                "ledger integrity failure: {}",
                failure
            );
        }
        reports.push(report);
    }

    let report = LedgerReport {
        identity: *identity,
        entries: reports,
    };
    debug!(
        identity = %identity,
        entries = report.entries.len(),
        valid = report.is_valid(),
        "ledger verified"
    );
    report
}

/// Recompute an identity's merkle root and derived identifier.
pub fn verify_identity(record: &IdentityRecord) -> IdentityReport {
    let mut failures = Vec::new();
    let rule = rule_for(&record.version, &mut failures);
    if let Some(parent) = &record.parent {
        failures.extend(malformed("parent_dbc", parent));
    }

    match content_hash_with(&record.content_value(), rule) {
        Ok(recomputed) if recomputed != record.merkle_root => {
            failures.push(IntegrityFailure::ContentTampered {
                stored: record.merkle_root.into(),
                recomputed,
            });
        }
        Ok(_) => {}
        Err(e) => failures.push(IntegrityFailure::Unencodable(e.to_string())),
    }

    let derived = RecordId::derive(&record.merkle_root);
    if derived != record.id {
        failures.push(IntegrityFailure::IdentifierMismatch {
            stored: record.id.to_string(),
            derived: derived.to_string(),
        });
    }

    for failure in &failures {
        warn!(record_id = %record.id, kind = failure.kind(), "identity integrity failure: {}", failure);
    }

    IdentityReport {
        record_id: record.id.clone(),
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{append_entry, EntryBuilder};
    use crate::event::{CapabilityGrant, Event, StateChange};
    use crate::identity::IdentityBuilder;
    use crate::types::Timestamp;
    use serde_json::json;

    fn identity() -> IdentityRecord {
        IdentityBuilder::new("c1", "A")
            .timestamp(Timestamp::from_text("2025-12-29T12:00:00.000000Z"))
            .build()
            .unwrap()
    }

    fn ledger(owner: &ContentHash, n: usize) -> Vec<LedgerEntry> {
        let mut entries: Vec<LedgerEntry> = Vec::new();
        for i in 0..n {
            let event = Event::CapabilityGrant(CapabilityGrant {
                capability: format!("cap_{}", i),
                level: "read_only".into(),
            });
            let prev = entries.last().map(|e| e.entry_hash.clone());
            entries.push(append_entry(owner, event, prev).unwrap());
        }
        entries
    }

    #[test]
    fn test_fresh_ledger_is_valid() {
        let id = identity();
        let entries = ledger(&id.merkle_root, 5);
        let report = verify_ledger(&entries, &id.merkle_root);
        assert!(report.is_valid());
        assert!(report.tethered());
        assert_eq!(report.entries.len(), 5);
    }

    #[test]
    fn test_empty_ledger_is_valid() {
        let id = identity();
        assert!(verify_ledger(&[], &id.merkle_root).is_valid());
    }

    #[test]
    fn test_tampered_details_detected() {
        let id = identity();
        let mut entries = ledger(&id.merkle_root, 3);
        entries[1].event = Event::CapabilityGrant(CapabilityGrant {
            capability: "cap_1".into(),
            level: "read_write".into(),
        });

        let report = verify_ledger(&entries, &id.merkle_root);
        assert_eq!(report.failing_indices(), vec![1]);
        assert!(matches!(
            report.entries[1].failures[..],
            [IntegrityFailure::ContentTampered { .. }, IntegrityFailure::ChainBroken { .. }]
        ));
    }

    #[test]
    fn test_broken_link_flags_only_that_entry() {
        let id = identity();
        let mut entries = ledger(&id.merkle_root, 4);
        entries[2].previous_hash = Some(ContentHash::digest(b"elsewhere").into());

        let report = verify_ledger(&entries, &id.merkle_root);
        assert_eq!(report.failing_indices(), vec![2]);
        assert!(report.entries[2]
            .failures
            .iter()
            .any(|f| matches!(f, IntegrityFailure::LinkageBroken { .. })));
    }

    #[test]
    fn test_foreign_entry_breaks_tether() {
        let id = identity();
        let mut entries = ledger(&id.merkle_root, 2);
        let other = ContentHash::digest(b"other identity");
        let foreign = append_entry(
            &other,
            Event::StateChange(StateChange::new("ACTIVE", "PAUSED")),
            Some(entries[1].entry_hash.clone()),
        )
        .unwrap();
        entries.push(foreign);

        let report = verify_ledger(&entries, &id.merkle_root);
        assert!(!report.tethered());
        assert_eq!(report.failing_indices(), vec![2]);
    }

    #[test]
    fn test_genesis_accumulator_checked() {
        let id = identity();
        let mut entries = ledger(&id.merkle_root, 1);
        entries[0].hash_chain = ContentHash::digest(b"x").into();

        let report = verify_entry(&entries[0]);
        assert!(matches!(report.failures[..], [IntegrityFailure::GenesisBroken { .. }]));
    }

    #[test]
    fn test_derived_fields_do_not_affect_content() {
        let id = identity();
        let mut entries = ledger(&id.merkle_root, 1);
        entries[0].entry_id = EntryId::from("ENTRY-0000000000000000".to_string());
        assert!(verify_entry(&entries[0]).is_valid());
    }

    #[test]
    fn test_unknown_version_reported() {
        let id = identity();
        let entry = EntryBuilder::new(id.merkle_root, Event::custom("NOTE", Default::default()))
            .build()
            .unwrap();
        let mut altered = entry.clone();
        altered.version = SchemaVersion::parse("v9.0");

        let report = verify_entry(&altered);
        assert_eq!(
            report.failures[0],
            IntegrityFailure::UnsupportedVersion("v9.0".into())
        );
        // The version is hashed, so the content no longer matches either.
        assert!(report
            .failures
            .iter()
            .any(|f| matches!(f, IntegrityFailure::ContentTampered { .. })));
    }

    #[test]
    fn test_float_details_unencodable() {
        let id = identity();
        let mut entry = ledger(&id.merkle_root, 1).remove(0);
        let details = json!({"ratio": 0.5}).as_object().cloned().unwrap();
        entry.event = Event::custom("MEASUREMENT", details);

        let report = verify_entry(&entry);
        assert!(matches!(report.failures[..], [IntegrityFailure::Unencodable(_)]));
    }

    #[test]
    fn test_identity_checks() {
        let mut record = identity();
        assert!(verify_identity(&record).is_valid());

        record.agent_name = "B".into();
        let report = verify_identity(&record);
        assert!(matches!(report.failures[..], [IntegrityFailure::ContentTampered { .. }]));

        let mut record = identity();
        record.id = RecordId::from("DBC-ffffffffffffffff".to_string());
        let report = verify_identity(&record);
        assert!(matches!(report.failures[..], [IntegrityFailure::IdentifierMismatch { .. }]));
    }

    #[test]
    fn test_case_flipped_references_detected() {
        let id = identity();
        let entries = ledger(&id.merkle_root, 3);

        let mut flipped = entries.clone();
        flipped[1].owner = HashRef::parse(&id.merkle_root.to_hex().to_uppercase());
        let report = verify_ledger(&flipped, &id.merkle_root);
        assert_eq!(report.failing_indices(), vec![1]);
        assert!(!report.tethered());
        assert!(report.entries[1]
            .failures
            .iter()
            .any(|f| matches!(f, IntegrityFailure::ContentTampered { .. })));

        let mut flipped = entries;
        let prev = flipped[1].previous_hash.as_ref().unwrap().to_text();
        flipped[1].previous_hash = Some(HashRef::parse(&prev.to_uppercase()));
        let report = verify_ledger(&flipped, &id.merkle_root);
        assert_eq!(report.failing_indices(), vec![1]);
        let kinds: Vec<_> = report.entries[1].failures.iter().map(|f| f.kind()).collect();
        assert_eq!(kinds, ["malformed-hash", "chain-broken", "linkage-broken"]);
    }

    #[test]
    fn test_unparseable_reference_is_a_finding() {
        let id = identity();
        let mut entries = ledger(&id.merkle_root, 3);
        entries[2].previous_hash = Some(HashRef::parse("tampered"));

        let report = verify_ledger(&entries, &id.merkle_root);
        assert_eq!(report.failing_indices(), vec![2]);
        assert_eq!(
            report.entries[2].failures[0],
            IntegrityFailure::MalformedHash {
                field: "previous_hash".into(),
                value: "tampered".into(),
            }
        );
    }

    #[test]
    fn test_malformed_parent_reported() {
        let mut record = IdentityBuilder::new("c1", "B")
            .parent(identity().merkle_root)
            .build()
            .unwrap();
        record.parent = Some(HashRef::parse("not-a-hash"));

        let kinds: Vec<_> = verify_identity(&record).failures.iter().map(|f| f.kind()).collect();
        assert_eq!(kinds, ["malformed-hash", "content-tampered"]);
    }
}
