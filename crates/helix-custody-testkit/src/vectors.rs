//! Golden test vectors for deterministic verification.
//!
//! Each vector is an identity plus a four-entry ledger written by the
//! reference producer of that schema generation. Stored documents must
//! verify unchanged, and rebuilding the same scenario through the builders
//! must reproduce every hash exactly.

use helix_custody_core::{
    ledger_from_json, verify_identity, verify_ledger, CapabilityInit, CoreError, EntryBuilder,
    Event, IdentityBuilder, IdentityRecord, Instantiation, LedgerEntry, SchemaVersion,
    StateChange, Timestamp,
};

/// A golden test vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// Schema version tag the documents carry.
    pub version: &'static str,
    /// Stored identity document.
    pub identity_json: &'static str,
    /// Stored ledger document.
    pub ledger_json: &'static str,
    /// Expected merkle root (hex).
    pub expected_merkle_root: &'static str,
    /// Expected record id.
    pub expected_record_id: &'static str,
    /// Expected entry hashes in ledger order (hex).
    pub expected_entry_hashes: [&'static str; 4],
    /// Expected chain value of the tail entry (hex).
    pub expected_tail_chain: &'static str,
}

impl GoldenVector {
    pub fn identity(&self) -> Result<IdentityRecord, CoreError> {
        IdentityRecord::from_json(self.identity_json)
    }

    pub fn ledger(&self) -> Result<Vec<LedgerEntry>, CoreError> {
        ledger_from_json(self.ledger_json)
    }

    pub fn schema_version(&self) -> SchemaVersion {
        SchemaVersion::parse(self.version)
    }
}

pub const CUSTODIAN_ID: &str = "c1";
pub const AGENT_NAME: &str = "A";
pub const CREATED_AT: &str = "2025-12-29T12:00:00.000000Z";

/// Entry timestamps in ledger order.
pub const ENTRY_TIMES: [&str; 4] = [
    "2025-12-29T12:00:01.000000Z",
    "2025-12-29T12:00:02.000000Z",
    "2025-12-29T12:00:03.000000Z",
    "2025-12-29T12:05:00.000000Z",
];

/// Exercises escaping: BMP symbols, Latin-1, and an astral code point.
pub const RESTRICTION_REASON: &str = "policy review \u{2713} caf\u{e9} \u{1F512}";

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "legacy spaced encoding",
            version: "v0.3",
            identity_json: include_str!("../vectors/legacy_v0_3.identity.json"),
            ledger_json: include_str!("../vectors/legacy_v0_3.ledger.json"),
            expected_merkle_root:
                "cba9c9bc41a7c1ef9c49b34bb43002325ed536f477a9681068f9cdfdeae53bba",
            expected_record_id: "DBC-cba9c9bc41a7c1ef",
            expected_entry_hashes: [
                "21f3508fc4c1337efdcc164191b5ba3e4ab95782a0f5c264ea5a75707c74f5a2",
                "d5614124892b5e94dc80d9a5f605c1ddea98ff8db2b24848320ee4c6c43997ff",
                "94ebfdaddf8a43798deb4240fc83187d3c875d2ae04ce5d9d64c43b495b22581",
                "d752cdda4d0b901b76bd80ab6374766ea2235b4cd8382a60c51594565a55cc30",
            ],
            expected_tail_chain:
                "2368236dd0d956d13483b407ab21dcf179bad2bb67427e708faf682e5f3ad939",
        },
        GoldenVector {
            name: "current compact encoding",
            version: "v0.4",
            identity_json: include_str!("../vectors/current_v0_4.identity.json"),
            ledger_json: include_str!("../vectors/current_v0_4.ledger.json"),
            expected_merkle_root:
                "9df661f24e49c743ddc543bc58b0cd0dad74df360097f8b9101d59c9ddab3e76",
            expected_record_id: "DBC-9df661f24e49c743",
            expected_entry_hashes: [
                "69dc9b9f0055862bc0f0a3dcc0fc3da54eb057db71b24339db07d442a1e98307",
                "211c7ab495643919f36a4e34625b2523063016b640cd35c611cb70737df46010",
                "19a8dfc7e555624bef8c71ad64703e2fd2e4634746b1ef954907ee0398e3a8eb",
                "b1d279b270ac2c5ad40c2a7abd75096c89aba37e153388c6d06fdaa167eda15e",
            ],
            expected_tail_chain:
                "73836aa06a4279017255e547cf33dbfce4ebd0c999150901027e125e9e730ce1",
        },
    ]
}

/// The four events every vector records, in order.
pub fn vector_events() -> Vec<Event> {
    vec![
        Event::Instantiation(Instantiation {
            status: "created".into(),
            resources: vec!["compute".into(), "memory".into(), "network".into()],
            purpose: Some("autonomous_agent".into()),
        }),
        Event::CapabilityInit(CapabilityInit {
            capabilities: vec!["reasoning".into(), "tool_use".into(), "communication".into()],
            restrictions: vec![
                "no_physical_actions".into(),
                "no_financial_transfers".into(),
            ],
        }),
        Event::StateChange(StateChange::new("CREATED", "ACTIVE")),
        Event::StateChange(
            StateChange::new("ACTIVE", "RESTRICTED")
                .with_reason(RESTRICTION_REASON, Timestamp::from_text(ENTRY_TIMES[3])),
        ),
    ]
}

/// Rebuild a vector's identity and ledger from scratch through the builders.
pub fn rebuild_from_vector(
    vector: &GoldenVector,
) -> Result<(IdentityRecord, Vec<LedgerEntry>), CoreError> {
    let version = vector.schema_version();
    let identity = IdentityBuilder::new(CUSTODIAN_ID, AGENT_NAME)
        .version(version.clone())
        .timestamp(Timestamp::from_text(CREATED_AT))
        .build()?;

    let mut entries: Vec<LedgerEntry> = Vec::new();
    for (event, at) in vector_events().into_iter().zip(ENTRY_TIMES) {
        let previous = entries.last().map(|e| e.entry_hash.clone());
        let entry = EntryBuilder::new(identity.merkle_root, event)
            .previous(previous)
            .version(version.clone())
            .timestamp(Timestamp::from_text(at))
            .build()?;
        entries.push(entry);
    }

    Ok((identity, entries))
}

/// Check every vector: stored documents verify and rebuilt hashes match.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in all_vectors() {
        check_vector(&vector).map_err(|e| format!("{}: {}", vector.name, e))?;
    }
    Ok(())
}

fn check_vector(vector: &GoldenVector) -> Result<(), String> {
    let identity = vector.identity().map_err(|e| e.to_string())?;
    let ledger = vector.ledger().map_err(|e| e.to_string())?;

    if !verify_identity(&identity).is_valid() {
        return Err("stored identity does not verify".into());
    }
    let report = verify_ledger(&ledger, &identity.merkle_root);
    if !report.is_valid() {
        return Err(format!(
            "stored ledger does not verify at {:?}",
            report.failing_indices()
        ));
    }

    let (rebuilt, rebuilt_entries) = rebuild_from_vector(vector).map_err(|e| e.to_string())?;
    if rebuilt.merkle_root.to_hex() != vector.expected_merkle_root {
        return Err(format!(
            "merkle root mismatch: expected {}, got {}",
            vector.expected_merkle_root, rebuilt.merkle_root
        ));
    }
    if rebuilt.id.as_str() != vector.expected_record_id {
        return Err(format!("record id mismatch: got {}", rebuilt.id));
    }
    for (i, (entry, expected)) in rebuilt_entries
        .iter()
        .zip(vector.expected_entry_hashes)
        .enumerate()
    {
        if entry.entry_hash.to_text() != expected {
            return Err(format!(
                "entry {} hash mismatch: expected {}, got {}",
                i, expected, entry.entry_hash
            ));
        }
    }
    let tail = rebuilt_entries
        .last()
        .ok_or_else(|| "rebuilt ledger is empty".to_string())?;
    if tail.hash_chain.to_text() != vector.expected_tail_chain {
        return Err(format!("tail chain mismatch: got {}", tail.hash_chain));
    }

    Ok(())
}
