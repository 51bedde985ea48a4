//! Identity records: the immutable root document of an agent.
//!
//! The `merkle_root` is a single SHA-256 digest over the canonical encoding of
//! every other field except `dbc_id`. It is not a tree; the name is kept
//! because it is part of the wire format.
//!
//! `merkle_root` must be canonical lowercase hex or the record does not load.
//! `parent_dbc` is a reference to another record and keeps its stored text.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::canonical::content_hash;
use crate::crypto::{ContentHash, HashRef};
use crate::error::{CoreError, Result};
use crate::quorum::SuccessorSeed;
use crate::types::{RecordId, SchemaVersion, Timestamp};

/// Record type tag of an identity record.
pub const RECORD_TYPE: &str = "DBC";

/// Creation reason of a root identity.
pub const ROOT_CREATION_REASON: &str = "Agent instantiation";

/// Placeholder hardware attestation.
pub const SIMULATED_ATTESTATION: &str = "TPM2.0_SIMULATED";

/// An agent identity record. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub version: SchemaVersion,
    #[serde(rename = "type")]
    pub record_type: String,
    pub agent_name: String,
    pub custodian_id: String,
    pub timestamp: Timestamp,
    pub creation_reason: String,
    #[serde(rename = "hardware_sig")]
    pub hardware_attestation: String,
    #[serde(rename = "parent_dbc", default)]
    pub parent: Option<HashRef>,
    pub merkle_root: ContentHash,
    #[serde(rename = "dbc_id")]
    pub id: RecordId,
}

impl IdentityRecord {
    /// The hashed content: every field except `merkle_root` and `dbc_id`.
    pub fn content_value(&self) -> Value {
        json!({
            "version": self.version.as_str(),
            "type": self.record_type,
            "agent_name": self.agent_name,
            "custodian_id": self.custodian_id,
            "timestamp": self.timestamp.as_str(),
            "creation_reason": self.creation_reason,
            "hardware_sig": self.hardware_attestation,
            "parent_dbc": self.parent.as_ref().map(HashRef::to_text),
        })
    }

    /// Recompute the content hash under the record's own schema version.
    pub fn compute_merkle_root(&self) -> Result<ContentHash> {
        content_hash(&self.content_value(), &self.version)
    }

    /// Whether this record was minted as a successor of another.
    pub fn is_successor(&self) -> bool {
        self.parent.is_some()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Builder for identity records.
#[derive(Debug, Clone)]
pub struct IdentityBuilder {
    custodian_id: String,
    agent_name: String,
    version: SchemaVersion,
    timestamp: Option<Timestamp>,
    creation_reason: String,
    parent: Option<ContentHash>,
}

impl IdentityBuilder {
    /// Start a root identity for `agent_name` held by `custodian_id`.
    pub fn new(custodian_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            custodian_id: custodian_id.into(),
            agent_name: agent_name.into(),
            version: SchemaVersion::CURRENT,
            timestamp: None,
            creation_reason: ROOT_CREATION_REASON.to_string(),
            parent: None,
        }
    }

    /// Start the successor described by a ratified petition's seed.
    pub fn successor(seed: &SuccessorSeed, parent: ContentHash) -> Self {
        Self::new(seed.custodian_pubkey.clone(), seed.agent_id.clone())
            .creation_reason(seed.lineage.as_str())
            .parent(parent)
    }

    pub fn version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    /// Fix the creation timestamp instead of reading the clock.
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn creation_reason(mut self, reason: impl Into<String>) -> Self {
        self.creation_reason = reason.into();
        self
    }

    pub fn parent(mut self, parent: ContentHash) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Validate, hash and derive the identifier.
    pub fn build(self) -> Result<IdentityRecord> {
        if self.custodian_id.trim().is_empty() {
            return Err(CoreError::Validation("custodian id is empty".into()));
        }
        if self.agent_name.trim().is_empty() {
            return Err(CoreError::Validation("agent name is empty".into()));
        }

        let mut record = IdentityRecord {
            version: self.version,
            record_type: RECORD_TYPE.to_string(),
            agent_name: self.agent_name,
            custodian_id: self.custodian_id,
            timestamp: self.timestamp.unwrap_or_else(Timestamp::now),
            creation_reason: self.creation_reason,
            hardware_attestation: SIMULATED_ATTESTATION.to_string(),
            parent: self.parent.map(HashRef::from),
            merkle_root: ContentHash::from_bytes([0; 32]),
            id: RecordId::from(String::new()),
        };

        record.merkle_root = record.compute_merkle_root()?;
        record.id = RecordId::derive(&record.merkle_root);
        Ok(record)
    }
}

/// Create a root identity stamped with the current time.
pub fn create_identity(
    custodian_id: impl Into<String>,
    agent_name: impl Into<String>,
) -> Result<IdentityRecord> {
    IdentityBuilder::new(custodian_id, agent_name).build()
}

/// Mint the successor identity described by `seed`, linked to `parent`.
pub fn mint_successor(seed: &SuccessorSeed, parent: &ContentHash) -> Result<IdentityRecord> {
    IdentityBuilder::successor(seed, *parent).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quorum::Lineage;

    fn fixed(version: SchemaVersion) -> IdentityRecord {
        IdentityBuilder::new("c1", "A")
            .version(version)
            .timestamp(Timestamp::from_text("2025-12-29T12:00:00.000000Z"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_legacy_record_hash() {
        let record = fixed(SchemaVersion::V0_3);
        assert_eq!(
            record.merkle_root.to_hex(),
            "cba9c9bc41a7c1ef9c49b34bb43002325ed536f477a9681068f9cdfdeae53bba"
        );
        assert_eq!(record.id.as_str(), "DBC-cba9c9bc41a7c1ef");
    }

    #[test]
    fn test_current_record_hash() {
        let record = fixed(SchemaVersion::V0_4);
        assert_eq!(
            record.merkle_root.to_hex(),
            "9df661f24e49c743ddc543bc58b0cd0dad74df360097f8b9101d59c9ddab3e76"
        );
        assert_eq!(record.id.as_str(), "DBC-9df661f24e49c743");
    }

    #[test]
    fn test_create_identity_defaults() {
        let record = create_identity("custodian_alice_001", "Alpha-Agent-01").unwrap();
        assert_eq!(record.version, SchemaVersion::V0_4);
        assert_eq!(record.record_type, "DBC");
        assert_eq!(record.creation_reason, "Agent instantiation");
        assert_eq!(record.hardware_attestation, "TPM2.0_SIMULATED");
        assert!(record.parent.is_none());
        assert_eq!(record.compute_merkle_root().unwrap(), record.merkle_root);
        assert!(record.id.as_str().starts_with("DBC-"));
        assert_eq!(record.id.as_str().len(), 4 + 16);
    }

    #[test]
    fn test_blank_inputs_rejected() {
        assert!(matches!(create_identity("  ", "A"), Err(CoreError::Validation(_))));
        assert!(matches!(create_identity("c1", "\t"), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_wire_field_names() {
        let value = serde_json::to_value(fixed(SchemaVersion::V0_4)).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            [
                "agent_name",
                "creation_reason",
                "custodian_id",
                "dbc_id",
                "hardware_sig",
                "merkle_root",
                "parent_dbc",
                "timestamp",
                "type",
                "version"
            ]
        );
        assert!(obj["parent_dbc"].is_null());
    }

    #[test]
    fn test_json_roundtrip_keeps_hash() {
        let record = fixed(SchemaVersion::V0_3);
        let back = IdentityRecord::from_json(&record.to_json().unwrap()).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.compute_merkle_root().unwrap(), record.merkle_root);
    }

    #[test]
    fn test_mint_successor() {
        let root = fixed(SchemaVersion::V0_4);
        let seed = SuccessorSeed {
            agent_id: "A".into(),
            custodian_pubkey: "new-key".into(),
            lineage: Lineage::RecoveredViaQuorum,
        };
        let successor = mint_successor(&seed, &root.merkle_root).unwrap();

        assert_eq!(successor.parent, Some(HashRef::from(root.merkle_root)));
        assert_eq!(successor.custodian_id, "new-key");
        assert_eq!(successor.agent_name, "A");
        assert_eq!(successor.creation_reason, "RECOVERED_VIA_QUORUM");
        assert!(successor.is_successor());
        assert_eq!(successor.compute_merkle_root().unwrap(), successor.merkle_root);
    }

    #[test]
    fn test_parent_reference_hashed_as_stored() {
        let root = fixed(SchemaVersion::V0_4);
        let seed = SuccessorSeed {
            agent_id: "A".into(),
            custodian_pubkey: "new-key".into(),
            lineage: Lineage::RecoveredViaQuorum,
        };
        let successor = mint_successor(&seed, &root.merkle_root).unwrap();

        let mut value = serde_json::to_value(&successor).unwrap();
        value["parent_dbc"] = serde_json::json!(root.merkle_root.to_hex().to_uppercase());
        let flipped: IdentityRecord = serde_json::from_value(value).unwrap();

        assert!(flipped.parent.as_ref().unwrap().is_malformed());
        assert_ne!(flipped.compute_merkle_root().unwrap(), flipped.merkle_root);
    }

    #[test]
    fn test_non_canonical_merkle_root_refused() {
        let record = fixed(SchemaVersion::V0_4);
        let mut value = serde_json::to_value(&record).unwrap();
        value["merkle_root"] = serde_json::json!(record.merkle_root.to_hex().to_uppercase());
        assert!(serde_json::from_value::<IdentityRecord>(value).is_err());
    }
}
