//! Custody ledger entries.
//!
//! Each entry is tethered to an identity by `dbc_root` and chained to its
//! predecessor by `previous_hash`. Three values are derived, never supplied:
//!
//! - `entry_hash`: SHA-256 over the canonical six-field content
//! - `hash_chain`: `entry_hash` for the genesis entry, otherwise
//!   SHA-256 over the hex text of `previous_hash` followed by `entry_hash`
//! - `entry_id`: `ENTRY-` plus 16 hex chars of `entry_hash`
//!
//! Hash references keep the exact text they were read with. Content, chain
//! and linkage are all computed over that text, so a reference rewritten in
//! another case or replaced with junk is a finding, not a load error.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::canonical::content_hash;
use crate::crypto::{ContentHash, HashRef};
use crate::error::{CoreError, Result};
use crate::event::Event;
use crate::types::{EntryId, SchemaVersion, Timestamp};

/// Entry type tag of a ledger entry.
pub const ENTRY_TYPE: &str = "SUITCASE_ENTRY";

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "EntryWire")]
pub struct LedgerEntry {
    pub version: SchemaVersion,
    pub entry_type: String,
    /// Content hash of the owning identity.
    pub owner: HashRef,
    pub timestamp: Timestamp,
    pub event: Event,
    /// `None` for the genesis entry.
    pub previous_hash: Option<HashRef>,
    pub hash_chain: HashRef,
    pub entry_hash: HashRef,
    pub entry_id: EntryId,
}

/// Wire layout. `previous_hash` is omitted on write; absent and `null` both
/// read as no predecessor.
#[derive(Serialize, Deserialize)]
struct EntryWire {
    version: SchemaVersion,
    #[serde(rename = "type")]
    entry_type: String,
    dbc_root: HashRef,
    timestamp: Timestamp,
    event_type: String,
    details: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous_hash: Option<HashRef>,
    hash_chain: HashRef,
    entry_hash: HashRef,
    entry_id: EntryId,
}

impl From<EntryWire> for LedgerEntry {
    fn from(wire: EntryWire) -> Self {
        Self {
            version: wire.version,
            entry_type: wire.entry_type,
            owner: wire.dbc_root,
            timestamp: wire.timestamp,
            event: Event::from_parts(wire.event_type, wire.details),
            previous_hash: wire.previous_hash,
            hash_chain: wire.hash_chain,
            entry_hash: wire.entry_hash,
            entry_id: wire.entry_id,
        }
    }
}

impl Serialize for LedgerEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let details = self.event.details().map_err(serde::ser::Error::custom)?;
        EntryWire {
            version: self.version.clone(),
            entry_type: self.entry_type.clone(),
            dbc_root: self.owner.clone(),
            timestamp: self.timestamp.clone(),
            event_type: self.event.event_type().to_string(),
            details,
            previous_hash: self.previous_hash.clone(),
            hash_chain: self.hash_chain.clone(),
            entry_hash: self.entry_hash.clone(),
            entry_id: self.entry_id.clone(),
        }
        .serialize(serializer)
    }
}

impl LedgerEntry {
    /// The hashed content: version, type, owner, timestamp, event type and details.
    pub fn content_value(&self) -> Result<Value> {
        Ok(json!({
            "version": self.version.as_str(),
            "type": self.entry_type,
            "dbc_root": self.owner.to_text(),
            "timestamp": self.timestamp.as_str(),
            "event_type": self.event.event_type(),
            "details": self.event.details()?,
        }))
    }

    /// Recompute the entry hash under the entry's own schema version.
    pub fn compute_entry_hash(&self) -> Result<ContentHash> {
        content_hash(&self.content_value()?, &self.version)
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_hash.is_none()
    }

    /// Every hash reference with its wire field name.
    pub fn hash_refs(&self) -> impl Iterator<Item = (&'static str, &HashRef)> {
        [
            ("dbc_root", Some(&self.owner)),
            ("previous_hash", self.previous_hash.as_ref()),
            ("hash_chain", Some(&self.hash_chain)),
            ("entry_hash", Some(&self.entry_hash)),
        ]
        .into_iter()
        .filter_map(|(field, hash)| hash.map(|h| (field, h)))
    }

    /// Wire field names of references that are not canonical hex.
    pub fn malformed_fields(&self) -> Vec<&'static str> {
        self.hash_refs()
            .filter(|(_, hash)| hash.is_malformed())
            .map(|(field, _)| field)
            .collect()
    }
}

/// Chain accumulator for an entry with the given predecessor.
pub fn chain_value(previous: Option<&HashRef>, entry_hash: &ContentHash) -> ContentHash {
    match previous {
        Some(prev) => ContentHash::chain_text(&prev.to_text(), entry_hash),
        None => *entry_hash,
    }
}

/// Builder for ledger entries.
#[derive(Debug, Clone)]
pub struct EntryBuilder {
    owner: ContentHash,
    event: Event,
    previous_hash: Option<HashRef>,
    version: SchemaVersion,
    timestamp: Option<Timestamp>,
}

impl EntryBuilder {
    pub fn new(owner: ContentHash, event: Event) -> Self {
        Self {
            owner,
            event,
            previous_hash: None,
            version: SchemaVersion::CURRENT,
            timestamp: None,
        }
    }

    /// Entry hash of the predecessor. Leave unset for a genesis entry.
    pub fn previous(mut self, previous_hash: Option<HashRef>) -> Self {
        self.previous_hash = previous_hash;
        self
    }

    pub fn version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn build(self) -> Result<LedgerEntry> {
        if self.event.event_type().trim().is_empty() {
            return Err(CoreError::Validation("event type is empty".into()));
        }

        let placeholder = HashRef::from(ContentHash::from_bytes([0; 32]));
        let mut entry = LedgerEntry {
            version: self.version,
            entry_type: ENTRY_TYPE.to_string(),
            owner: self.owner.into(),
            timestamp: self.timestamp.unwrap_or_else(Timestamp::now),
            event: self.event,
            previous_hash: self.previous_hash,
            hash_chain: placeholder.clone(),
            entry_hash: placeholder,
            entry_id: EntryId::from(String::new()),
        };

        let entry_hash = entry.compute_entry_hash()?;
        entry.hash_chain = chain_value(entry.previous_hash.as_ref(), &entry_hash).into();
        entry.entry_hash = entry_hash.into();
        entry.entry_id = EntryId::derive(&entry_hash);
        Ok(entry)
    }
}

/// Build an entry for `owner`, stamped with the current time.
pub fn append_entry(
    owner: &ContentHash,
    event: Event,
    previous_hash: Option<HashRef>,
) -> Result<LedgerEntry> {
    EntryBuilder::new(*owner, event).previous(previous_hash).build()
}

/// Serialize a ledger as a JSON array in append order.
pub fn ledger_to_json(entries: &[LedgerEntry]) -> Result<String> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// Parse a ledger written by [`ledger_to_json`] or by the legacy tooling.
///
/// Only structural problems fail here. A hash reference that is not
/// canonical hex loads as [`HashRef::Malformed`] and is reported by the
/// verifier.
pub fn ledger_from_json(text: &str) -> Result<Vec<LedgerEntry>> {
    Ok(serde_json::from_str(text)?)
}
