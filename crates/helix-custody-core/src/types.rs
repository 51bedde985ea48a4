//! Strong type definitions for Helix custody records.
//!
//! Identifiers, timestamps and schema versions are newtypes so that a record
//! identifier can never be passed where a content hash is expected.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::canonical::EncodingRule;
use crate::crypto::ContentHash;

/// Number of hex characters of a content hash kept in a derived identifier.
pub const ID_HEX_LEN: usize = 16;

/// Prefix of a derived identity record identifier.
pub const RECORD_ID_PREFIX: &str = "DBC-";

/// Prefix of a derived ledger entry identifier.
pub const ENTRY_ID_PREFIX: &str = "ENTRY-";

/// Schema version carried by every record and entry.
///
/// The version is part of the hashed content, so it also pins the canonical
/// encoding rule that was used to produce the record's hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SchemaVersion {
    /// `v0.3`: records written by the original tooling.
    V0_3,
    /// `v0.4`: compact canonical encoding.
    V0_4,
    /// A version string this build does not know how to encode.
    Unrecognized(String),
}

impl SchemaVersion {
    /// The version stamped on newly created records.
    pub const CURRENT: Self = Self::V0_4;

    /// Parse a version tag. Never fails; unknown tags are preserved verbatim.
    pub fn parse(tag: &str) -> Self {
        match tag {
            "v0.3" => Self::V0_3,
            "v0.4" => Self::V0_4,
            other => Self::Unrecognized(other.to_string()),
        }
    }

    /// The wire tag.
    pub fn as_str(&self) -> &str {
        match self {
            Self::V0_3 => "v0.3",
            Self::V0_4 => "v0.4",
            Self::Unrecognized(tag) => tag,
        }
    }

    /// The canonical encoding rule for this version, if it is known.
    pub fn encoding_rule(&self) -> Option<EncodingRule> {
        match self {
            Self::V0_3 => Some(EncodingRule::Spaced),
            Self::V0_4 => Some(EncodingRule::Compact),
            Self::Unrecognized(_) => None,
        }
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::parse(&tag))
    }
}

/// An ISO-8601 UTC timestamp, kept as the exact text that was hashed.
///
/// The text is never re-rendered from a parsed instant: two renderings of the
/// same instant can differ (fractional digits) and would change the hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(String);

impl Timestamp {
    /// The current UTC time with microsecond precision and a `Z` suffix.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Render an instant in the ledger's timestamp format.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    /// Wrap timestamp text read from elsewhere, unchanged.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The stored text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse the text as an instant, if it is valid RFC 3339.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.0)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn derive_id(prefix: &str, hash: &ContentHash) -> String {
    let hex = hash.to_hex();
    format!("{}{}", prefix, &hex[..ID_HEX_LEN])
}

/// Identity record identifier: `DBC-` followed by 16 hex chars of the merkle root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derive the identifier for a record content hash.
    pub fn derive(merkle_root: &ContentHash) -> Self {
        Self(derive_id(RECORD_ID_PREFIX, merkle_root))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Ledger entry identifier: `ENTRY-` followed by 16 hex chars of the entry hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Derive the identifier for an entry content hash.
    pub fn derive(entry_hash: &ContentHash) -> Self {
        Self(derive_id(ENTRY_ID_PREFIX, entry_hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_schema_version_roundtrip() {
        for tag in ["v0.3", "v0.4", "v9.9"] {
            assert_eq!(SchemaVersion::parse(tag).as_str(), tag);
        }
        assert!(SchemaVersion::parse("v9.9").encoding_rule().is_none());
        assert_eq!(SchemaVersion::default(), SchemaVersion::V0_4);
    }

    #[test]
    fn test_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2025, 12, 29, 12, 0, 0).unwrap();
        let ts = Timestamp::from_datetime(at);
        assert_eq!(ts.as_str(), "2025-12-29T12:00:00.000000Z");
        assert_eq!(ts.to_datetime(), Some(at));
    }

    #[test]
    fn test_timestamp_text_preserved() {
        // Legacy tooling omits fractional seconds when they are zero.
        let ts = Timestamp::from_text("2025-12-29T12:00:00Z");
        assert_eq!(ts.as_str(), "2025-12-29T12:00:00Z");
    }

    #[test]
    fn test_derived_ids() {
        let hash = ContentHash::from_bytes([0xab; 32]);
        assert_eq!(RecordId::derive(&hash).as_str(), "DBC-abababababababab");
        assert_eq!(EntryId::derive(&hash).as_str(), "ENTRY-abababababababab");
    }
}
