//! Canonical JSON encoding for deterministic hashing.
//!
//! Every content hash is SHA-256 over the bytes produced here, so two values
//! with the same logical content must always encode identically:
//! - Object keys sorted by their UTF-8 bytes, at every nesting level
//! - Arrays keep element order
//! - Strings are UTF-8; only the escapes listed below are used
//! - Integers only (a float has no single canonical text form)
//!
//! The rule in force is selected by the record's own schema version, so old
//! records keep verifying after the current rule changes.
//!
//! **CRITICAL**: a rule is FROZEN once records exist under it. Changing one
//! invalidates every hash computed with it.

use serde_json::{Map, Number, Value};

use crate::crypto::ContentHash;
use crate::error::{CoreError, Result};
use crate::types::SchemaVersion;

/// A frozen canonical encoding rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingRule {
    /// `v0.3`: `", "` / `": "` separators, non-ASCII escaped as `\uXXXX`.
    Spaced,
    /// `v0.4`: no whitespace, non-ASCII written as raw UTF-8.
    Compact,
}

impl EncodingRule {
    fn item_separator(self) -> &'static str {
        match self {
            Self::Spaced => ", ",
            Self::Compact => ",",
        }
    }

    fn key_separator(self) -> &'static str {
        match self {
            Self::Spaced => ": ",
            Self::Compact => ":",
        }
    }

    fn escapes_non_ascii(self) -> bool {
        matches!(self, Self::Spaced)
    }
}

/// Encode a value with the rule pinned by `version`.
pub fn canonical_bytes(value: &Value, version: &SchemaVersion) -> Result<Vec<u8>> {
    let rule = version
        .encoding_rule()
        .ok_or_else(|| CoreError::UnsupportedVersion(version.as_str().to_string()))?;
    encode(value, rule)
}

/// Encode a value with an explicit rule.
pub fn encode(value: &Value, rule: EncodingRule) -> Result<Vec<u8>> {
    let mut buf = String::new();
    encode_value_to(&mut buf, value, rule)?;
    Ok(buf.into_bytes())
}

/// SHA-256 over the canonical encoding pinned by `version`.
pub fn content_hash(value: &Value, version: &SchemaVersion) -> Result<ContentHash> {
    canonical_bytes(value, version).map(|bytes| ContentHash::digest(&bytes))
}

/// SHA-256 over the canonical encoding under an explicit rule.
pub fn content_hash_with(value: &Value, rule: EncodingRule) -> Result<ContentHash> {
    encode(value, rule).map(|bytes| ContentHash::digest(&bytes))
}

/// Recursively encode a JSON value.
fn encode_value_to(buf: &mut String, value: &Value, rule: EncodingRule) -> Result<()> {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => encode_number(buf, n)?,
        Value::String(s) => encode_text(buf, s, rule),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push_str(rule.item_separator());
                }
                encode_value_to(buf, item, rule)?;
            }
            buf.push(']');
        }
        Value::Object(map) => encode_object(buf, map, rule)?,
    }
    Ok(())
}

fn encode_number(buf: &mut String, n: &Number) -> Result<()> {
    if let Some(i) = n.as_i64() {
        buf.push_str(&i.to_string());
    } else if let Some(u) = n.as_u64() {
        buf.push_str(&u.to_string());
    } else {
        return Err(CoreError::Encoding(format!(
            "non-integer number {} has no canonical form",
            n
        )));
    }
    Ok(())
}

/// Encode an object with keys sorted by UTF-8 bytes.
fn encode_object(buf: &mut String, map: &Map<String, Value>, rule: EncodingRule) -> Result<()> {
    let mut entries: Vec<(&String, &Value)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    buf.push('{');
    for (i, (key, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            buf.push_str(rule.item_separator());
        }
        encode_text(buf, key, rule);
        buf.push_str(rule.key_separator());
        encode_value_to(buf, value, rule)?;
    }
    buf.push('}');
    Ok(())
}

fn encode_text(buf: &mut String, s: &str, rule: EncodingRule) {
    buf.push('"');
    for c in s.chars() {
        match c {
            '"' => buf.push_str("\\\""),
            '\\' => buf.push_str("\\\\"),
            '\n' => buf.push_str("\\n"),
            '\r' => buf.push_str("\\r"),
            '\t' => buf.push_str("\\t"),
            '\u{08}' => buf.push_str("\\b"),
            '\u{0c}' => buf.push_str("\\f"),
            c if (c as u32) < 0x20 => push_unicode_escape(buf, c as u32),
            // Spaced escapes everything outside printable ASCII, DEL included.
            c if rule.escapes_non_ascii() && !(' '..='~').contains(&c) => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    push_unicode_escape(buf, u32::from(*unit));
                }
            }
            c => buf.push(c),
        }
    }
    buf.push('"');
}

fn push_unicode_escape(buf: &mut String, unit: u32) {
    buf.push_str(&format!("\\u{:04x}", unit));
}
