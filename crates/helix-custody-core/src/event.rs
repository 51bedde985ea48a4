//! Ledger events: the event type tag and its details payload.
//!
//! Known event types have precise shapes. Anything else, including a known
//! type whose payload does not fit its shape exactly, is kept as a generic
//! string-keyed map so that parsing a stored entry never changes its hash.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::crypto::ContentHash;
use crate::error::{CoreError, Result};
use crate::quorum::PetitionSignature;
use crate::types::Timestamp;

/// Event type tags.
pub mod kinds {
    pub const INSTANTIATION: &str = "INSTANTIATION";
    pub const CAPABILITY_INIT: &str = "CAPABILITY_INIT";
    pub const CAPABILITY_GRANT: &str = "CAPABILITY_GRANT";
    pub const STATE_CHANGE: &str = "STATE_CHANGE";
    pub const CUSTODY_FORCE_TRANSFER: &str = "CUSTODY_FORCE_TRANSFER";
}

/// Reason recorded on a quorum-forced custody transfer.
pub const QUORUM_OVERRIDE_REASON: &str = "QUORUM_OVERRIDE_EXECUTED";

/// The agent came into existence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Instantiation {
    pub status: String,
    pub resources: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

/// Initial capability set and its restrictions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityInit {
    pub capabilities: Vec<String>,
    pub restrictions: Vec<String>,
}

/// A single capability granted after instantiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CapabilityGrant {
    pub capability: String,
    pub level: String,
}

/// Lifecycle state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateChange {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

impl StateChange {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            reason: None,
            timestamp: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>, at: Timestamp) -> Self {
        self.reason = Some(reason.into());
        self.timestamp = Some(at);
        self
    }
}

/// Revocation of an identity by quorum override. Terminal entry of a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForceTransfer {
    #[serde(rename = "type")]
    pub kind: String,
    pub reason: String,
    pub signatures: Vec<PetitionSignature>,
    pub previous_dbc: ContentHash,
}

impl ForceTransfer {
    pub fn new(signatures: Vec<PetitionSignature>, previous_dbc: ContentHash) -> Self {
        Self {
            kind: kinds::CUSTODY_FORCE_TRANSFER.to_string(),
            reason: QUORUM_OVERRIDE_REASON.to_string(),
            signatures,
            previous_dbc,
        }
    }

    pub fn into_event(self) -> Event {
        Event::CustodyForceTransfer(self)
    }
}

/// An event: type tag plus details payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Instantiation(Instantiation),
    CapabilityInit(CapabilityInit),
    CapabilityGrant(CapabilityGrant),
    StateChange(StateChange),
    CustodyForceTransfer(ForceTransfer),
    /// Any other event type, or a known type with a non-conforming payload.
    Custom {
        event_type: String,
        details: Map<String, Value>,
    },
}

impl Event {
    /// Build a custom event.
    pub fn custom(event_type: impl Into<String>, details: Map<String, Value>) -> Self {
        Self::Custom {
            event_type: event_type.into(),
            details,
        }
    }

    /// The event type tag.
    pub fn event_type(&self) -> &str {
        match self {
            Self::Instantiation(_) => kinds::INSTANTIATION,
            Self::CapabilityInit(_) => kinds::CAPABILITY_INIT,
            Self::CapabilityGrant(_) => kinds::CAPABILITY_GRANT,
            Self::StateChange(_) => kinds::STATE_CHANGE,
            Self::CustodyForceTransfer(_) => kinds::CUSTODY_FORCE_TRANSFER,
            Self::Custom { event_type, .. } => event_type,
        }
    }

    /// The details payload as a JSON object.
    pub fn details(&self) -> Result<Map<String, Value>> {
        match self {
            Self::Instantiation(d) => to_map(d),
            Self::CapabilityInit(d) => to_map(d),
            Self::CapabilityGrant(d) => to_map(d),
            Self::StateChange(d) => to_map(d),
            Self::CustodyForceTransfer(d) => to_map(d),
            Self::Custom { details, .. } => Ok(details.clone()),
        }
    }

    /// Rebuild an event from its stored parts.
    ///
    /// A typed variant is chosen only when it re-encodes to exactly the stored
    /// object; otherwise the payload is kept verbatim as [`Event::Custom`].
    pub fn from_parts(event_type: String, details: Map<String, Value>) -> Self {
        let typed = match event_type.as_str() {
            kinds::INSTANTIATION => exact(&details).map(Self::Instantiation),
            kinds::CAPABILITY_INIT => exact(&details).map(Self::CapabilityInit),
            kinds::CAPABILITY_GRANT => exact(&details).map(Self::CapabilityGrant),
            kinds::STATE_CHANGE => exact(&details).map(Self::StateChange),
            kinds::CUSTODY_FORCE_TRANSFER => exact(&details).map(Self::CustodyForceTransfer),
            _ => None,
        };

        typed.unwrap_or(Self::Custom {
            event_type,
            details,
        })
    }

    /// The target state, if this is a state change.
    pub fn state_change(&self) -> Option<&StateChange> {
        match self {
            Self::StateChange(change) => Some(change),
            _ => None,
        }
    }

    /// Whether this event revokes the identity its ledger is tethered to.
    pub fn is_revocation(&self) -> bool {
        self.event_type() == kinds::CUSTODY_FORCE_TRANSFER
    }
}

fn to_map<T: Serialize>(payload: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(CoreError::Encoding(format!(
            "event details must be an object, got {}",
            other
        ))),
    }
}

fn exact<T: Serialize + DeserializeOwned>(stored: &Map<String, Value>) -> Option<T> {
    let stored = Value::Object(stored.clone());
    let parsed: T = serde_json::from_value(stored.clone()).ok()?;
    let reencoded = serde_json::to_value(&parsed).ok()?;
    (reencoded == stored).then_some(parsed)
}
