//! Quorum petitions: multi-party recovery of custody over an agent.
//!
//! A petition collects member signatures, at most one per member, until the
//! number of signers reaches its threshold. A ratified petition produces the artifacts
//! of a forced custody transfer: a revocation payload for the old ledger and
//! a seed for the successor identity. The petition itself writes nothing.
//!
//! Signatures pass through a [`SignatureCheck`] on the way in. The default,
//! [`OpaqueSignatures`], treats them as opaque strings and says so in the log;
//! [`Ed25519Roster`] verifies them against registered member keys.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::canonical::{encode, EncodingRule};
use crate::crypto::{ContentHash, MemberKey};
use crate::error::{CoreError, Result};
use crate::event::ForceTransfer;
use crate::types::Timestamp;

/// Threshold used when none is given.
pub const DEFAULT_THRESHOLD: usize = 3;

/// Domain tag bound into every petition signing message.
const SIGNING_DOMAIN: &str = "helix-custody/quorum-petition/v1";

/// Petition lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PetitionStatus {
    Pending,
    Ratified,
    /// Reserved. No operation moves a petition here.
    Rejected,
}

impl fmt::Display for PetitionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Ratified => "RATIFIED",
            Self::Rejected => "REJECTED",
        };
        f.write_str(label)
    }
}

/// One recorded signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PetitionSignature {
    pub member_id: String,
    pub signature: String,
    pub timestamp: Timestamp,
}

/// Origin marker carried by a successor identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Lineage {
    RecoveredViaQuorum,
}

impl Lineage {
    /// The wire text, also used as the successor's creation reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RecoveredViaQuorum => "RECOVERED_VIA_QUORUM",
        }
    }
}

/// Everything needed to mint the successor identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessorSeed {
    pub agent_id: String,
    pub custodian_pubkey: String,
    pub lineage: Lineage,
}

/// Output of a successful override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideArtifacts {
    /// Payload for the terminal entry of the old ledger.
    pub revocation: ForceTransfer,
    pub successor: SuccessorSeed,
}

/// Decides whether a member's signature is acceptable.
pub trait SignatureCheck: Send + Sync {
    /// Check `signature` by `member_id` over `message`. The error is the reason.
    fn check(&self, member_id: &str, message: &[u8], signature: &str)
        -> std::result::Result<(), String>;
}

/// Accepts any non-empty signature without verifying it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueSignatures;

impl SignatureCheck for OpaqueSignatures {
    fn check(
        &self,
        member_id: &str,
        _message: &[u8],
        signature: &str,
    ) -> std::result::Result<(), String> {
        if signature.trim().is_empty() {
            return Err("empty signature".into());
        }
        warn!(member_id, "quorum signature accepted without cryptographic verification");
        Ok(())
    }
}

/// Verifies hex Ed25519 signatures against a fixed set of member keys.
#[derive(Debug, Clone, Default)]
pub struct Ed25519Roster {
    members: HashMap<String, MemberKey>,
}

impl Ed25519Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a member's public key.
    pub fn register(&mut self, member_id: impl Into<String>, key: MemberKey) -> &mut Self {
        self.members.insert(member_id.into(), key);
        self
    }

    pub fn with_member(mut self, member_id: impl Into<String>, key: MemberKey) -> Self {
        self.register(member_id, key);
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl SignatureCheck for Ed25519Roster {
    fn check(
        &self,
        member_id: &str,
        message: &[u8],
        signature: &str,
    ) -> std::result::Result<(), String> {
        let key = self
            .members
            .get(member_id)
            .ok_or_else(|| "not a registered quorum member".to_string())?;
        key.verify_hex(message, signature)
    }
}

/// A petition to force a custody transfer.
#[derive(Debug, Clone)]
pub struct QuorumPetition<C = OpaqueSignatures> {
    target_agent_id: String,
    new_custodian_pubkey: String,
    threshold: usize,
    signatures: Vec<PetitionSignature>,
    status: PetitionStatus,
    check: C,
}

impl QuorumPetition<OpaqueSignatures> {
    /// Open a petition whose signatures are not verified.
    pub fn new(
        target_agent_id: impl Into<String>,
        new_custodian_pubkey: impl Into<String>,
        threshold: usize,
    ) -> Result<Self> {
        Self::with_check(target_agent_id, new_custodian_pubkey, threshold, OpaqueSignatures)
    }
}

impl<C: SignatureCheck> QuorumPetition<C> {
    /// Open a petition that passes every signature through `check`.
    pub fn with_check(
        target_agent_id: impl Into<String>,
        new_custodian_pubkey: impl Into<String>,
        threshold: usize,
        check: C,
    ) -> Result<Self> {
        let target_agent_id = target_agent_id.into();
        let new_custodian_pubkey = new_custodian_pubkey.into();

        if target_agent_id.trim().is_empty() {
            return Err(CoreError::Validation("target agent id is empty".into()));
        }
        if new_custodian_pubkey.trim().is_empty() {
            return Err(CoreError::Validation("new custodian key is empty".into()));
        }
        if threshold == 0 {
            return Err(CoreError::Validation("threshold must be at least 1".into()));
        }

        Ok(Self {
            target_agent_id,
            new_custodian_pubkey,
            threshold,
            signatures: Vec::new(),
            status: PetitionStatus::Pending,
            check,
        })
    }

    pub fn target_agent_id(&self) -> &str {
        &self.target_agent_id
    }

    pub fn new_custodian_pubkey(&self) -> &str {
        &self.new_custodian_pubkey
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn status(&self) -> PetitionStatus {
        self.status
    }

    pub fn signatures(&self) -> &[PetitionSignature] {
        &self.signatures
    }

    /// Number of members that have signed. Equal to `signatures().len()`.
    pub fn distinct_signers(&self) -> usize {
        self.signatures.len()
    }

    pub fn has_signed(&self, member_id: &str) -> bool {
        self.signatures.iter().any(|s| s.member_id == member_id)
    }

    /// The bytes a member signs: the compact canonical encoding of the
    /// petition terms under a fixed domain tag.
    pub fn signing_message(&self) -> Result<Vec<u8>> {
        let terms = json!({
            "domain": SIGNING_DOMAIN,
            "target_agent_id": self.target_agent_id,
            "new_custodian_pubkey": self.new_custodian_pubkey,
            "threshold": self.threshold,
        });
        encode(&terms, EncodingRule::Compact)
    }

    /// Record a signature stamped with the current time.
    pub fn sign(
        &mut self,
        member_id: impl Into<String>,
        signature: impl Into<String>,
    ) -> Result<PetitionStatus> {
        self.sign_at(member_id, signature, Timestamp::now())
    }

    /// Record a signature with an explicit timestamp.
    ///
    /// Signing a ratified petition is recorded but changes nothing. A member
    /// that has already signed is refused and nothing is recorded.
    pub fn sign_at(
        &mut self,
        member_id: impl Into<String>,
        signature: impl Into<String>,
        timestamp: Timestamp,
    ) -> Result<PetitionStatus> {
        let member_id = member_id.into();
        let signature = signature.into();

        if member_id.trim().is_empty() {
            return Err(CoreError::Validation("member id is empty".into()));
        }
        if self.has_signed(&member_id) {
            return Err(CoreError::Validation(format!(
                "{} has already signed this petition",
                member_id
            )));
        }

        let message = self.signing_message()?;
        self.check
            .check(&member_id, &message, &signature)
            .map_err(|reason| CoreError::SignatureRejected {
                member_id: member_id.clone(),
                reason,
            })?;

        self.signatures.push(PetitionSignature {
            member_id,
            signature,
            timestamp,
        });

        let signers = self.distinct_signers();
        if self.status == PetitionStatus::Pending && signers >= self.threshold {
            self.status = PetitionStatus::Ratified;
            info!(
                agent = %self.target_agent_id,
                signers,
                threshold = self.threshold,
                "quorum reached, custody transfer authorized"
            );
        } else {
            debug!(
                agent = %self.target_agent_id,
                signers,
                threshold = self.threshold,
                status = %self.status,
                "petition signed"
            );
        }

        Ok(self.status)
    }

    /// Produce the revocation and successor seed for `old_identity_hash`.
    pub fn execute_override(&self, old_identity_hash: &ContentHash) -> Result<OverrideArtifacts> {
        if self.status != PetitionStatus::Ratified {
            return Err(CoreError::Unauthorized(format!(
                "quorum threshold not met: {}/{} distinct signers",
                self.distinct_signers(),
                self.threshold
            )));
        }

        Ok(OverrideArtifacts {
            revocation: ForceTransfer::new(self.signatures.clone(), *old_identity_hash),
            successor: SuccessorSeed {
                agent_id: self.target_agent_id.clone(),
                custodian_pubkey: self.new_custodian_pubkey.clone(),
                lineage: Lineage::RecoveredViaQuorum,
            },
        })
    }
}
