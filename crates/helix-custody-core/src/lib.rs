//! # Helix Custody Core
//!
//! Pure primitives for agent custody: identity records, hash-chained custody
//! ledgers, canonical encoding, integrity verification and quorum petitions.
//!
//! This crate contains no I/O, no storage, no networking. Apart from reading
//! the clock when no timestamp is supplied, every operation is a pure function
//! of its inputs.
//!
//! ## Key Types
//!
//! - [`IdentityRecord`] - The immutable root document of an agent
//! - [`LedgerEntry`] - One hash-chained event tethered to an identity
//! - [`Event`] - Typed event payloads, lossless over unknown shapes
//! - [`QuorumPetition`] - Multi-party authorization of a custody transfer
//! - [`ContentHash`] - SHA-256 digest over canonical bytes
//!
//! ## Canonicalization
//!
//! Hashes are computed over canonical JSON whose exact rule is pinned by each
//! record's schema version. See the [`canonical`] module.

pub mod canonical;
pub mod crypto;
pub mod entry;
pub mod error;
pub mod event;
pub mod identity;
pub mod ledger;
pub mod quorum;
pub mod types;
pub mod verify;

pub use canonical::{canonical_bytes, content_hash, EncodingRule};
pub use crypto::{ContentHash, HashRef, Keypair, MemberKey};
pub use entry::{append_entry, ledger_from_json, ledger_to_json, EntryBuilder, LedgerEntry};
pub use error::{CoreError, IntegrityFailure, Result};
pub use event::{
    kinds, CapabilityGrant, CapabilityInit, Event, ForceTransfer, Instantiation, StateChange,
};
pub use identity::{create_identity, mint_successor, IdentityBuilder, IdentityRecord};
pub use ledger::{Ledger, UNKNOWN_STATE};
pub use quorum::{
    Ed25519Roster, Lineage, OpaqueSignatures, OverrideArtifacts, PetitionSignature,
    PetitionStatus, QuorumPetition, SignatureCheck, SuccessorSeed, DEFAULT_THRESHOLD,
};
pub use types::{EntryId, RecordId, SchemaVersion, Timestamp};
pub use verify::{
    verify_entry, verify_identity, verify_ledger, EntryReport, IdentityReport, LedgerReport,
};
