//! # Helix Custody
//!
//! The unified API for agent custody: a tamper-evident identity and
//! lifecycle record for autonomous agents.
//!
//! ## Overview
//!
//! - **Identity Record**: Immutable root document, addressed by its content hash
//! - **Custody Ledger**: Append-only, hash-chained events tethered to an identity
//! - **Verification**: Collect-all integrity audit of identities and ledgers
//! - **Quorum Recovery**: Threshold-authorized revocation and successor minting
//!
//! ## Usage
//!
//! ```rust,no_run
//! use helix_custody::{Custody, CustodyConfig};
//! use helix_custody::store::SqliteStore;
//!
//! async fn example() -> helix_custody::Result<()> {
//!     let store = SqliteStore::open("custody.db")?;
//!     let custody = Custody::new(store, CustodyConfig::default());
//!
//!     let agent = custody.create_agent("custodian_alice_001", "Alpha-Agent-01").await?;
//!     let root = agent.identity.merkle_root;
//!
//!     custody.update_state(&root, "RESTRICTED", "policy review").await?;
//!     assert!(custody.verify_agent(&root).await?.is_valid());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `helix_custody::core` - Core primitives (identities, entries, verifier, quorum)
//! - `helix_custody::store` - Storage abstraction and SQLite

pub mod config;
pub mod custody;
pub mod error;
pub mod render;

// Re-export component crates
pub use helix_custody_core as core;
pub use helix_custody_store as store;

pub use config::CustodyConfig;
pub use custody::{AgentSummary, CreatedAgent, Custody, CustodyReport, Recovery};
pub use error::{CustodyError, Result};
pub use render::{RenderCache, RenderSubject, Renderer, DEFAULT_RENDER_CACHE_CAPACITY};

// Re-export commonly used core types
pub use helix_custody_core::{
    ContentHash, Event, HashRef, IdentityRecord, IntegrityFailure, LedgerEntry, PetitionStatus,
    QuorumPetition, SchemaVersion,
};
