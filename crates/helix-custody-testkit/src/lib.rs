//! # Helix Custody Testkit
//!
//! Testing utilities for Helix Custody.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Identity and ledger documents in both encoding
//!   generations, with the hashes they must reproduce byte for byte
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Helper structs for setting up custody scenarios
//! - **Faults**: A store wrapper that fails chosen writes on demand
//!
//! ## Golden Vectors
//!
//! ```rust
//! use helix_custody_testkit::vectors::all_vectors;
//!
//! for vector in all_vectors() {
//!     let identity = vector.identity().unwrap();
//!     assert_eq!(identity.merkle_root.to_hex(), vector.expected_merkle_root);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use helix_custody_testkit::generators::{AgentParams, ledger_from_params};
//!
//! proptest! {
//!     #[test]
//!     fn generated_ledgers_verify(params: AgentParams) {
//!         let (identity, entries) = ledger_from_params(&params);
//!         prop_assert!(helix_custody_core::verify_ledger(&entries, &identity.merkle_root).is_valid());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use helix_custody_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let identity = fixture.make_identity("custodian-1", "agent-1");
//! let ledger = fixture.make_ledger(&identity, 3);
//! assert_eq!(ledger.len(), 3);
//! ```

pub mod faults;
pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use faults::{FaultyStore, StoreOp};
pub use fixtures::{member_keys, TestFixture};
pub use generators::{ledger_from_params, AgentParams};
pub use vectors::{all_vectors, rebuild_from_vector, verify_all_vectors, GoldenVector};
