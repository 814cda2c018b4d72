//! # Shared Types Crate
//!
//! Ledger entities, genesis configuration and the peer wire envelope shared by
//! every subsystem of the node.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every cross-subsystem type is defined here.
//! - **Canonical Encoding**: block hashes and signatures are always computed
//!   over [`canonical_json`], so two nodes that agree on the data agree on
//!   the bytes.
//! - **Closed Transaction Set**: [`TransactionKind`] is an exhaustive enum;
//!   adding a type forces every consumer to handle it.

pub mod entities;
pub mod envelope;
pub mod errors;
pub mod genesis;
pub mod hashing;

pub use entities::*;
pub use envelope::*;
pub use errors::*;
pub use genesis::*;
pub use hashing::{canonical_json, meets_difficulty, sha256_hex};
