//! # Shared Crypto
//!
//! Identity and signing primitives for ledger nodes.
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `signatures` | Ed25519 | Block and message signatures |
//! | `identity` | Ed25519 over canonical JSON | Node identity, `IdentityProvider` port |
//! | `symmetric` | Argon2id + XChaCha20-Poly1305 | Key encryption at rest |
//! | `keystore` | - | Loading / generating the node key |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency
//! - **XChaCha20**: 192-bit nonce, constant-time, side-channel immune
//! - **Argon2id**: Memory-hard password stretching

#![warn(missing_docs)]
#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod identity;
pub mod keystore;
pub mod signatures;
pub mod symmetric;

// Re-exports
pub use errors::{CryptoError, KeystoreError};
pub use identity::{verify, verify_canonical, IdentityProvider, NodeIdentity};
pub use keystore::Keystore;
pub use signatures::{verify_hex, Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
pub use symmetric::KdfParams;
