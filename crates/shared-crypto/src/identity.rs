//! # Node Identity
//!
//! A node is identified by its Ed25519 public key, hex-encoded. That string
//! is the `signer_id` on blocks it seals and the `sender_id` on messages it
//! originates.

use serde::Serialize;
use shared_types::canonical_json;

use crate::signatures::{verify_hex, Ed25519KeyPair};
use crate::CryptoError;

/// Signs on behalf of the local node.
pub trait IdentityProvider: Send + Sync {
    /// Hex public key of the node.
    fn node_id(&self) -> String;

    /// Hex signature over raw bytes.
    fn sign(&self, message: &[u8]) -> String;

    /// Hex signature over the canonical JSON form of `payload`.
    fn sign_canonical(&self, payload: &serde_json::Value) -> Result<String, CryptoError> {
        Ok(self.sign(&canonical_json(payload)?))
    }
}

/// Verify a hex signature produced by [`IdentityProvider::sign`].
pub fn verify(node_id: &str, message: &[u8], signature: &str) -> bool {
    verify_hex(node_id, message, signature)
}

/// Verify a signature over the canonical form of `payload`.
pub fn verify_canonical<T: Serialize + ?Sized>(
    node_id: &str,
    payload: &T,
    signature: &str,
) -> Result<bool, CryptoError> {
    Ok(verify_hex(node_id, &canonical_json(payload)?, signature))
}

/// Key-backed identity of the local node.
pub struct NodeIdentity {
    keypair: Ed25519KeyPair,
    node_id: String,
}

impl NodeIdentity {
    pub fn new(keypair: Ed25519KeyPair) -> Self {
        let node_id = keypair.public_key().to_hex();
        Self { keypair, node_id }
    }

    /// Fresh random identity.
    pub fn generate() -> Self {
        Self::new(Ed25519KeyPair::generate())
    }

    /// Deterministic identity, for tests and fixtures.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self::new(Ed25519KeyPair::from_seed(seed))
    }

    pub fn keypair(&self) -> &Ed25519KeyPair {
        &self.keypair
    }
}

impl std::fmt::Debug for NodeIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeIdentity")
            .field("node_id", &self.node_id)
            .finish_non_exhaustive()
    }
}

impl IdentityProvider for NodeIdentity {
    fn node_id(&self) -> String {
        self.node_id.clone()
    }

    fn sign(&self, message: &[u8]) -> String {
        self.keypair.sign(message).to_hex()
    }
}
