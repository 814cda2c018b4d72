//! Block seal verification: hash, proof of work and signer signature.

use shared_types::{meets_difficulty, Block};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SealError {
    #[error("Hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },

    #[error("Hash {hash} does not meet difficulty {difficulty}")]
    InsufficientWork { hash: String, difficulty: usize },

    #[error("Block is not signed")]
    Unsigned,

    #[error("Signature does not verify against signer {signer_id}")]
    BadSignature { signer_id: String },

    #[error("Block could not be encoded: {0}")]
    Encoding(String),
}

impl SealError {
    /// Cryptographic failures, as opposed to plain malformation.
    pub fn is_cryptographic(&self) -> bool {
        matches!(self, SealError::BadSignature { .. } | SealError::Unsigned)
    }
}

/// Check that `block` carries a valid seal.
///
/// Genesis is only checked for hash consistency: it is neither mined nor
/// signed.
pub fn verify_seal(block: &Block, difficulty: usize) -> Result<(), SealError> {
    let computed = block
        .compute_hash()
        .map_err(|e| SealError::Encoding(e.to_string()))?;
    if computed != block.hash {
        return Err(SealError::HashMismatch {
            stored: block.hash.clone(),
            computed,
        });
    }
    if block.is_genesis() {
        return Ok(());
    }

    if !meets_difficulty(&block.hash, difficulty) {
        return Err(SealError::InsufficientWork {
            hash: block.hash.clone(),
            difficulty,
        });
    }

    if block.signer_id.is_empty() || block.signature.is_empty() {
        return Err(SealError::Unsigned);
    }
    let payload = block
        .signing_payload()
        .map_err(|e| SealError::Encoding(e.to_string()))?;
    if !shared_crypto::verify(&block.signer_id, &payload, &block.signature) {
        return Err(SealError::BadSignature {
            signer_id: block.signer_id.clone(),
        });
    }
    Ok(())
}
