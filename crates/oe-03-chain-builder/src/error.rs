//! Error types for block building

use oe_01_state_machine::ExecutionError;
use shared_crypto::CryptoError;
use shared_types::EncodingError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    /// The cancel flag was raised during the nonce search.
    #[error("Mining cancelled at nonce {nonce}")]
    Cancelled { nonce: u64 },

    /// Every nonce was tried without meeting the difficulty.
    #[error("Nonce space exhausted at difficulty {difficulty}")]
    Exhausted { difficulty: usize },

    #[error("Invalid block template: {0}")]
    Template(#[from] ExecutionError),

    #[error("Block encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Block signing failed: {0}")]
    Signing(#[from] CryptoError),
}
