use oe_01_state_machine::ExecutionError;
use shared_types::{BlockHash, GenesisError};
use thiserror::Error;

use super::seal::SealError;
use crate::ports::outbound::KVStoreError;

/// A block does not extend the chain it was offered to.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainLinkError {
    #[error("Block index {got} does not extend tip: expected {expected}")]
    IndexMismatch { expected: u64, got: u64 },

    #[error("Block {index} previous_hash {got} does not match tip hash {expected}")]
    PreviousHashMismatch {
        index: u64,
        expected: BlockHash,
        got: BlockHash,
    },

    #[error("Transaction {0} is already on the chain")]
    DuplicateTransaction(String),

    #[error("Block {index} cannot be executed: {source}")]
    Execution {
        index: u64,
        #[source]
        source: ExecutionError,
    },

    #[error("Genesis mismatch: expected {expected}, got {got}")]
    GenesisMismatch { expected: BlockHash, got: BlockHash },

    #[error("Chain is empty")]
    EmptyChain,
}

impl ChainLinkError {
    /// True when the block may be valid on a different branch, so the
    /// right response is to synchronise rather than discard the sender.
    pub fn suggests_fork(&self) -> bool {
        matches!(
            self,
            ChainLinkError::PreviousHashMismatch { .. } | ChainLinkError::IndexMismatch { .. }
        )
    }
}

/// Ledger store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    ChainLink(#[from] ChainLinkError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] KVStoreError),

    #[error("Corrupt record at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error(transparent)]
    Genesis(#[from] GenesisError),

    #[error("Encoding failed: {0}")]
    Encoding(String),
}

/// First defect found by a full chain audit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityError {
    #[error("Block {index} is not linked to its predecessor")]
    BrokenLink { index: u64 },

    #[error("Block {index} has a bad seal: {source}")]
    Seal {
        index: u64,
        #[source]
        source: SealError,
    },

    #[error("Replay failed: {0}")]
    Replay(ChainLinkError),

    #[error("Materialized state diverges from replayed state")]
    StateDivergence,

    #[error("Supply mismatch: tracked {tracked}, computed {computed}")]
    SupplyMismatch { tracked: f64, computed: f64 },
}
