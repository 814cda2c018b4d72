//! Verdicts returned by the resolver.

use oe_02_ledger_store::{ChainLinkError, ReplaceReport, SealError};
use shared_types::BlockHash;
use thiserror::Error;

/// Why a single block was not appended.
#[derive(Debug, Clone, Error)]
pub enum RejectReason {
    #[error("Block {index} is already on the chain")]
    AlreadyKnown { index: u64 },

    #[error("Block {index} is at or below the tip {tip}")]
    Stale { index: u64, tip: u64 },

    #[error("Block {index} is ahead of the tip, expected {expected}")]
    Ahead { index: u64, expected: u64 },

    #[error("Block {index} builds on unknown parent {previous_hash}")]
    Fork { index: u64, previous_hash: BlockHash },

    #[error("Block {index} seal is invalid: {source}")]
    Seal {
        index: u64,
        #[source]
        source: SealError,
    },

    #[error("Block {index} does not apply: {source}")]
    Invalid {
        index: u64,
        #[source]
        source: ChainLinkError,
    },
}

impl RejectReason {
    /// The peer has blocks we lack; a full height comparison may fix it.
    pub fn requires_sync(&self) -> bool {
        matches!(self, RejectReason::Ahead { .. } | RejectReason::Fork { .. })
    }

    /// Hash or signature failure, as opposed to an ordering problem.
    pub fn is_cryptographic(&self) -> bool {
        matches!(self, RejectReason::Seal { .. })
    }
}

#[derive(Debug, Clone)]
pub enum BlockOutcome {
    Accepted { index: u64, hash: BlockHash },
    Rejected(RejectReason),
}

impl BlockOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, BlockOutcome::Accepted { .. })
    }
}

/// Why a candidate chain was not adopted.
#[derive(Debug, Clone, Error)]
pub enum IgnoreReason {
    #[error("Candidate chain is empty")]
    Empty,

    #[error("Candidate length {candidate} does not exceed local length {local}")]
    NotLonger { local: usize, candidate: usize },

    #[error("Candidate genesis {got} differs from local genesis {expected}")]
    GenesisMismatch { expected: BlockHash, got: BlockHash },

    #[error("Candidate block {index} seal is invalid: {source}")]
    Seal {
        index: u64,
        #[source]
        source: SealError,
    },

    #[error("Candidate chain does not replay: {0}")]
    Invalid(#[source] ChainLinkError),
}

#[derive(Debug, Clone)]
pub enum ChainOutcome {
    Replaced(ReplaceReport),
    Ignored(IgnoreReason),
}

impl ChainOutcome {
    pub fn is_replaced(&self) -> bool {
        matches!(self, ChainOutcome::Replaced(_))
    }
}
