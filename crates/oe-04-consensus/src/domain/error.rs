//! Error types for the consensus subsystem
//!
//! Rejections are verdicts, not errors (see [`super::outcome`]). An error
//! here means the ledger could not record a verdict that was already
//! reached, which is an operator problem rather than a peer problem.

use oe_02_ledger_store::StoreError;

pub type Result<T> = std::result::Result<T, ConsensusError>;

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Ledger storage failed: {0}")]
    Storage(#[from] StoreError),
}
