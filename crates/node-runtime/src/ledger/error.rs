use oe_01_state_machine::ValidationError;
use oe_02_ledger_store::StoreError;
use oe_03_chain_builder::PoolError;
use oe_04_consensus::ConsensusError;
use thiserror::Error;

/// Why a transaction was not admitted to the pending pool.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Transaction {0} is already known")]
    Duplicate(String),

    #[error(transparent)]
    Pool(PoolError),

    #[error(transparent)]
    Storage(#[from] StoreError),

    #[error("Ledger writer has stopped")]
    Unavailable,
}

impl From<PoolError> for SubmitError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Duplicate(id) => SubmitError::Duplicate(id),
            other => SubmitError::Pool(other),
        }
    }
}

/// Failures of block and chain submission.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    #[error("Ledger writer has stopped")]
    Unavailable,
}
