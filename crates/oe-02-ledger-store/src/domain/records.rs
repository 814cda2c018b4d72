use serde::{Deserialize, Serialize};
use shared_types::{BlockHash, Transaction};

/// Persisted form of a transaction. `block_hash` is `None` while pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub transaction: Transaction,
    pub block_hash: Option<BlockHash>,
}

/// A transaction together with where it sits on the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub block_index: u64,
    pub block_hash: BlockHash,
    pub block_timestamp: String,
}
