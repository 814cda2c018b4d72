//! Block execution.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use shared_types::{Block, GenesisConfig, GenesisError};
use tracing::debug;

use crate::domain::{ExecutionError, LedgerState, TransactionValidator};

/// Effects of applying one block, beyond its transactions.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlockReceipt {
    pub transactions: usize,
    /// Block reward credited to the signer.
    pub reward: f64,
    /// Escrow released to the recycling treasury.
    pub released: f64,
}

/// Applies blocks to ledger state, all-or-nothing.
#[derive(Debug, Clone)]
pub struct BlockExecutor {
    validator: TransactionValidator,
}

impl BlockExecutor {
    pub fn new(genesis: &GenesisConfig) -> Result<Self, GenesisError> {
        Ok(Self {
            validator: TransactionValidator::new(genesis)?,
        })
    }

    pub fn validator(&self) -> &TransactionValidator {
        &self.validator
    }

    /// Execute `block` on a copy of `state`.
    ///
    /// Every transaction is admitted against the state left by the ones
    /// before it, so a block cannot spend the same funds twice. On success
    /// returns the post-state; on failure `state` is untouched.
    pub fn execute(
        &self,
        state: &LedgerState,
        block: &Block,
    ) -> Result<(LedgerState, BlockReceipt), ExecutionError> {
        let at = block_time(block)?;
        let params = self.validator.params();
        let mut next = state.clone();
        let mut seen = HashSet::with_capacity(block.transactions.len());

        for (index, tx) in block.transactions.iter().enumerate() {
            if !seen.insert(tx.id.as_str()) {
                return Err(ExecutionError::DuplicateTransaction(tx.id.clone()));
            }
            self.validator
                .admit(&next, tx, at)
                .map_err(|source| ExecutionError::Transaction {
                    index,
                    tx_id: tx.id.clone(),
                    source,
                })?;
            next.apply_transaction(tx, block.index, &params.vesting_contracts);
        }

        let mut receipt = BlockReceipt {
            transactions: block.transactions.len(),
            ..BlockReceipt::default()
        };
        if !block.is_genesis() && !block.signer_id.is_empty() {
            receipt.reward = next.apply_block_reward(&block.signer_id, params.block_reward, params.max_supply);
        }
        receipt.released = next.release_from_escrow(block.index, params.appeal_window_blocks);

        debug!(
            block_height = block.index,
            transactions = receipt.transactions,
            reward = receipt.reward,
            released = receipt.released,
            "Executed block"
        );
        Ok((next, receipt))
    }
}

/// Parse a block's RFC 3339 timestamp.
pub fn block_time(block: &Block) -> Result<DateTime<Utc>, ExecutionError> {
    DateTime::parse_from_rfc3339(&block.timestamp)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| ExecutionError::InvalidTimestamp(block.timestamp.clone()))
}
