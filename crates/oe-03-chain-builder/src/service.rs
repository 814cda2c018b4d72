//! # Chain Builder
//!
//! Turns the pending pool into a sealed block on top of the current tip:
//! select admissible transactions, search for a nonce that meets the
//! difficulty, sign.
//!
//! The nonce search is CPU bound and meant to run on a blocking thread. It
//! polls a shared cancel flag on every iteration, so the node can abandon
//! the attempt as soon as a peer block for the same height is accepted.

use std::sync::atomic::{AtomicBool, Ordering};

use oe_01_state_machine::{block_time, LedgerState, TransactionValidator, ValidationError};
use serde_json::Map;
use shared_crypto::IdentityProvider;
use shared_types::{meets_difficulty, Block, Transaction};
use tracing::{debug, info};

use crate::domain::select_transactions;
use crate::error::{BuildError, Result};

/// Nonces between two progress log lines.
const PROGRESS_INTERVAL: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Required leading hex zeros of the block hash.
    pub difficulty: usize,
    pub max_transactions_per_block: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            difficulty: 2,
            max_transactions_per_block: 500,
        }
    }
}

/// Everything a mining attempt needs, owned so it can move to another thread.
#[derive(Debug, Clone)]
pub struct MiningJob {
    pub parent: Block,
    pub state: LedgerState,
    pub pending: Vec<Transaction>,
}

/// A sealed block plus the transactions left out of it.
#[derive(Debug, Clone)]
pub struct MinedBlock {
    pub block: Block,
    pub rejected: Vec<(Transaction, ValidationError)>,
}

#[derive(Debug, Clone)]
pub struct ChainBuilder {
    config: BuilderConfig,
    validator: TransactionValidator,
}

impl ChainBuilder {
    pub fn new(validator: TransactionValidator, config: BuilderConfig) -> Self {
        Self { config, validator }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build, seal and sign the next block.
    pub fn mine(
        &self,
        job: MiningJob,
        identity: &dyn IdentityProvider,
        cancel: &AtomicBool,
    ) -> Result<MinedBlock> {
        let (block, rejected) = self.assemble(job, identity.node_id())?;
        let block = self.seal(block, identity, cancel)?;
        Ok(MinedBlock { block, rejected })
    }

    /// Build the unsealed candidate from admissible pending transactions.
    ///
    /// Transactions are judged at the block's own timestamp, which is the
    /// time every other node will use when it executes the block.
    pub fn assemble(
        &self,
        job: MiningJob,
        signer_id: String,
    ) -> Result<(Block, Vec<(Transaction, ValidationError)>)> {
        let MiningJob {
            parent,
            state,
            pending,
        } = job;
        let mut block = Block::unsealed(parent.index + 1, parent.hash, Vec::new(), Map::new(), signer_id);
        let at = block_time(&block)?;

        let selection = select_transactions(
            &self.validator,
            &state,
            pending,
            block.index,
            at,
            self.config.max_transactions_per_block,
        );
        block.transactions = selection.included;
        Ok((block, selection.rejected))
    }

    /// Search for a nonce meeting the difficulty, then sign.
    pub fn seal(
        &self,
        mut block: Block,
        identity: &dyn IdentityProvider,
        cancel: &AtomicBool,
    ) -> Result<Block> {
        let difficulty = self.config.difficulty;
        debug!(block_height = block.index, difficulty, "Starting PoW search");

        for nonce in 0..=u64::MAX {
            if cancel.load(Ordering::Relaxed) {
                info!(block_height = block.index, nonce, "Mining cancelled");
                return Err(BuildError::Cancelled { nonce });
            }
            block.nonce = nonce;
            block.hash = block.compute_hash()?;
            if meets_difficulty(&block.hash, difficulty) {
                block.signature = identity.sign(&block.signing_payload()?);
                info!(
                    block_height = block.index,
                    block_hash = %block.hash,
                    nonce,
                    transactions = block.transactions.len(),
                    "Mined block"
                );
                return Ok(block);
            }
            if nonce > 0 && nonce % PROGRESS_INTERVAL == 0 {
                debug!(block_height = block.index, nonce, "PoW search in progress");
            }
        }
        Err(BuildError::Exhausted { difficulty })
    }
}
