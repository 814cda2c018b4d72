//! # Consensus Resolver
//!
//! Decides whether a block received from a peer extends the local chain and
//! whether a peer's chain should replace it.
//!
//! ## Block acceptance
//!
//! Checks run in this order and the first failure is the verdict:
//!
//! 1. `index == tip.index + 1` (lower is stale, higher means we are behind)
//! 2. `previous_hash == tip.hash` (otherwise the peer is on a fork)
//! 3. stored hash equals the recomputed hash
//! 4. proof of work meets the difficulty
//! 5. signature verifies against `signer_id`
//! 6. every transaction applies to the current state
//!
//! ## Longest valid chain
//!
//! A candidate replaces the local chain only when it is strictly longer,
//! starts at the same genesis block, and every block seals and replays from
//! genesis. The new state is built on the side and swapped in as one step;
//! on any failure the local chain is untouched. Ties keep the incumbent.

use oe_02_ledger_store::{verify_seal, ChainLinkError, LedgerStore};
use shared_types::{Block, GenesisConfig};
use tracing::{debug, info, warn};

use crate::domain::{BlockOutcome, ChainOutcome, IgnoreReason, RejectReason, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsensusResolver {
    difficulty: usize,
}

impl ConsensusResolver {
    pub fn new(difficulty: usize) -> Self {
        Self { difficulty }
    }

    pub fn from_genesis(genesis: &GenesisConfig) -> Self {
        Self::new(genesis.params.difficulty)
    }

    pub fn difficulty(&self) -> usize {
        self.difficulty
    }

    /// Run every acceptance check without touching the ledger.
    pub fn validate_block(&self, store: &LedgerStore, block: &Block) -> std::result::Result<(), RejectReason> {
        let tip = store.latest();
        let expected = tip.index + 1;

        if block.index < expected {
            if store.block_by_hash(&block.hash).is_some() {
                return Err(RejectReason::AlreadyKnown { index: block.index });
            }
            return Err(RejectReason::Stale {
                index: block.index,
                tip: tip.index,
            });
        }
        if block.index > expected {
            return Err(RejectReason::Ahead {
                index: block.index,
                expected,
            });
        }
        if block.previous_hash != tip.hash {
            return Err(RejectReason::Fork {
                index: block.index,
                previous_hash: block.previous_hash.clone(),
            });
        }
        verify_seal(block, self.difficulty).map_err(|source| RejectReason::Seal {
            index: block.index,
            source,
        })?;

        if let Some(tx) = block.transactions.iter().find(|tx| store.contains_transaction(&tx.id)) {
            return Err(RejectReason::Invalid {
                index: block.index,
                source: ChainLinkError::DuplicateTransaction(tx.id.clone()),
            });
        }
        store
            .executor()
            .execute(store.state(), block)
            .map(|_| ())
            .map_err(|source| RejectReason::Invalid {
                index: block.index,
                source: ChainLinkError::Execution {
                    index: block.index,
                    source,
                },
            })
    }

    /// Validate a peer block and append it if it extends the tip.
    pub fn accept_block(&self, store: &mut LedgerStore, block: Block) -> Result<BlockOutcome> {
        if let Err(reason) = self.validate_block(store, &block) {
            log_rejection(&block, &reason);
            return Ok(BlockOutcome::Rejected(reason));
        }

        let (index, hash) = (block.index, block.hash.clone());
        store.append(block)?;
        info!(block_height = index, block_hash = %hash, "Accepted block");
        Ok(BlockOutcome::Accepted { index, hash })
    }

    /// Adopt `blocks` if it is a strictly longer valid chain from our genesis.
    pub fn accept_chain(&self, store: &mut LedgerStore, blocks: Vec<Block>) -> Result<ChainOutcome> {
        let verdict = self.check_chain(store, &blocks);
        if let Err(reason) = verdict {
            debug!(candidate_len = blocks.len(), local_len = store.chain().len(), %reason, "Ignoring candidate chain");
            return Ok(ChainOutcome::Ignored(reason));
        }

        let candidate = match store.build_candidate(blocks) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(error = %e, "Candidate chain failed replay");
                return Ok(ChainOutcome::Ignored(IgnoreReason::Invalid(e)));
            }
        };
        let report = store.replace_chain(candidate)?;
        Ok(ChainOutcome::Replaced(report))
    }

    fn check_chain(&self, store: &LedgerStore, blocks: &[Block]) -> std::result::Result<(), IgnoreReason> {
        let first = blocks.first().ok_or(IgnoreReason::Empty)?;
        let local = store.chain().len();
        if blocks.len() <= local {
            return Err(IgnoreReason::NotLonger {
                local,
                candidate: blocks.len(),
            });
        }
        if first.hash != store.genesis_hash() {
            return Err(IgnoreReason::GenesisMismatch {
                expected: store.genesis_hash().to_string(),
                got: first.hash.clone(),
            });
        }
        for block in blocks {
            verify_seal(block, self.difficulty).map_err(|source| IgnoreReason::Seal {
                index: block.index,
                source,
            })?;
        }
        Ok(())
    }
}

fn log_rejection(block: &Block, reason: &RejectReason) {
    if reason.is_cryptographic() {
        warn!(block_height = block.index, block_hash = %block.hash, signer = %block.signer_id, %reason, "Rejected block");
    } else if reason.requires_sync() {
        info!(block_height = block.index, block_hash = %block.hash, %reason, "Block does not extend tip, sync needed");
    } else {
        debug!(block_height = block.index, block_hash = %block.hash, %reason, "Rejected block");
    }
}
