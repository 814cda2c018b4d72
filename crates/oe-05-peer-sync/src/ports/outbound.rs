//! Driven ports: the network and the local ledger.

use async_trait::async_trait;
use shared_types::{Block, BlockHash, Transaction, WireMessage};

use crate::error::Result;

/// Point-to-point delivery of envelopes to `host:port` addresses.
#[async_trait]
pub trait PeerTransport: Send + Sync + 'static {
    /// Deliver without waiting for an answer.
    async fn send(&self, address: &str, message: &WireMessage) -> Result<()>;

    /// Deliver and wait for exactly one answer.
    async fn request(&self, address: &str, message: &WireMessage) -> Result<WireMessage>;
}

/// What happened to a block handed to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockVerdict {
    Accepted,
    /// Already on the chain, or below the tip.
    Known,
    /// Does not extend the tip; the sender is ahead or on a fork.
    NeedsSync,
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    Replaced { height: u64 },
    Ignored(String),
}

/// The node's ledger as seen from the network layer.
#[async_trait]
pub trait LedgerGateway: Send + Sync + 'static {
    async fn height(&self) -> u64;

    async fn tip_hash(&self) -> BlockHash;

    fn genesis_hash(&self) -> BlockHash;

    async fn chain(&self) -> Vec<Block>;

    async fn submit_block(&self, block: Block) -> BlockVerdict;

    async fn submit_chain(&self, blocks: Vec<Block>) -> ChainVerdict;

    /// Returns `true` when the transaction was new and admissible.
    async fn submit_transaction(&self, tx: Transaction) -> bool;
}
