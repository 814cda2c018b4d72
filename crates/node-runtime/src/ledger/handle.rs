//! The ledger's external interface.

use std::sync::Arc;

use async_trait::async_trait;
use oe_02_ledger_store::{IntegrityError, TransactionRecord};
use oe_03_chain_builder::{MinedBlock, MiningJob};
use oe_04_consensus::{BlockOutcome, ChainOutcome, ConsensusResolver, RejectReason};
use oe_05_peer_sync::{BlockVerdict, ChainVerdict, LedgerGateway};
use shared_types::{Address, Block, BlockHash, Transaction, TransactionKind, TransactionType};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

use super::actor::{LedgerCommand, LedgerEvent, Origin};
use super::{LedgerError, LedgerShared, SubmitError};

/// Cloneable access to the ledger: reads go straight to the shared store,
/// writes are queued to the [`LedgerWriter`](super::LedgerWriter).
#[derive(Clone)]
pub struct LedgerHandle {
    shared: Arc<LedgerShared>,
    commands: mpsc::Sender<LedgerCommand>,
    events: broadcast::Sender<LedgerEvent>,
    resolver: ConsensusResolver,
    genesis_hash: BlockHash,
}

impl std::fmt::Debug for LedgerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerHandle")
            .field("genesis_hash", &self.genesis_hash)
            .finish_non_exhaustive()
    }
}

impl LedgerHandle {
    pub(super) fn new(
        shared: Arc<LedgerShared>,
        commands: mpsc::Sender<LedgerCommand>,
        events: broadcast::Sender<LedgerEvent>,
        resolver: ConsensusResolver,
        genesis_hash: BlockHash,
    ) -> Self {
        Self {
            shared,
            commands,
            events,
            resolver,
            genesis_hash,
        }
    }

    /// Events the network layer must propagate.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    async fn call<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> LedgerCommand) -> Option<R> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).await.ok()?;
        response.await.ok()
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Record a transaction for inclusion in a future block.
    ///
    /// Returns `true` when it was admitted to the pending pool. The reason
    /// for a refusal is logged; use [`LedgerHandle::submit_transaction`] to
    /// receive it.
    pub async fn record_transaction(
        &self,
        sender: &str,
        receiver: &str,
        amount: f64,
        tx_type: TransactionType,
        reference_id: Option<String>,
        description: Option<String>,
    ) -> bool {
        let tx = Transaction::new(TransactionKind::from_parts(tx_type, sender, receiver, amount))
            .with_reference(reference_id)
            .with_description(description);
        match self.submit_transaction(tx).await {
            Ok(_) => true,
            Err(e) => {
                warn!(%sender, %receiver, amount, %tx_type, error = %e, "Transaction not recorded");
                false
            }
        }
    }

    /// Submit a locally created transaction. It is gossiped once admitted.
    pub async fn submit_transaction(&self, tx: Transaction) -> Result<Transaction, SubmitError> {
        let submitted = tx.clone();
        self.call(|reply| LedgerCommand::SubmitTransaction {
            tx,
            origin: Origin::Local,
            reply,
        })
        .await
        .ok_or(SubmitError::Unavailable)??;
        Ok(submitted)
    }

    /// Append a block received from a peer. `true` if it extended the chain.
    pub async fn add_block_from_peer(&self, block: Block) -> bool {
        matches!(self.submit_peer_block(block).await, Ok(BlockOutcome::Accepted { .. }))
    }

    pub async fn submit_peer_block(&self, block: Block) -> Result<BlockOutcome, LedgerError> {
        let outcome = self
            .call(|reply| LedgerCommand::SubmitPeerBlock { block, reply })
            .await
            .ok_or(LedgerError::Unavailable)??;
        Ok(outcome)
    }

    /// Hand a freshly mined block to the writer.
    pub async fn submit_mined_block(&self, mined: MinedBlock) -> Result<BlockOutcome, LedgerError> {
        let outcome = self
            .call(|reply| LedgerCommand::SubmitMinedBlock { mined, reply })
            .await
            .ok_or(LedgerError::Unavailable)??;
        Ok(outcome)
    }

    /// Offer a complete chain for longest-chain resolution.
    pub async fn submit_peer_chain(&self, blocks: Vec<Block>) -> Result<ChainOutcome, LedgerError> {
        let outcome = self
            .call(|reply| LedgerCommand::SubmitChain { blocks, reply })
            .await
            .ok_or(LedgerError::Unavailable)??;
        Ok(outcome)
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// `true` if `block` would be appended right now.
    pub fn validate_block(&self, block: &Block) -> bool {
        self.resolver.validate_block(&self.shared.store.read(), block).is_ok()
    }

    pub fn get_balance(&self, address: &str) -> f64 {
        self.shared.store.read().balance_of(address)
    }

    pub fn get_stake_balance(&self, address: &str) -> f64 {
        self.shared.store.read().stake_of(address)
    }

    /// Confirmed transactions, oldest first, optionally only those involving `address`.
    pub fn get_transaction_history(&self, address: Option<&str>) -> Vec<TransactionRecord> {
        self.shared.store.read().transaction_history(address)
    }

    pub fn chain_height(&self) -> u64 {
        self.shared.store.read().height()
    }

    pub fn latest_block(&self) -> Block {
        self.shared.store.read().latest().clone()
    }

    pub fn block_at(&self, index: u64) -> Option<Block> {
        self.shared.store.read().block_at(index).cloned()
    }

    pub fn total_supply(&self) -> f64 {
        self.shared.store.read().total_supply()
    }

    pub fn is_validator(&self, address: &str) -> bool {
        self.shared.store.read().is_validator(address)
    }

    pub fn validators(&self) -> Vec<(Address, f64)> {
        self.shared.store.read().validators()
    }

    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        self.shared.store.read().verify_integrity()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pool.lock().len()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.shared.pool.lock().snapshot(usize::MAX)
    }

    pub fn genesis_hash(&self) -> &str {
        &self.genesis_hash
    }

    /// Snapshot of everything the miner needs, or `None` when nothing is pending.
    pub fn mining_job(&self, limit: usize) -> Option<MiningJob> {
        let store = self.shared.store.read();
        let pending = self.shared.pool.lock().snapshot(limit);
        if pending.is_empty() {
            return None;
        }
        Some(MiningJob {
            parent: store.latest().clone(),
            state: store.state().clone(),
            pending,
        })
    }

    /// Validator used for admission, for building blocks off the writer.
    pub fn validator(&self) -> oe_01_state_machine::TransactionValidator {
        self.shared.store.read().validator().clone()
    }
}

#[async_trait]
impl LedgerGateway for LedgerHandle {
    async fn height(&self) -> u64 {
        self.chain_height()
    }

    async fn tip_hash(&self) -> BlockHash {
        self.shared.store.read().latest().hash.clone()
    }

    fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash.clone()
    }

    async fn chain(&self) -> Vec<Block> {
        self.shared.store.read().chain().to_vec()
    }

    async fn submit_block(&self, block: Block) -> BlockVerdict {
        match self.submit_peer_block(block).await {
            Ok(BlockOutcome::Accepted { .. }) => BlockVerdict::Accepted,
            Ok(BlockOutcome::Rejected(reason)) if reason.requires_sync() => BlockVerdict::NeedsSync,
            Ok(BlockOutcome::Rejected(RejectReason::AlreadyKnown { .. } | RejectReason::Stale { .. })) => {
                BlockVerdict::Known
            }
            Ok(BlockOutcome::Rejected(reason)) => BlockVerdict::Rejected(reason.to_string()),
            Err(e) => BlockVerdict::Rejected(e.to_string()),
        }
    }

    async fn submit_chain(&self, blocks: Vec<Block>) -> ChainVerdict {
        match self.submit_peer_chain(blocks).await {
            Ok(ChainOutcome::Replaced(report)) => ChainVerdict::Replaced {
                height: report.new_height,
            },
            Ok(ChainOutcome::Ignored(reason)) => ChainVerdict::Ignored(reason.to_string()),
            Err(e) => ChainVerdict::Ignored(e.to_string()),
        }
    }

    async fn submit_transaction(&self, tx: Transaction) -> bool {
        let result = self
            .call(|reply| LedgerCommand::SubmitTransaction {
                tx,
                origin: Origin::Peer,
                reply,
            })
            .await;
        matches!(result, Some(Ok(())))
    }
}
