use std::sync::Arc;

use chrono::Utc;
use ledger_telemetry::{
    metric_inc, BLOCKS_ACCEPTED, BLOCKS_MINED, BLOCKS_REJECTED, CHAIN_HEIGHT, CHAIN_REPLACEMENTS,
    PENDING_TRANSACTIONS, TRANSACTIONS_REJECTED, TRANSACTIONS_SUBMITTED,
};
use oe_03_chain_builder::MinedBlock;
use oe_04_consensus::{BlockOutcome, ChainOutcome, ConsensusError, ConsensusResolver, RejectReason};
use shared_types::{Block, Transaction};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::{LedgerHandle, LedgerShared, MiningSignal, SubmitError};

const COMMAND_QUEUE: usize = 1_024;
const EVENT_QUEUE: usize = 256;

/// Where a transaction came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Recorded through the local API; must be gossiped.
    Local,
    /// Received from a peer, which is already flooding it.
    Peer,
}

/// Mutations the writer performs, one at a time.
#[derive(Debug)]
pub enum LedgerCommand {
    SubmitTransaction {
        tx: Transaction,
        origin: Origin,
        reply: oneshot::Sender<Result<(), SubmitError>>,
    },
    SubmitPeerBlock {
        block: Block,
        reply: oneshot::Sender<Result<BlockOutcome, ConsensusError>>,
    },
    SubmitMinedBlock {
        mined: MinedBlock,
        reply: oneshot::Sender<Result<BlockOutcome, ConsensusError>>,
    },
    SubmitChain {
        blocks: Vec<Block>,
        reply: oneshot::Sender<Result<ChainOutcome, ConsensusError>>,
    },
}

/// Things the rest of the node must tell the network about.
#[derive(Debug, Clone)]
pub enum LedgerEvent {
    TransactionRecorded(Transaction),
    BlockMined(Block),
}

/// The single ledger writer task.
pub struct LedgerWriter {
    shared: Arc<LedgerShared>,
    resolver: ConsensusResolver,
    signal: Arc<MiningSignal>,
    commands: mpsc::Receiver<LedgerCommand>,
    events: broadcast::Sender<LedgerEvent>,
}

impl LedgerWriter {
    pub(super) fn new(shared: Arc<LedgerShared>, signal: Arc<MiningSignal>) -> (Self, LedgerHandle) {
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (events, _) = broadcast::channel(EVENT_QUEUE);
        let (resolver, genesis_hash) = {
            let store = shared.store.read();
            (ConsensusResolver::from_genesis(store.genesis()), store.genesis_hash().to_string())
        };
        let handle = LedgerHandle::new(Arc::clone(&shared), command_tx, events.clone(), resolver, genesis_hash);
        let writer = Self {
            shared,
            resolver,
            signal,
            commands,
            events,
        };
        writer.refresh_gauges();
        (writer, handle)
    }

    /// Process commands until shutdown or until every handle is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("Ledger writer started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.dispatch(command),
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Ledger writer stopped");
    }

    fn dispatch(&mut self, command: LedgerCommand) {
        // A dropped reply channel means the caller gave up; the work stands.
        match command {
            LedgerCommand::SubmitTransaction { tx, origin, reply } => {
                let _ = reply.send(self.submit_transaction(tx, origin));
            }
            LedgerCommand::SubmitPeerBlock { block, reply } => {
                let _ = reply.send(self.submit_peer_block(block));
            }
            LedgerCommand::SubmitMinedBlock { mined, reply } => {
                let _ = reply.send(self.submit_mined_block(mined));
            }
            LedgerCommand::SubmitChain { blocks, reply } => {
                let _ = reply.send(self.submit_chain(blocks));
            }
        }
        self.refresh_gauges();
    }

    fn submit_transaction(&mut self, tx: Transaction, origin: Origin) -> Result<(), SubmitError> {
        let mut store = self.shared.store.write();
        let mut pool = self.shared.pool.lock();
        if store.contains_transaction(&tx.id) || pool.contains(&tx.id) {
            return Err(SubmitError::Duplicate(tx.id));
        }
        if let Err(e) = store.validator().admit(store.state(), &tx, Utc::now()) {
            warn!(tx_id = %tx.id, tx_type = %tx.tx_type(), rule = e.rule(), error = %e, "Transaction rejected");
            metric_inc!(TRANSACTIONS_REJECTED, &[e.rule()]);
            return Err(e.into());
        }
        pool.insert(tx.clone())?;
        if let Err(e) = store.record_pending(&tx) {
            pool.remove(&tx.id);
            return Err(e.into());
        }
        drop(pool);
        drop(store);

        metric_inc!(TRANSACTIONS_SUBMITTED);
        debug!(tx_id = %tx.id, tx_type = %tx.tx_type(), ?origin, "Transaction pending");
        if origin == Origin::Local {
            // No subscriber just means no network is attached.
            let _ = self.events.send(LedgerEvent::TransactionRecorded(tx));
        }
        Ok(())
    }

    fn submit_peer_block(&mut self, block: Block) -> Result<BlockOutcome, ConsensusError> {
        let outcome = self.accept(block)?;
        if outcome.is_accepted() {
            metric_inc!(BLOCKS_ACCEPTED);
        }
        Ok(outcome)
    }

    fn submit_mined_block(&mut self, mined: MinedBlock) -> Result<BlockOutcome, ConsensusError> {
        let MinedBlock { block, rejected } = mined;
        if !rejected.is_empty() {
            let mut store = self.shared.store.write();
            let mut pool = self.shared.pool.lock();
            for (tx, error) in &rejected {
                metric_inc!(TRANSACTIONS_REJECTED, &[error.rule()]);
                pool.remove(&tx.id);
                if let Err(e) = store.forget_pending(&tx.id) {
                    warn!(tx_id = %tx.id, error = %e, "Could not forget rejected transaction");
                }
            }
        }

        let outcome = self.accept(block.clone())?;
        if outcome.is_accepted() {
            metric_inc!(BLOCKS_MINED);
            let _ = self.events.send(LedgerEvent::BlockMined(block));
        }
        Ok(outcome)
    }

    fn accept(&mut self, block: Block) -> Result<BlockOutcome, ConsensusError> {
        let mut store = self.shared.store.write();
        let outcome = self.resolver.accept_block(&mut store, block.clone())?;
        match &outcome {
            BlockOutcome::Accepted { index, .. } => {
                self.shared.pool.lock().remove_included(&block);
                self.signal.cancel_through(*index);
            }
            BlockOutcome::Rejected(reason) => {
                metric_inc!(BLOCKS_REJECTED, &[reject_label(reason)]);
            }
        }
        Ok(outcome)
    }

    fn submit_chain(&mut self, blocks: Vec<Block>) -> Result<ChainOutcome, ConsensusError> {
        let mut store = self.shared.store.write();
        let outcome = self.resolver.accept_chain(&mut store, blocks)?;
        if let ChainOutcome::Replaced(report) = &outcome {
            metric_inc!(CHAIN_REPLACEMENTS);
            self.signal.cancel_through(report.new_height);

            let mut pool = self.shared.pool.lock();
            for block in &store.chain()[report.fork_index as usize..] {
                pool.remove_included(block);
            }
            for tx in &report.orphaned {
                if let Err(e) = pool.insert(tx.clone()) {
                    debug!(tx_id = %tx.id, error = %e, "Orphaned transaction not re-queued");
                }
            }
            info!(
                old_height = report.old_height,
                new_height = report.new_height,
                requeued = report.orphaned.len(),
                "Adopted longer chain"
            );
        }
        Ok(outcome)
    }

    fn refresh_gauges(&self) {
        CHAIN_HEIGHT.set(self.shared.store.read().height() as f64);
        PENDING_TRANSACTIONS.set(self.shared.pool.lock().len() as f64);
    }
}

fn reject_label(reason: &RejectReason) -> &'static str {
    match reason {
        RejectReason::AlreadyKnown { .. } => "known",
        RejectReason::Stale { .. } => "stale",
        RejectReason::Ahead { .. } => "ahead",
        RejectReason::Fork { .. } => "fork",
        RejectReason::Seal { .. } => "seal",
        RejectReason::Invalid { .. } => "invalid",
    }
}
