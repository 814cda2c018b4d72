//! # Block Production
//!
//! The miner wakes on an interval, snapshots the pending pool, and runs the
//! proof-of-work search on the blocking thread pool so peer traffic is never
//! starved. The attempt is registered with the [`MiningSignal`]; if a peer
//! block fills the same height first, the search stops at its next nonce.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ledger_telemetry::MINING_DURATION;
use oe_03_chain_builder::{BuildError, BuilderConfig, ChainBuilder};
use oe_04_consensus::BlockOutcome;
use shared_crypto::NodeIdentity;
use shared_types::Block;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::ledger::{LedgerError, LedgerHandle, MiningSignal};

#[derive(Debug, Error)]
pub enum MiningError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Mining task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub struct Miner {
    ledger: LedgerHandle,
    builder: Arc<ChainBuilder>,
    identity: Arc<NodeIdentity>,
    signal: Arc<MiningSignal>,
    interval: Duration,
}

impl Miner {
    pub fn new(
        ledger: LedgerHandle,
        config: BuilderConfig,
        identity: Arc<NodeIdentity>,
        signal: Arc<MiningSignal>,
        interval: Duration,
    ) -> Self {
        let builder = Arc::new(ChainBuilder::new(ledger.validator(), config));
        Self {
            ledger,
            builder,
            identity,
            signal,
            interval,
        }
    }

    /// Mine one block from the current pool.
    ///
    /// `Ok(None)` when nothing is pending, when the attempt was cancelled, or
    /// when the ledger moved on before the block could be appended.
    pub async fn mine_once(&self) -> Result<Option<Block>, MiningError> {
        let limit = self.builder.config().max_transactions_per_block;
        let Some(job) = self.ledger.mining_job(limit) else {
            return Ok(None);
        };
        let height = job.parent.index + 1;
        let cancel = self.signal.begin(height);

        let builder = Arc::clone(&self.builder);
        let identity = Arc::clone(&self.identity);
        let started = Instant::now();
        let result = tokio::task::spawn_blocking(move || builder.mine(job, identity.as_ref(), &cancel)).await;
        self.signal.finish();
        MINING_DURATION.observe(started.elapsed().as_secs_f64());

        let mined = match result? {
            Ok(mined) => mined,
            Err(BuildError::Cancelled { nonce }) => {
                debug!(block_height = height, nonce, "Height filled by a peer, mining abandoned");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        let block = mined.block.clone();
        match self.ledger.submit_mined_block(mined).await? {
            BlockOutcome::Accepted { .. } => Ok(Some(block)),
            BlockOutcome::Rejected(reason) => {
                info!(block_height = height, %reason, "Mined block superseded before append");
                Ok(None)
            }
        }
    }

    /// Mine until shutdown.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Miner started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.mine_once().await {
                        warn!(error = %e, "Mining attempt failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.signal.cancel_all();
                        break;
                    }
                }
            }
        }
        info!("Miner stopped");
    }
}
