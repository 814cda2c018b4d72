//! # Node Runtime
//!
//! Wires the container's subsystems into running tasks.
//!
//! ## Startup Sequence
//!
//! 1. Spawn the ledger writer
//! 2. Bind the peer listener and build the sync service on the bound address
//! 3. Handshake with seed nodes, then start height reconciliation
//! 4. Start the gossip relay and, if enabled, the miner

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ledger_telemetry::{GOSSIP_BAD_SIGNATURES, GOSSIP_DEDUPLICATED, PEERS_KNOWN};
use oe_03_chain_builder::{BuilderConfig, DEFAULT_POOL_CAPACITY};
use oe_05_peer_sync::{MessageHandler, PeerSyncService, TcpTransport};
use shared_crypto::{IdentityProvider, NodeIdentity};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::container::{NodeConfig, NodeContainer};
use crate::ledger::{spawn_parts, LedgerEvent, LedgerHandle, MiningSignal};
use crate::mining::Miner;

/// How long shutdown waits for each task.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// The peer sync service as the runtime runs it.
pub type NodeSync = PeerSyncService<TcpTransport, LedgerHandle>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Cannot listen on {address}: {reason}")]
    Bind { address: String, reason: String },
}

/// A started node.
pub struct NodeRuntime {
    config: NodeConfig,
    identity: Arc<NodeIdentity>,
    ledger: LedgerHandle,
    sync: Arc<NodeSync>,
    signal: Arc<MiningSignal>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl NodeRuntime {
    /// Start every task of the node.
    pub async fn launch(container: NodeContainer) -> Result<Self, RuntimeError> {
        let NodeContainer {
            mut config,
            identity,
            store,
            ..
        } = container;

        info!("===========================================");
        info!("  Orbis Ethica Ledger Node v{}", env!("CARGO_PKG_VERSION"));
        info!("===========================================");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signal = Arc::new(MiningSignal::new());
        let difficulty = store.genesis().params.difficulty;
        let (writer, ledger) = spawn_parts(store, DEFAULT_POOL_CAPACITY, Arc::clone(&signal));
        let mut tasks = vec![("ledger-writer", tokio::spawn(writer.run(shutdown_rx.clone())))];

        let bind_address = format!("{}:{}", config.network.host, config.network.port);
        let listener = TcpListener::bind(&bind_address).await.map_err(|e| RuntimeError::Bind {
            address: bind_address.clone(),
            reason: e.to_string(),
        })?;
        let local_addr = listener.local_addr().map_err(|e| RuntimeError::Bind {
            address: bind_address,
            reason: e.to_string(),
        })?;
        // Port 0 binds an ephemeral port; peers must be told the real one.
        config.network.port = local_addr.port();

        let sync = Arc::new(PeerSyncService::new(
            config.network.sync_config(),
            Arc::clone(&identity) as Arc<dyn IdentityProvider>,
            Arc::new(TcpTransport),
            ledger.clone(),
        ));

        let handler = Arc::clone(&sync) as Arc<dyn MessageHandler>;
        let listen_shutdown = shutdown_rx.clone();
        tasks.push((
            "peer-listener",
            tokio::spawn(async move {
                if let Err(e) = oe_05_peer_sync::adapters::serve(listener, handler, listen_shutdown).await {
                    error!(error = %e, "Peer listener failed");
                }
            }),
        ));

        let seeds = config.network.seed_nodes.clone();
        let sync_task = Arc::clone(&sync);
        let sync_shutdown = shutdown_rx.clone();
        tasks.push((
            "peer-sync",
            tokio::spawn(async move {
                let connected = sync_task.bootstrap(&seeds).await;
                info!(seeds = seeds.len(), connected, "Bootstrap finished");
                sync_task.periodic_sync(sync_shutdown).await;
            }),
        ));

        tasks.push((
            "gossip-relay",
            tokio::spawn(relay_events(Arc::clone(&sync), ledger.subscribe(), shutdown_rx.clone())),
        ));

        tasks.push((
            "peer-metrics",
            tokio::spawn(report_peer_metrics(
                Arc::clone(&sync),
                Duration::from_secs(config.network.sync_interval_secs),
                shutdown_rx.clone(),
            )),
        ));

        if config.mining.enabled {
            let miner = Miner::new(
                ledger.clone(),
                BuilderConfig {
                    difficulty,
                    max_transactions_per_block: config.mining.max_transactions_per_block,
                },
                Arc::clone(&identity),
                Arc::clone(&signal),
                Duration::from_millis(config.mining.interval_ms),
            );
            tasks.push(("miner", tokio::spawn(miner.run(shutdown_rx.clone()))));
        } else {
            info!("Mining disabled");
        }

        info!(
            node_id = %identity.node_id(),
            address = %local_addr,
            height = ledger.chain_height(),
            "Node is running"
        );

        Ok(Self {
            config,
            identity,
            ledger,
            sync,
            signal,
            local_addr,
            shutdown_tx,
            tasks,
        })
    }

    pub fn ledger(&self) -> &LedgerHandle {
        &self.ledger
    }

    pub fn sync(&self) -> &Arc<NodeSync> {
        &self.sync
    }

    pub fn node_id(&self) -> String {
        self.identity.node_id()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Address peers reach this node on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop every task and wait for them to finish.
    ///
    /// ## Shutdown Sequence
    ///
    /// 1. Cancel any in-flight mining attempt
    /// 2. Signal shutdown to all tasks
    /// 3. Wait for each task (bounded)
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        self.signal.cancel_all();
        if self.shutdown_tx.send(true).is_err() {
            warn!("All tasks already stopped");
        }
        for (name, task) in self.tasks {
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(task = name, error = %e, "Task ended abnormally"),
                Err(_) => warn!(task = name, "Task did not stop in time"),
            }
        }
        info!("Shutdown complete");
    }
}

/// Gossip locally recorded transactions and locally mined blocks.
async fn relay_events(
    sync: Arc<NodeSync>,
    mut events: broadcast::Receiver<LedgerEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = events.recv() => {
                let result = match event {
                    Ok(LedgerEvent::TransactionRecorded(tx)) => sync.broadcast_transaction(&tx).await,
                    Ok(LedgerEvent::BlockMined(block)) => sync.broadcast_block(&block).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Gossip relay lagged, events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if let Err(e) = result {
                    warn!(error = %e, "Gossip broadcast failed");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn report_peer_metrics(sync: Arc<NodeSync>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = sync.stats();
                PEERS_KNOWN.set(sync.known_peers().len() as f64);
                GOSSIP_DEDUPLICATED.set(stats.deduplicated as f64);
                GOSSIP_BAD_SIGNATURES.set(stats.bad_signatures as f64);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}
