//! Shared fixtures for the scenarios.

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use node_runtime::{NodeConfig, NodeContainer, NodeRuntime};
use oe_02_ledger_store::LedgerStore;
use oe_03_chain_builder::{BuilderConfig, ChainBuilder, MiningJob};
use shared_crypto::NodeIdentity;
use shared_types::{Block, GenesisConfig, Transaction, TransactionKind, TransactionType};

/// Genesis with a single funded wallet and cheap proof of work.
pub fn alice_genesis() -> GenesisConfig {
    let mut config = GenesisConfig::default();
    config.initial_balances.clear();
    config.initial_balances.insert("wallet_alice".into(), 1_000_000.0);
    config.params.difficulty = 1;
    config
}

pub fn tx(tx_type: TransactionType, sender: &str, receiver: &str, amount: f64) -> Transaction {
    Transaction::new(TransactionKind::from_parts(tx_type, sender, receiver, amount))
}

/// Mines blocks directly against a store, without a running node.
pub struct TestMiner {
    pub identity: NodeIdentity,
    builder: ChainBuilder,
}

impl TestMiner {
    pub fn new(store: &LedgerStore, seed: u8) -> Self {
        let builder = ChainBuilder::new(
            store.validator().clone(),
            BuilderConfig {
                difficulty: store.genesis().params.difficulty,
                max_transactions_per_block: 100,
            },
        );
        Self {
            identity: NodeIdentity::from_seed([seed; 32]),
            builder,
        }
    }

    /// Mine `pending` on top of `store`'s tip without appending.
    pub fn mine(&self, store: &LedgerStore, pending: Vec<Transaction>) -> Block {
        let job = MiningJob {
            parent: store.latest().clone(),
            state: store.state().clone(),
            pending,
        };
        self.builder
            .mine(job, &self.identity, &AtomicBool::new(false))
            .expect("mining cannot fail at test difficulty")
            .block
    }

    /// Mine and append.
    pub fn extend(&self, store: &mut LedgerStore, pending: Vec<Transaction>) -> Block {
        let block = self.mine(store, pending);
        store.append(block.clone()).expect("freshly mined block appends");
        block
    }
}

/// Configuration for a node rooted in `dir`, listening on an ephemeral port.
pub fn node_config(dir: &Path, label: &str) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.network.port = 0;
    config.network.sync_interval_secs = 1;
    config.network.request_timeout_ms = 1_000;
    config.identity.key_dir = dir.join(label).join("keys");
    config.identity.node_id = label.to_string();
    config.storage.data_dir = dir.join(label).join("data");
    config.mining.interval_ms = 50;
    config
}

pub async fn launch(config: NodeConfig, genesis: GenesisConfig) -> NodeRuntime {
    let container = NodeContainer::with_genesis(config, genesis).expect("container builds");
    NodeRuntime::launch(container).await.expect("node launches")
}

/// Poll `check` every 50 ms until it holds or `within` elapses.
pub async fn eventually(within: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
