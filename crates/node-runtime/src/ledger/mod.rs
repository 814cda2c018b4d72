//! # Ledger Writer
//!
//! The node's single point of mutation. One task owns every write to the
//! [`LedgerStore`](oe_02_ledger_store::LedgerStore) and the pending pool;
//! everything else sends it a [`LedgerCommand`] and reads through a shared
//! `RwLock`.
//!
//! ```text
//!  API caller ──┐                           ┌──> RwLock<LedgerStore> <── readers
//!  peer sync  ──┼──> mpsc<LedgerCommand> ──>│
//!  miner      ──┘      (LedgerWriter)       └──> broadcast<LedgerEvent> ──> gossip relay
//! ```
//!
//! A chain swap takes the write lock for its whole duration, so readers see
//! either the old chain or the new one.

mod actor;
mod error;
mod handle;
mod signal;

pub use actor::{LedgerCommand, LedgerEvent, LedgerWriter, Origin};
pub use error::{LedgerError, SubmitError};
pub use handle::LedgerHandle;
pub use signal::MiningSignal;

use oe_02_ledger_store::LedgerStore;
use oe_03_chain_builder::PendingPool;
use parking_lot::{Mutex, RwLock};

/// State shared between the writer and its readers.
#[derive(Debug)]
pub struct LedgerShared {
    pub store: RwLock<LedgerStore>,
    pub pool: Mutex<PendingPool>,
}

/// Create the writer and a handle to it.
///
/// Pending transactions persisted by a previous run are reloaded into the pool.
pub fn spawn_parts(
    store: LedgerStore,
    pool_capacity: usize,
    signal: std::sync::Arc<MiningSignal>,
) -> (LedgerWriter, LedgerHandle) {
    let mut pool = PendingPool::new(pool_capacity);
    match store.pending_transactions() {
        Ok(pending) => {
            for tx in pending {
                if let Err(e) = pool.insert(tx) {
                    tracing::warn!(error = %e, "Persisted pending transaction not restored");
                }
            }
        }
        Err(e) => tracing::warn!(error = %e, "Could not read persisted pending transactions"),
    }

    let shared = std::sync::Arc::new(LedgerShared {
        store: RwLock::new(store),
        pool: Mutex::new(pool),
    });
    LedgerWriter::new(shared, signal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use oe_03_chain_builder::BuilderConfig;
    use oe_04_consensus::BlockOutcome;
    use oe_05_peer_sync::{BlockVerdict, LedgerGateway};
    use shared_crypto::NodeIdentity;
    use shared_types::{GenesisConfig, Transaction, TransactionKind, TransactionType};
    use tokio::sync::watch;

    use crate::mining::Miner;

    fn genesis() -> GenesisConfig {
        let mut config = GenesisConfig::default();
        config.initial_balances.clear();
        config.initial_balances.insert("wallet_alice".into(), 1_000_000.0);
        config.params.difficulty = 1;
        config
    }

    struct Harness {
        handle: LedgerHandle,
        miner: Miner,
        signal: Arc<MiningSignal>,
        _shutdown: watch::Sender<bool>,
    }

    fn start() -> Harness {
        let signal = Arc::new(MiningSignal::new());
        let store = LedgerStore::new(genesis()).unwrap();
        let (writer, handle) = spawn_parts(store, 100, Arc::clone(&signal));
        let (shutdown, rx) = watch::channel(false);
        tokio::spawn(writer.run(rx));
        let miner = Miner::new(
            handle.clone(),
            BuilderConfig {
                difficulty: 1,
                max_transactions_per_block: 100,
            },
            Arc::new(NodeIdentity::from_seed([7; 32])),
            Arc::clone(&signal),
            Duration::from_millis(10),
        );
        Harness {
            handle,
            miner,
            signal,
            _shutdown: shutdown,
        }
    }

    #[tokio::test]
    async fn test_recorded_transfer_is_mined() {
        let h = start();
        assert!(
            h.handle
                .record_transaction("wallet_alice", "wallet_bob", 500.0, TransactionType::Transfer, None, None)
                .await
        );
        assert_eq!(h.handle.pending_count(), 1);
        // Pending transactions do not move balances.
        assert_eq!(h.handle.get_balance("wallet_bob"), 0.0);

        let block = h.miner.mine_once().await.unwrap().expect("a block");
        assert_eq!(block.index, 1);
        assert_eq!(h.handle.chain_height(), 1);
        assert_eq!(h.handle.get_balance("wallet_alice"), 999_500.0);
        assert_eq!(h.handle.get_balance("wallet_bob"), 500.0);
        assert_eq!(h.handle.pending_count(), 0);
        assert_eq!(h.handle.get_transaction_history(Some("wallet_bob")).len(), 1);
        h.handle.verify_integrity().unwrap();
    }

    #[tokio::test]
    async fn test_overdraw_is_refused_at_submission() {
        let h = start();
        let tx = Transaction::new(TransactionKind::from_parts(
            TransactionType::Transfer,
            "wallet_alice",
            "wallet_carol",
            2_000_000.0,
        ));
        let err = h.handle.submit_transaction(tx).await.unwrap_err();
        assert!(matches!(err, SubmitError::Invalid(_)));
        assert_eq!(h.handle.pending_count(), 0);
        assert_eq!(h.miner.mine_once().await.unwrap(), None);
        assert_eq!(h.handle.chain_height(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_submission_refused() {
        let h = start();
        let tx = Transaction::new(TransactionKind::from_parts(
            TransactionType::Transfer,
            "wallet_alice",
            "wallet_bob",
            1.0,
        ));
        h.handle.submit_transaction(tx.clone()).await.unwrap();
        assert!(matches!(
            h.handle.submit_transaction(tx.clone()).await,
            Err(SubmitError::Duplicate(_))
        ));
        assert!(!LedgerGateway::submit_transaction(&h.handle, tx).await);
    }

    #[tokio::test]
    async fn test_peer_block_gateway_verdicts() {
        let producer = start();
        let follower = start();
        producer
            .handle
            .record_transaction("wallet_alice", "wallet_bob", 10.0, TransactionType::Transfer, None, None)
            .await;
        let b1 = producer.miner.mine_once().await.unwrap().unwrap();
        producer
            .handle
            .record_transaction("wallet_alice", "wallet_bob", 10.0, TransactionType::Transfer, None, None)
            .await;
        let b2 = producer.miner.mine_once().await.unwrap().unwrap();

        assert!(follower.handle.validate_block(&b1));
        assert!(!follower.handle.validate_block(&b2));
        assert_eq!(follower.handle.submit_block(b2.clone()).await, BlockVerdict::NeedsSync);
        assert!(follower.handle.add_block_from_peer(b1.clone()).await);
        assert_eq!(follower.handle.submit_block(b1).await, BlockVerdict::Known);
        assert_eq!(follower.handle.submit_block(b2).await, BlockVerdict::Accepted);
        assert_eq!(follower.handle.get_balance("wallet_bob"), 20.0);
    }

    #[tokio::test]
    async fn test_peer_block_cancels_mining_at_same_height() {
        let h = start();
        let flag = h.signal.begin(1);

        let other = start();
        other
            .handle
            .record_transaction("wallet_alice", "wallet_bob", 1.0, TransactionType::Transfer, None, None)
            .await;
        let block = other.miner.mine_once().await.unwrap().unwrap();

        let outcome = h.handle.submit_peer_block(block).await.unwrap();
        assert!(matches!(outcome, BlockOutcome::Accepted { index: 1, .. }));
        assert!(flag.load(std::sync::atomic::Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_local_transactions_are_announced() {
        let h = start();
        let mut events = h.handle.subscribe();
        h.handle
            .record_transaction("wallet_alice", "wallet_bob", 3.0, TransactionType::Transfer, Some("burn-7".into()), None)
            .await;
        match events.recv().await.unwrap() {
            LedgerEvent::TransactionRecorded(tx) => assert_eq!(tx.reference_id.as_deref(), Some("burn-7")),
            other => panic!("unexpected event {other:?}"),
        }

        // Peer transactions are already being flooded and are not re-announced.
        let peer_tx = Transaction::new(TransactionKind::from_parts(
            TransactionType::Transfer,
            "wallet_alice",
            "wallet_dave",
            1.0,
        ));
        assert!(LedgerGateway::submit_transaction(&h.handle, peer_tx).await);
        h.miner.mine_once().await.unwrap().unwrap();
        assert!(matches!(events.recv().await.unwrap(), LedgerEvent::BlockMined(_)));
    }

    #[tokio::test]
    async fn test_stopped_writer_reports_unavailable() {
        let signal = Arc::new(MiningSignal::new());
        let (writer, handle) = spawn_parts(LedgerStore::new(genesis()).unwrap(), 10, signal);
        drop(writer);
        let tx = Transaction::new(TransactionKind::from_parts(
            TransactionType::Transfer,
            "wallet_alice",
            "wallet_bob",
            1.0,
        ));
        assert!(matches!(
            handle.submit_transaction(tx).await,
            Err(SubmitError::Unavailable)
        ));
        // Reads keep working.
        assert_eq!(handle.get_balance("wallet_alice"), 1_000_000.0);
    }
}
