//! # Multi-Node Scenarios
//!
//! Real nodes on loopback TCP: one miner, followers seeded with its address.

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use oe_03_chain_builder::{BuilderConfig, ChainBuilder};
    use oe_05_peer_sync::{PeerTransport, TcpTransport};
    use shared_crypto::{IdentityProvider, NodeIdentity};
    use shared_types::{MessageType, TransactionType, WireMessage};
    use tempfile::TempDir;

    use crate::fixtures::{alice_genesis, eventually, launch, node_config};

    const SETTLE: Duration = Duration::from_secs(15);

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_follower_transaction_is_mined_and_replicated() {
        let dir = TempDir::new().unwrap();
        let miner = launch(node_config(dir.path(), "miner"), alice_genesis()).await;

        let mut follower_config = node_config(dir.path(), "follower");
        follower_config.mining.enabled = false;
        follower_config.network.seed_nodes = vec![miner.local_addr().to_string()];
        let follower = launch(follower_config, alice_genesis()).await;

        assert!(eventually(SETTLE, || !miner.sync().known_peers().is_empty()).await);

        let recorded = follower
            .ledger()
            .record_transaction("wallet_alice", "wallet_bob", 500.0, TransactionType::Transfer, None, None)
            .await;
        assert!(recorded);

        assert!(eventually(SETTLE, || miner.ledger().get_balance("wallet_bob") == 500.0).await);
        assert!(eventually(SETTLE, || follower.ledger().get_balance("wallet_bob") == 500.0).await);
        assert!(eventually(SETTLE, || follower.ledger().pending_count() == 0).await);

        assert_eq!(follower.ledger().get_balance("wallet_alice"), 999_500.0);
        assert_eq!(follower.ledger().get_transaction_history(Some("wallet_bob")).len(), 1);
        follower.ledger().verify_integrity().unwrap();

        follower.shutdown().await;
        miner.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_repeated_block_gossip_is_harmless() {
        let dir = TempDir::new().unwrap();
        let mut miner_config = node_config(dir.path(), "miner");
        miner_config.mining.enabled = false;
        let miner = launch(miner_config, alice_genesis()).await;

        let mut follower_config = node_config(dir.path(), "follower");
        follower_config.mining.enabled = false;
        follower_config.network.seed_nodes = vec![miner.local_addr().to_string()];
        let follower = launch(follower_config, alice_genesis()).await;
        assert!(eventually(SETTLE, || !miner.sync().known_peers().is_empty()).await);

        // The mining job needs something pending.
        let recorded = miner
            .ledger()
            .record_transaction("wallet_alice", "wallet_bob", 500.0, TransactionType::Transfer, None, None)
            .await;
        assert!(recorded);
        let job = miner.ledger().mining_job(10).expect("transaction is pending");
        let builder = ChainBuilder::new(
            miner.ledger().validator(),
            BuilderConfig {
                difficulty: 1,
                max_transactions_per_block: 10,
            },
        );
        let identity = NodeIdentity::from_seed([9; 32]);
        let mined = builder.mine(job, &identity, &AtomicBool::new(false)).unwrap();
        let block = mined.block.clone();
        assert!(miner.ledger().submit_mined_block(mined).await.unwrap().is_accepted());

        // One signed envelope, delivered three times over TCP.
        let mut gossip = WireMessage::with_payload(MessageType::GossipBlock, identity.node_id(), &block).unwrap();
        gossip.signature = Some(identity.sign(&gossip.signing_payload().unwrap()));
        let target = follower.local_addr().to_string();
        for _ in 0..3 {
            TcpTransport.send(&target, &gossip).await.unwrap();
        }
        assert!(eventually(SETTLE, || follower.ledger().chain_height() == 1).await);
        assert!(eventually(SETTLE, || follower.sync().stats().deduplicated >= 2).await);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(follower.ledger().chain_height(), 1);
        assert_eq!(follower.ledger().latest_block().hash, block.hash);
        assert_eq!(follower.ledger().get_balance(&identity.node_id()), 5.0);
        assert_eq!(follower.ledger().get_balance("wallet_bob"), 500.0);
        assert_eq!(follower.sync().stats().bad_signatures, 0);
        follower.ledger().verify_integrity().unwrap();

        follower.shutdown().await;
        miner.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_late_joiner_catches_up() {
        let dir = TempDir::new().unwrap();
        let miner = launch(node_config(dir.path(), "miner"), alice_genesis()).await;

        for receiver in ["wallet_bob", "wallet_carol", "wallet_dave"] {
            let recorded = miner
                .ledger()
                .record_transaction("wallet_alice", receiver, 10.0, TransactionType::Transfer, None, None)
                .await;
            assert!(recorded);
            let target = miner.ledger().chain_height() + 1;
            assert!(eventually(SETTLE, || miner.ledger().chain_height() >= target).await);
        }

        let mut late_config = node_config(dir.path(), "late");
        late_config.mining.enabled = false;
        late_config.network.seed_nodes = vec![miner.local_addr().to_string()];
        let late = launch(late_config, alice_genesis()).await;

        let height = miner.ledger().chain_height();
        assert!(height >= 3);
        assert!(eventually(SETTLE, || late.ledger().chain_height() >= height).await);
        assert_eq!(late.ledger().get_balance("wallet_dave"), 10.0);
        assert_eq!(late.ledger().genesis_hash(), miner.ledger().genesis_hash());
        late.ledger().verify_integrity().unwrap();

        late.shutdown().await;
        miner.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_listener() {
        let dir = TempDir::new().unwrap();
        let mut config = node_config(dir.path(), "solo");
        config.mining.enabled = false;
        let node = launch(config, alice_genesis()).await;
        let addr = node.local_addr();

        node.shutdown().await;

        let rebound = tokio::net::TcpListener::bind(addr).await;
        assert!(rebound.is_ok());
    }
}
