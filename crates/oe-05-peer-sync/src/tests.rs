use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use oe_02_ledger_store::LedgerStore;
use oe_03_chain_builder::{BuilderConfig, ChainBuilder, MiningJob, PendingPool};
use oe_04_consensus::{BlockOutcome, ChainOutcome, ConsensusResolver, RejectReason};
use parking_lot::Mutex;
use shared_crypto::{IdentityProvider, NodeIdentity};
use shared_types::{
    Block, BlockHash, GenesisConfig, MessageType, SyncResponse, Transaction, TransactionKind, TransactionType,
    WireMessage,
};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::adapters::serve;
use crate::{
    BlockVerdict, ChainVerdict, LedgerGateway, MemoryNetwork, MemoryTransport, MessageHandler, PeerClassification,
    PeerSyncService, SyncConfig, SyncError, SyncOutcome, TcpTransport,
};

struct TestLedger {
    store: Mutex<LedgerStore>,
    pool: Mutex<PendingPool>,
    resolver: ConsensusResolver,
    genesis_hash: BlockHash,
}

impl TestLedger {
    fn new(genesis: GenesisConfig) -> Self {
        let resolver = ConsensusResolver::from_genesis(&genesis);
        let store = LedgerStore::new(genesis).unwrap();
        Self {
            genesis_hash: store.genesis_hash().to_string(),
            store: Mutex::new(store),
            pool: Mutex::new(PendingPool::default()),
            resolver,
        }
    }

    /// Mine the pending pool into a block and append it.
    fn mine(&self, identity: &NodeIdentity) -> Block {
        let mut store = self.store.lock();
        let builder = ChainBuilder::new(
            store.validator().clone(),
            BuilderConfig {
                difficulty: self.resolver.difficulty(),
                max_transactions_per_block: 100,
            },
        );
        let job = MiningJob {
            parent: store.latest().clone(),
            state: store.state().clone(),
            pending: self.pool.lock().snapshot(100),
        };
        let block = builder.mine(job, identity, &AtomicBool::new(false)).unwrap().block;
        store.append(block.clone()).unwrap();
        self.pool.lock().remove_included(&block);
        block
    }

    fn balance(&self, address: &str) -> f64 {
        self.store.lock().balance_of(address)
    }

    fn pending(&self) -> usize {
        self.pool.lock().len()
    }
}

#[async_trait]
impl LedgerGateway for TestLedger {
    async fn height(&self) -> u64 {
        self.store.lock().height()
    }

    async fn tip_hash(&self) -> BlockHash {
        self.store.lock().latest().hash.clone()
    }

    fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash.clone()
    }

    async fn chain(&self) -> Vec<Block> {
        self.store.lock().chain().to_vec()
    }

    async fn submit_block(&self, block: Block) -> BlockVerdict {
        let mut store = self.store.lock();
        match self.resolver.accept_block(&mut store, block) {
            Ok(BlockOutcome::Accepted { .. }) => BlockVerdict::Accepted,
            Ok(BlockOutcome::Rejected(r)) if r.requires_sync() => BlockVerdict::NeedsSync,
            Ok(BlockOutcome::Rejected(RejectReason::AlreadyKnown { .. } | RejectReason::Stale { .. })) => {
                BlockVerdict::Known
            }
            Ok(BlockOutcome::Rejected(r)) => BlockVerdict::Rejected(r.to_string()),
            Err(e) => BlockVerdict::Rejected(e.to_string()),
        }
    }

    async fn submit_chain(&self, blocks: Vec<Block>) -> ChainVerdict {
        let mut store = self.store.lock();
        match self.resolver.accept_chain(&mut store, blocks) {
            Ok(ChainOutcome::Replaced(report)) => ChainVerdict::Replaced {
                height: report.new_height,
            },
            Ok(ChainOutcome::Ignored(reason)) => ChainVerdict::Ignored(reason.to_string()),
            Err(e) => ChainVerdict::Ignored(e.to_string()),
        }
    }

    async fn submit_transaction(&self, tx: Transaction) -> bool {
        let store = self.store.lock();
        if store.contains_transaction(&tx.id) || store.validator().admit(store.state(), &tx, Utc::now()).is_err() {
            return false;
        }
        self.pool.lock().insert(tx).is_ok()
    }
}

type Service = PeerSyncService<MemoryTransport, TestLedger>;

struct Node {
    service: Arc<Service>,
    identity: Arc<NodeIdentity>,
    address: String,
}

impl Node {
    fn ledger(&self) -> &TestLedger {
        self.service.ledger()
    }
}

fn genesis() -> GenesisConfig {
    let mut config = GenesisConfig::default();
    config.initial_balances.clear();
    config.initial_balances.insert("wallet_alice".into(), 1_000_000.0);
    config.params.difficulty = 1;
    config
}

fn spawn_node(network: &Arc<MemoryNetwork>, port: u16, genesis: GenesisConfig) -> Node {
    let identity = Arc::new(NodeIdentity::generate());
    let config = SyncConfig::for_testing(port);
    let address = config.address();
    let transport = Arc::new(network.transport(identity.node_id()));
    let service = Arc::new(PeerSyncService::new(config, identity.clone(), transport, TestLedger::new(genesis)));
    network.register(address.clone(), service.clone());
    Node {
        service,
        identity,
        address,
    }
}

fn transfer(amount: f64) -> Transaction {
    Transaction::new(TransactionKind::from_parts(
        TransactionType::Transfer,
        "wallet_alice",
        "wallet_bob",
        amount,
    ))
}

#[tokio::test]
async fn test_handshake_registers_both_sides() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    b.ledger().mine(&b.identity);

    let (peer, class) = a.service.handshake(&b.address).await.unwrap();
    assert_eq!(peer.node_id, b.identity.node_id());
    assert_eq!(class, PeerClassification::SyncSource);
    assert_eq!(a.service.known_peers().len(), 1);
    assert_eq!(b.service.known_peers()[0].node_id, a.identity.node_id());
}

#[tokio::test]
async fn test_handshake_with_foreign_network_refused() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let mut other = genesis();
    other.timestamp = "2029-01-01T00:00:00Z".into();
    let b = spawn_node(&network, 7002, other);

    assert!(a.service.handshake(&b.address).await.is_err());
    assert!(a.service.known_peers().is_empty());
    assert!(b.service.known_peers().is_empty());
}

#[tokio::test]
async fn test_block_gossip_floods_line_topology() {
    // a - b - c: a and c only know b
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    let c = spawn_node(&network, 7003, genesis());
    a.service.handshake(&b.address).await.unwrap();
    c.service.handshake(&b.address).await.unwrap();

    a.ledger().pool.lock().insert(transfer(500.0)).unwrap();
    let block = a.ledger().mine(&a.identity);
    assert_eq!(a.service.broadcast_block(&block).await.unwrap(), 1);

    for node in [&b, &c] {
        assert_eq!(node.service.ledger().height().await, 1);
        assert_eq!(node.ledger().balance("wallet_bob"), 500.0);
    }
    // b forwarded to c but not back to a
    assert_eq!(network.delivered(&c.address, MessageType::GossipBlock), 1);
    assert_eq!(network.delivered(&a.address, MessageType::GossipBlock), 0);
}

#[tokio::test]
async fn test_duplicate_gossip_processed_once() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    a.service.handshake(&b.address).await.unwrap();

    let tx = transfer(10.0);
    let mut message = WireMessage::with_payload(MessageType::GossipTx, a.identity.node_id(), &tx).unwrap();
    message.signature = Some(a.identity.sign(&message.signing_payload().unwrap()));

    b.service.on_receive(message.clone(), None).await.unwrap();
    b.service.on_receive(message, None).await.unwrap();
    assert_eq!(b.ledger().pending(), 1);
    assert_eq!(b.service.stats().deduplicated, 1);
}

#[tokio::test]
async fn test_tampered_gossip_dropped() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());

    let mut message = WireMessage::with_payload(MessageType::GossipTx, a.identity.node_id(), &transfer(10.0)).unwrap();
    message.signature = Some(a.identity.sign(&message.signing_payload().unwrap()));
    message.payload = serde_json::to_value(transfer(999.0)).unwrap();

    assert!(matches!(
        b.service.on_receive(message.clone(), None).await,
        Err(SyncError::BadSignature { .. })
    ));
    message.signature = None;
    assert!(b.service.on_receive(message, None).await.is_err());
    assert_eq!(b.ledger().pending(), 0);
    assert_eq!(b.service.stats().bad_signatures, 2);
}

#[tokio::test]
async fn test_inadmissible_transaction_not_forwarded() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    let c = spawn_node(&network, 7003, genesis());
    a.service.handshake(&b.address).await.unwrap();
    c.service.handshake(&b.address).await.unwrap();

    a.service.broadcast_transaction(&transfer(5_000_000.0)).await.unwrap();
    assert_eq!(b.ledger().pending(), 0);
    assert_eq!(network.delivered(&c.address, MessageType::GossipTx), 0);

    a.service.broadcast_transaction(&transfer(5.0)).await.unwrap();
    assert_eq!(b.ledger().pending(), 1);
    assert_eq!(c.ledger().pending(), 1);
}

#[tokio::test]
async fn test_offline_peer_does_not_block_broadcast() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    let c = spawn_node(&network, 7003, genesis());
    a.service.handshake(&b.address).await.unwrap();
    a.service.handshake(&c.address).await.unwrap();
    network.set_offline(&b.address, true);

    let block = a.ledger().mine(&a.identity);
    assert_eq!(a.service.broadcast_block(&block).await.unwrap(), 1);
    assert_eq!(c.service.ledger().height().await, 1);
    assert_eq!(a.service.stats().send_failures, 1);
}

#[tokio::test]
async fn test_sync_once_adopts_longer_chain() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    a.ledger().mine(&a.identity);
    for _ in 0..3 {
        b.ledger().mine(&b.identity);
    }
    a.service.handshake(&b.address).await.unwrap();

    let outcome = a.service.sync_once().await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Adopted {
            peer_id: b.identity.node_id(),
            height: 3
        }
    );
    assert_eq!(a.service.ledger().tip_hash().await, b.service.ledger().tip_hash().await);

    // b is not behind a, nothing to do
    assert_eq!(b.service.sync_once().await.unwrap(), SyncOutcome::UpToDate { height: 3 });
}

#[tokio::test]
async fn test_block_ahead_of_tip_triggers_sync() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    a.service.handshake(&b.address).await.unwrap();

    b.ledger().mine(&b.identity);
    let block = b.ledger().mine(&b.identity);
    b.service.broadcast_block(&block).await.unwrap();

    assert_eq!(a.service.ledger().height().await, 2);
    assert_eq!(a.service.stats().chains_adopted, 1);
}

#[tokio::test]
async fn test_peer_discovery_spreads_addresses() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    let c = spawn_node(&network, 7003, genesis());
    a.service.handshake(&b.address).await.unwrap();
    a.service.handshake(&c.address).await.unwrap();

    assert_eq!(a.service.announce_peers().await.unwrap(), 2);
    let known: Vec<_> = b.service.known_peers().into_iter().map(|p| p.node_id).collect();
    assert!(known.contains(&c.identity.node_id()));
    assert!(known.contains(&a.identity.node_id()));
}

#[tokio::test]
async fn test_periodic_sync_converges_and_stops() {
    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    let b = spawn_node(&network, 7002, genesis());
    a.service.handshake(&b.address).await.unwrap();
    b.ledger().mine(&b.identity);

    let (stop, stopped) = watch::channel(false);
    let service = Arc::clone(&a.service);
    let task = tokio::spawn(async move { service.periodic_sync(stopped).await });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while a.service.ledger().height().await < 1 {
        assert!(tokio::time::Instant::now() < deadline, "sync did not converge");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    stop.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_height_reply_to_chain_request_is_unexpected_payload() {
    struct HeightOnly(NodeIdentity);

    #[async_trait]
    impl MessageHandler for HeightOnly {
        async fn handle(&self, _message: WireMessage, _from: Option<String>) -> Option<WireMessage> {
            let answer = SyncResponse::Height {
                height: 9,
                tip_hash: "00".into(),
            };
            let mut reply = WireMessage::with_payload(MessageType::SyncResponse, self.0.node_id(), &answer).ok()?;
            reply.signature = Some(self.0.sign(&reply.signing_payload().ok()?));
            Some(reply)
        }
    }

    let network = MemoryNetwork::new();
    let a = spawn_node(&network, 7001, genesis());
    network.register("127.0.0.1:7099", Arc::new(HeightOnly(NodeIdentity::generate())));

    let err = a.service.fetch_chain("127.0.0.1:7099").await.unwrap_err();
    assert!(
        matches!(err, SyncError::UnexpectedPayload { expected: "chain", got: "height", .. }),
        "{err}"
    );
    assert!(!err.is_transient());
}

type TcpService = PeerSyncService<TcpTransport, TestLedger>;

/// Counts inbound block gossip before handing it to the node.
struct BlockTally {
    inner: Arc<TcpService>,
    blocks: AtomicUsize,
}

#[async_trait]
impl MessageHandler for BlockTally {
    async fn handle(&self, message: WireMessage, from: Option<String>) -> Option<WireMessage> {
        if message.message_type == MessageType::GossipBlock {
            self.blocks.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.handle(message, from).await
    }
}

struct TcpNode {
    tally: Arc<BlockTally>,
    identity: Arc<NodeIdentity>,
    address: String,
}

impl TcpNode {
    fn service(&self) -> &TcpService {
        &self.tally.inner
    }
}

async fn spawn_tcp_node(shutdown: &watch::Receiver<bool>) -> TcpNode {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = SyncConfig::for_testing(listener.local_addr().unwrap().port());
    let address = config.address();
    let identity = Arc::new(NodeIdentity::generate());
    let service = Arc::new(PeerSyncService::new(
        config,
        identity.clone(),
        Arc::new(TcpTransport),
        TestLedger::new(genesis()),
    ));
    let tally = Arc::new(BlockTally {
        inner: service,
        blocks: AtomicUsize::new(0),
    });
    tokio::spawn(serve(listener, tally.clone(), shutdown.clone()));
    TcpNode {
        tally,
        identity,
        address,
    }
}

#[tokio::test]
async fn test_relayed_block_not_echoed_to_relay_over_tcp() {
    // origin - relay, then relay, x and y all know each other
    let (stop, stopped) = watch::channel(false);
    let origin = spawn_tcp_node(&stopped).await;
    let relay = spawn_tcp_node(&stopped).await;
    let x = spawn_tcp_node(&stopped).await;
    let y = spawn_tcp_node(&stopped).await;
    relay.service().handshake(&origin.address).await.unwrap();
    relay.service().handshake(&x.address).await.unwrap();
    relay.service().handshake(&y.address).await.unwrap();
    x.service().handshake(&y.address).await.unwrap();
    assert_eq!(origin.service().known_peers().len(), 1);

    origin.service().ledger().pool.lock().insert(transfer(500.0)).unwrap();
    let block = origin.service().ledger().mine(&origin.identity);
    assert_eq!(origin.service().broadcast_block(&block).await.unwrap(), 1);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    for node in [&relay, &x, &y] {
        while node.service().ledger().height().await < 1 {
            assert!(tokio::time::Instant::now() < deadline, "block did not spread");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
    // let any late forwards land
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(relay.tally.blocks.load(Ordering::SeqCst), 1);
    assert_eq!(origin.tally.blocks.load(Ordering::SeqCst), 0);
    assert!(relay.service().stats().forwarded >= 2);
    assert_eq!(relay.service().stats().deduplicated, 0);

    stop.send(true).unwrap();
}
