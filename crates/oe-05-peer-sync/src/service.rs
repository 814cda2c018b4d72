//! # Peer Sync Service
//!
//! Keeps a node's ledger converged with its peers.
//!
//! ## Gossip
//!
//! Blocks and transactions are flooded: every node forwards a message it has
//! not seen before to all live peers except the originator and the relay it
//! came from. The `(sender_id, timestamp, type)` key of each message goes
//! into a bounded cache, so a node handles any message at most once.
//! Gossip is forwarded only after the local ledger accepted it.
//!
//! ## Height reconciliation
//!
//! On every tick the service asks each live peer for its height. If any
//! peer is ahead, it fetches that peer's full chain and offers it to the
//! ledger, which applies the longest valid chain rule.
//!
//! ## Failure isolation
//!
//! Every network round trip is bounded by `request_timeout` and runs in its
//! own task. A failed or slow peer is logged and skipped, never fatal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use shared_crypto::IdentityProvider;
use shared_types::{
    Block, HandshakePayload, MessageType, PeerDiscoveryPayload, PeerRecord, SyncRequest,
    SyncResponse, Transaction, WireMessage,
};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::domain::{classify_peer, HandshakeReject, PeerClassification, PeerTable, SeenMessageCache};
use crate::error::{Result, SyncError};
use crate::ports::{BlockVerdict, ChainVerdict, LedgerGateway, MessageHandler, PeerTransport};

/// Reconciliation ticks between two peer announcements.
const ANNOUNCE_EVERY_TICKS: u64 = 6;

#[derive(Debug, Default)]
struct SyncStats {
    deduplicated: AtomicU64,
    forwarded: AtomicU64,
    send_failures: AtomicU64,
    bad_signatures: AtomicU64,
    chains_adopted: AtomicU64,
}

/// Point-in-time copy of the service counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatsSnapshot {
    pub deduplicated: u64,
    pub forwarded: u64,
    pub send_failures: u64,
    pub bad_signatures: u64,
    pub chains_adopted: u64,
}

/// Result of one reconciliation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    NoPeers,
    UpToDate { height: u64 },
    Adopted { peer_id: String, height: u64 },
    /// Some peer claimed a greater height but no chain could be adopted.
    Unresolved { best_height: u64 },
}

pub struct PeerSyncService<T, L> {
    config: SyncConfig,
    identity: Arc<dyn IdentityProvider>,
    transport: Arc<T>,
    ledger: L,
    peers: RwLock<PeerTable>,
    seen: Mutex<SeenMessageCache>,
    stats: SyncStats,
}

impl<T, L> PeerSyncService<T, L>
where
    T: PeerTransport,
    L: LedgerGateway,
{
    pub fn new(config: SyncConfig, identity: Arc<dyn IdentityProvider>, transport: Arc<T>, ledger: L) -> Self {
        let peers = PeerTable::new(identity.node_id(), config.peer_stale_after);
        let seen = SeenMessageCache::new(config.seen_cache_size);
        Self {
            config,
            identity,
            transport,
            ledger,
            peers: RwLock::new(peers),
            seen: Mutex::new(seen),
            stats: SyncStats::default(),
        }
    }

    pub fn node_id(&self) -> String {
        self.identity.node_id()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Peers heard from within the staleness window.
    pub fn known_peers(&self) -> Vec<PeerRecord> {
        self.peers.read().live(Utc::now())
    }

    pub fn stats(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            deduplicated: self.stats.deduplicated.load(Ordering::Relaxed),
            forwarded: self.stats.forwarded.load(Ordering::Relaxed),
            send_failures: self.stats.send_failures.load(Ordering::Relaxed),
            bad_signatures: self.stats.bad_signatures.load(Ordering::Relaxed),
            chains_adopted: self.stats.chains_adopted.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // OUTBOUND
    // =========================================================================

    /// Flood a freshly mined or accepted block.
    pub async fn broadcast_block(&self, block: &Block) -> Result<usize> {
        let message = self.envelope(MessageType::GossipBlock, block)?;
        Ok(self.broadcast(message).await)
    }

    /// Flood a transaction proposal.
    pub async fn broadcast_transaction(&self, tx: &Transaction) -> Result<usize> {
        let message = self.envelope(MessageType::GossipTx, tx)?;
        Ok(self.broadcast(message).await)
    }

    /// Mark `message` as seen and send it to every live peer.
    ///
    /// Returns the number of peers that took delivery.
    pub async fn broadcast(&self, message: WireMessage) -> usize {
        self.seen.lock().insert(message.key());
        self.flood(&message, &[]).await
    }

    /// Introduce ourselves to `address` and register the peer on success.
    pub async fn handshake(&self, address: &str) -> Result<(PeerRecord, PeerClassification)> {
        let hello = self.envelope(MessageType::Handshake, &self.local_handshake().await)?;
        let reply = self.request(address, &hello, MessageType::HandshakeAck).await?;
        let payload: HandshakePayload = reply.decode_payload()?;
        if payload.node_id != reply.sender_id {
            return Err(SyncError::BadSignature {
                sender: reply.sender_id,
            });
        }

        let classification = self.register(&payload).await?;
        let record = self
            .peers
            .read()
            .get(&payload.node_id)
            .cloned()
            .unwrap_or_else(|| PeerRecord::new(&payload.node_id, &payload.host, payload.port));
        if classification == PeerClassification::SyncSource {
            info!(peer_id = %payload.node_id, peer_height = payload.height, "Handshake peer is ahead of us");
        }
        Ok((record, classification))
    }

    /// Handshake with each seed address. Returns how many answered.
    pub async fn bootstrap(&self, seeds: &[String]) -> usize {
        let mut connected = 0;
        for seed in seeds {
            match self.handshake(seed).await {
                Ok((peer, _)) => {
                    connected += 1;
                    debug!(peer_id = %peer.node_id, address = %seed, "Connected to seed");
                }
                Err(e) => warn!(address = %seed, error = %e, "Seed handshake failed"),
            }
        }
        connected
    }

    /// Share our peer list, including ourselves, with every live peer.
    pub async fn announce_peers(&self) -> Result<usize> {
        let mut peers = self.known_peers();
        peers.push(PeerRecord::new(self.node_id(), &self.config.host, self.config.port));
        let message = self.envelope(MessageType::PeerDiscovery, &PeerDiscoveryPayload { peers })?;
        Ok(self.flood(&message, &[]).await)
    }

    /// One round of height reconciliation.
    pub async fn sync_once(&self) -> Result<SyncOutcome> {
        let peers = self.known_peers();
        if peers.is_empty() {
            return Ok(SyncOutcome::NoPeers);
        }
        let local = self.ledger.height().await;
        let query = self.envelope(MessageType::SyncRequest, &SyncRequest::Height)?;

        let mut tasks = JoinSet::new();
        for peer in peers {
            let transport = Arc::clone(&self.transport);
            let query = query.clone();
            let timeout = self.config.request_timeout;
            tasks.spawn(async move {
                let reply = timed_request(transport.as_ref(), &peer.address(), &query, timeout).await;
                (peer, reply)
            });
        }

        let mut ahead = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let Ok((peer, reply)) = joined else { continue };
            match reply.and_then(|r| self.accept_reply(r, MessageType::SyncResponse)) {
                Ok(reply) => match reply.decode_payload::<SyncResponse>() {
                    Ok(SyncResponse::Height { height, .. }) if height > local => ahead.push((peer, height)),
                    Ok(_) => {}
                    Err(e) => warn!(peer_id = %peer.node_id, error = %e, "Malformed height response"),
                },
                Err(e) => {
                    self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(peer_id = %peer.node_id, error = %e, "Height query failed");
                }
            }
        }

        if ahead.is_empty() {
            return Ok(SyncOutcome::UpToDate { height: local });
        }
        ahead.sort_by(|a, b| b.1.cmp(&a.1));
        let best_height = ahead[0].1;

        for (peer, height) in ahead {
            info!(peer_id = %peer.node_id, peer_height = height, local_height = local, "Peer is ahead, fetching chain");
            let blocks = match self.fetch_chain(&peer.address()).await {
                Ok(blocks) => blocks,
                Err(e) => {
                    warn!(peer_id = %peer.node_id, error = %e, "Chain fetch failed");
                    continue;
                }
            };
            match self.ledger.submit_chain(blocks).await {
                ChainVerdict::Replaced { height } => {
                    self.stats.chains_adopted.fetch_add(1, Ordering::Relaxed);
                    self.peers.write().adjust_reputation(&peer.node_id, true);
                    return Ok(SyncOutcome::Adopted {
                        peer_id: peer.node_id,
                        height,
                    });
                }
                ChainVerdict::Ignored(reason) => {
                    warn!(peer_id = %peer.node_id, %reason, "Peer chain not adopted");
                    self.peers.write().adjust_reputation(&peer.node_id, false);
                }
            }
        }
        Ok(SyncOutcome::Unresolved { best_height })
    }

    /// Run [`Self::sync_once`] every `sync_interval` until `shutdown` flips.
    pub async fn periodic_sync(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.sync_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks: u64 = 0;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    ticks += 1;
                    match self.sync_once().await {
                        Ok(SyncOutcome::Adopted { peer_id, height }) => {
                            info!(%peer_id, height, "Adopted longer chain");
                        }
                        Ok(outcome) => debug!(?outcome, "Sync round finished"),
                        Err(e) => warn!(error = %e, "Sync round failed"),
                    }
                    if ticks % ANNOUNCE_EVERY_TICKS == 0 {
                        if let Err(e) = self.announce_peers().await {
                            warn!(error = %e, "Peer announcement failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Sync loop stopped");
                        return;
                    }
                }
            }
        }
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Handle one message from the network.
    ///
    /// Returns the reply for request-style messages. `from` is the relay the
    /// message arrived through, if known.
    pub async fn on_receive(&self, message: WireMessage, from: Option<&str>) -> Result<Option<WireMessage>> {
        if message.sender_id == self.node_id() {
            return Ok(None);
        }
        self.verify(&message)?;
        self.peers.write().touch(&message.sender_id, Utc::now());

        match message.message_type {
            MessageType::Handshake => {
                let payload: HandshakePayload = message.decode_payload()?;
                self.check_claim(&message, &payload)?;
                self.register(&payload).await?;
                let ack = self.envelope(MessageType::HandshakeAck, &self.local_handshake().await)?;
                Ok(Some(ack))
            }
            MessageType::HandshakeAck => {
                let payload: HandshakePayload = message.decode_payload()?;
                self.check_claim(&message, &payload)?;
                self.register(&payload).await?;
                Ok(None)
            }
            MessageType::GossipBlock | MessageType::GossipTx => {
                self.on_gossip(message, from).await?;
                Ok(None)
            }
            MessageType::SyncRequest => {
                let response = match message.decode_payload::<SyncRequest>()? {
                    SyncRequest::Height => SyncResponse::Height {
                        height: self.ledger.height().await,
                        tip_hash: self.ledger.tip_hash().await,
                    },
                    SyncRequest::Chain => SyncResponse::Chain {
                        blocks: self.ledger.chain().await,
                    },
                };
                Ok(Some(self.envelope(MessageType::SyncResponse, &response)?))
            }
            MessageType::SyncResponse => {
                debug!(peer_id = %message.sender_id, "Ignoring unsolicited sync response");
                Ok(None)
            }
            MessageType::PeerDiscovery => {
                let payload: PeerDiscoveryPayload = message.decode_payload()?;
                let learned = {
                    let mut peers = self.peers.write();
                    payload.peers.into_iter().filter(|p| peers.learn(p.clone())).count()
                };
                if learned > 0 {
                    info!(peer_id = %message.sender_id, learned, "Learned peers from discovery");
                }
                Ok(None)
            }
        }
    }

    async fn on_gossip(&self, message: WireMessage, from: Option<&str>) -> Result<()> {
        if !self.seen.lock().insert(message.key()) {
            self.stats.deduplicated.fetch_add(1, Ordering::Relaxed);
            debug!(peer_id = %message.sender_id, message_type = ?message.message_type, "Duplicate gossip dropped");
            return Ok(());
        }

        let forward = if message.message_type == MessageType::GossipBlock {
            let block: Block = message.decode_payload()?;
            let (index, hash) = (block.index, block.hash.clone());
            match self.ledger.submit_block(block).await {
                BlockVerdict::Accepted => true,
                BlockVerdict::Known => false,
                BlockVerdict::NeedsSync => {
                    debug!(block_height = index, block_hash = %hash, "Gossiped block needs sync");
                    if let Err(e) = self.sync_once().await {
                        warn!(error = %e, "Sync after gossiped block failed");
                    }
                    false
                }
                BlockVerdict::Rejected(reason) => {
                    warn!(peer_id = %message.sender_id, block_height = index, %reason, "Gossiped block rejected");
                    self.peers.write().adjust_reputation(&message.sender_id, false);
                    false
                }
            }
        } else {
            let tx: Transaction = message.decode_payload()?;
            self.ledger.submit_transaction(tx).await
        };

        if forward {
            let mut skip = vec![message.sender_id.as_str()];
            skip.extend(from);
            let delivered = self.flood(&message, &skip).await;
            self.stats.forwarded.fetch_add(delivered as u64, Ordering::Relaxed);
        }
        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn envelope<P: Serialize>(&self, message_type: MessageType, payload: &P) -> Result<WireMessage> {
        let mut message = WireMessage::with_payload(message_type, self.node_id(), payload)?;
        message.signature = Some(self.identity.sign(&message.signing_payload()?));
        Ok(message)
    }

    fn verify(&self, message: &WireMessage) -> Result<()> {
        let valid = match &message.signature {
            Some(signature) => shared_crypto::verify(&message.sender_id, &message.signing_payload()?, signature),
            None => !(self.config.require_signed_gossip && message.message_type.is_gossip()),
        };
        if valid {
            return Ok(());
        }
        self.stats.bad_signatures.fetch_add(1, Ordering::Relaxed);
        self.peers.write().adjust_reputation(&message.sender_id, false);
        Err(SyncError::BadSignature {
            sender: message.sender_id.clone(),
        })
    }

    /// A handshake must describe the node that sent it.
    fn check_claim(&self, message: &WireMessage, payload: &HandshakePayload) -> Result<()> {
        if payload.node_id != message.sender_id {
            return Err(SyncError::BadSignature {
                sender: message.sender_id.clone(),
            });
        }
        Ok(())
    }

    async fn local_handshake(&self) -> HandshakePayload {
        HandshakePayload {
            node_id: self.node_id(),
            host: self.config.host.clone(),
            port: self.config.port,
            height: self.ledger.height().await,
            genesis_hash: self.ledger.genesis_hash(),
        }
    }

    async fn register(&self, payload: &HandshakePayload) -> Result<PeerClassification> {
        let local_height = self.ledger.height().await;
        let classification = classify_peer(&self.node_id(), &self.ledger.genesis_hash(), local_height, payload)
            .map_err(|reject| match reject {
                HandshakeReject::WrongNetwork { genesis_hash } => SyncError::WrongNetwork {
                    peer: payload.node_id.clone(),
                    genesis_hash,
                },
                HandshakeReject::SelfConnection => SyncError::SelfConnection,
            })?;

        let record = PeerRecord::new(&payload.node_id, &payload.host, payload.port);
        if self.peers.write().upsert(record) {
            info!(
                peer_id = %payload.node_id,
                address = %format!("{}:{}", payload.host, payload.port),
                peer_height = payload.height,
                "Registered peer"
            );
        }
        Ok(classification)
    }

    async fn request(&self, address: &str, message: &WireMessage, expected: MessageType) -> Result<WireMessage> {
        let reply = timed_request(self.transport.as_ref(), address, message, self.config.request_timeout).await?;
        self.accept_reply(reply, expected)
    }

    fn accept_reply(&self, reply: WireMessage, expected: MessageType) -> Result<WireMessage> {
        if reply.message_type != expected {
            return Err(SyncError::UnexpectedResponse {
                peer: reply.sender_id,
                expected,
                got: Some(reply.message_type),
            });
        }
        self.verify(&reply)?;
        self.peers.write().touch(&reply.sender_id, Utc::now());
        Ok(reply)
    }

    pub(crate) async fn fetch_chain(&self, address: &str) -> Result<Vec<Block>> {
        let ask = self.envelope(MessageType::SyncRequest, &SyncRequest::Chain)?;
        let reply = self.request(address, &ask, MessageType::SyncResponse).await?;
        match reply.decode_payload::<SyncResponse>()? {
            SyncResponse::Chain { blocks } => Ok(blocks),
            SyncResponse::Height { .. } => Err(SyncError::UnexpectedPayload {
                peer: reply.sender_id,
                expected: "chain",
                got: "height",
            }),
        }
    }

    async fn flood(&self, message: &WireMessage, skip: &[&str]) -> usize {
        let mut message = message.clone();
        message.relay_id = Some(self.node_id());
        let mut tasks = JoinSet::new();
        for peer in self.known_peers() {
            if skip.contains(&peer.node_id.as_str()) {
                continue;
            }
            let transport = Arc::clone(&self.transport);
            let message = message.clone();
            let timeout = self.config.request_timeout;
            tasks.spawn(async move {
                let address = peer.address();
                let result = match tokio::time::timeout(timeout, transport.send(&address, &message)).await {
                    Ok(result) => result,
                    Err(_) => Err(SyncError::Timeout {
                        peer: address,
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                };
                (peer.node_id, result)
            });
        }

        let mut delivered = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((peer_id, Err(e))) => {
                    self.stats.send_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(%peer_id, message_type = ?message.message_type, error = %e, "Delivery failed");
                }
                Err(e) => warn!(error = %e, "Delivery task aborted"),
            }
        }
        delivered
    }
}

async fn timed_request<T: PeerTransport + ?Sized>(
    transport: &T,
    address: &str,
    message: &WireMessage,
    timeout: std::time::Duration,
) -> Result<WireMessage> {
    match tokio::time::timeout(timeout, transport.request(address, message)).await {
        Ok(reply) => reply,
        Err(_) => Err(SyncError::Timeout {
            peer: address.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

#[async_trait]
impl<T, L> MessageHandler for PeerSyncService<T, L>
where
    T: PeerTransport,
    L: LedgerGateway,
{
    async fn handle(&self, message: WireMessage, from: Option<String>) -> Option<WireMessage> {
        let (sender, message_type) = (message.sender_id.clone(), message.message_type);
        match self.on_receive(message, from.as_deref()).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(peer_id = %sender, ?message_type, error = %e, "Dropped peer message");
                None
            }
        }
    }
}
