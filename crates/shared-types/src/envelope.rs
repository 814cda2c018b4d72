//! # Peer Wire Envelope
//!
//! Every message exchanged between nodes is a [`WireMessage`]:
//!
//! ```text
//! { "type": "GOSSIP_BLOCK", "sender_id": "<hex pubkey>", "payload": {...},
//!   "timestamp": 1735689600.123456, "signature": "<hex>" }
//! ```
//!
//! ## Security Properties
//!
//! - **Origin Authority**: `sender_id` names the node that created the
//!   message. Relays forward the envelope unchanged, so the signature keeps
//!   verifying against the originator.
//! - **Deduplication**: `(sender_id, timestamp, type)` identifies a message
//!   network-wide; see [`MessageKey`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hashing::canonical_json;
use crate::{Block, BlockHash, EncodingError, Transaction};

/// Kinds of peer message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Handshake,
    HandshakeAck,
    GossipBlock,
    GossipTx,
    SyncRequest,
    SyncResponse,
    PeerDiscovery,
}

impl MessageType {
    /// Gossip is flooded to every peer and deduplicated; everything else is
    /// point-to-point.
    pub fn is_gossip(&self) -> bool {
        matches!(self, MessageType::GossipBlock | MessageType::GossipTx)
    }
}

/// Network-wide identity of a message, used for flood deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub sender_id: String,
    timestamp_bits: u64,
    pub message_type: MessageType,
}

/// The signed peer envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub sender_id: String,
    #[serde(default)]
    pub payload: Value,
    /// Unix seconds with sub-second precision.
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Node that handed this copy on. Outside the signature and the dedup
    /// key, so relays restamp it freely; only used to avoid echoing gossip
    /// back to where it came from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_id: Option<String>,
}

#[derive(Serialize)]
struct SignedEnvelope<'a> {
    #[serde(rename = "type")]
    message_type: MessageType,
    sender_id: &'a str,
    payload: &'a Value,
    timestamp: f64,
}

impl WireMessage {
    /// Create an unsigned message stamped with the current time.
    pub fn new(message_type: MessageType, sender_id: impl Into<String>, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            message_type,
            sender_id: sender_id.into(),
            payload,
            timestamp: now.timestamp() as f64 + f64::from(now.timestamp_subsec_micros()) / 1e6,
            signature: None,
            relay_id: None,
        }
    }

    /// Serialize `payload` and wrap it.
    pub fn with_payload<T: Serialize>(
        message_type: MessageType,
        sender_id: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EncodingError> {
        Ok(Self::new(message_type, sender_id, serde_json::to_value(payload)?))
    }

    /// Canonical bytes of `{type, sender_id, payload, timestamp}`.
    pub fn signing_payload(&self) -> Result<Vec<u8>, EncodingError> {
        canonical_json(&SignedEnvelope {
            message_type: self.message_type,
            sender_id: &self.sender_id,
            payload: &self.payload,
            timestamp: self.timestamp,
        })
    }

    pub fn key(&self) -> MessageKey {
        MessageKey {
            sender_id: self.sender_id.clone(),
            timestamp_bits: self.timestamp.to_bits(),
            message_type: self.message_type,
        }
    }

    /// Decode the payload as `T`.
    pub fn decode_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, EncodingError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// A known remote node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Hex public key of the peer.
    pub node_id: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "Utc::now")]
    pub first_seen: DateTime<Utc>,
    /// Last time anything was heard from the peer.
    pub last_seen: DateTime<Utc>,
    /// Reputation in `[0, 1]`. New peers start at 0.5.
    #[serde(default = "default_reputation")]
    pub reputation: f64,
}

fn default_reputation() -> f64 {
    0.5
}

impl PeerRecord {
    pub fn new(node_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        let now = Utc::now();
        Self {
            node_id: node_id.into(),
            host: host.into(),
            port,
            first_seen: now,
            last_seen: now,
            reputation: default_reputation(),
        }
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// HANDSHAKE / HANDSHAKE_ACK payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakePayload {
    pub node_id: String,
    pub host: String,
    pub port: u16,
    pub height: u64,
    pub genesis_hash: BlockHash,
}

/// PEER_DISCOVERY payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerDiscoveryPayload {
    pub peers: Vec<PeerRecord>,
}

/// SYNC_REQUEST payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum SyncRequest {
    /// Ask for the peer's tip.
    Height,
    /// Ask for the peer's full chain.
    Chain,
}

/// SYNC_RESPONSE payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "response", rename_all = "snake_case")]
pub enum SyncResponse {
    Height { height: u64, tip_hash: BlockHash },
    Chain { blocks: Vec<Block> },
}

/// GOSSIP_BLOCK payload.
pub type GossipBlockPayload = Block;

/// GOSSIP_TX payload.
pub type GossipTxPayload = Transaction;
