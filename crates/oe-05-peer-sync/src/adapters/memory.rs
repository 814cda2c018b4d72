//! In-process network for tests and simulations.
//!
//! Messages are JSON round-tripped so they see exactly what a TCP peer
//! would. Addresses can be taken offline to simulate dead peers.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{EncodingError, MessageType, WireMessage};

use crate::error::{Result, SyncError};
use crate::ports::{MessageHandler, PeerTransport};

#[derive(Default)]
pub struct MemoryNetwork {
    nodes: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
    offline: RwLock<HashSet<String>>,
    deliveries: RwLock<HashMap<(String, MessageType), usize>>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, address: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.nodes.write().insert(address.into(), handler);
    }

    pub fn set_offline(&self, address: &str, offline: bool) {
        let mut set = self.offline.write();
        if offline {
            set.insert(address.to_string());
        } else {
            set.remove(address);
        }
    }

    /// Messages of `message_type` handed to the node at `address`.
    pub fn delivered(&self, address: &str, message_type: MessageType) -> usize {
        self.deliveries
            .read()
            .get(&(address.to_string(), message_type))
            .copied()
            .unwrap_or(0)
    }

    pub fn transport(self: &Arc<Self>, local_id: impl Into<String>) -> MemoryTransport {
        MemoryTransport {
            network: Arc::clone(self),
            local_id: local_id.into(),
        }
    }

    async fn deliver(&self, from: &str, address: &str, message: &WireMessage) -> Result<Option<WireMessage>> {
        let handler = {
            if self.offline.read().contains(address) {
                return Err(SyncError::Unreachable {
                    peer: address.to_string(),
                });
            }
            self.nodes.read().get(address).cloned()
        };
        let handler = handler.ok_or_else(|| SyncError::Unreachable {
            peer: address.to_string(),
        })?;

        let raw = serde_json::to_vec(message).map_err(EncodingError::from)?;
        let message: WireMessage = serde_json::from_slice(&raw).map_err(EncodingError::from)?;
        *self
            .deliveries
            .write()
            .entry((address.to_string(), message.message_type))
            .or_default() += 1;

        let relay = message.relay_id.clone().unwrap_or_else(|| from.to_string());
        Ok(handler.handle(message, Some(relay)).await)
    }
}

#[derive(Clone)]
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    local_id: String,
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn send(&self, address: &str, message: &WireMessage) -> Result<()> {
        self.network.deliver(&self.local_id, address, message).await.map(|_| ())
    }

    async fn request(&self, address: &str, message: &WireMessage) -> Result<WireMessage> {
        self.network
            .deliver(&self.local_id, address, message)
            .await?
            .ok_or_else(|| SyncError::Io {
                peer: address.to_string(),
                reason: "no reply".to_string(),
            })
    }
}
