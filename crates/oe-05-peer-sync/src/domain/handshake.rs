//! # Handshake Rules
//!
//! Both sides exchange `(node_id, address, height, genesis_hash)`. Peers on
//! another genesis are refused; everyone else is classified by height so
//! the caller knows whether the peer is a sync source.

use shared_types::HandshakePayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerClassification {
    /// Peer is ahead of us.
    SyncSource,
    /// Peer is behind us.
    SyncTarget,
    Equal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeReject {
    /// Different genesis hash.
    WrongNetwork { genesis_hash: String },
    /// The peer claims our own identity.
    SelfConnection,
}

pub fn classify_peer(
    local_id: &str,
    local_genesis: &str,
    local_height: u64,
    remote: &HandshakePayload,
) -> Result<PeerClassification, HandshakeReject> {
    if remote.node_id == local_id {
        return Err(HandshakeReject::SelfConnection);
    }
    if remote.genesis_hash != local_genesis {
        return Err(HandshakeReject::WrongNetwork {
            genesis_hash: remote.genesis_hash.clone(),
        });
    }
    Ok(match remote.height.cmp(&local_height) {
        std::cmp::Ordering::Greater => PeerClassification::SyncSource,
        std::cmp::Ordering::Less => PeerClassification::SyncTarget,
        std::cmp::Ordering::Equal => PeerClassification::Equal,
    })
}
