//! Domain layer: peer bookkeeping, flood deduplication, handshake rules.

pub mod handshake;
pub mod peer_table;
pub mod seen_cache;

pub use handshake::{classify_peer, HandshakeReject, PeerClassification};
pub use peer_table::PeerTable;
pub use seen_cache::SeenMessageCache;
