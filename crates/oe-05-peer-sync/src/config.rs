//! Configuration types for peer synchronisation

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address other nodes reach us on.
    pub host: String,
    pub port: u16,
    /// Period of the height reconciliation loop.
    pub sync_interval: Duration,
    /// Per-peer bound on a send or request round trip.
    pub request_timeout: Duration,
    /// Gossip keys remembered for deduplication.
    pub seen_cache_size: usize,
    /// Peers silent for longer than this drop out of `known_peers`.
    pub peer_stale_after: Duration,
    /// Drop gossip that carries no signature.
    pub require_signed_gossip: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6000,
            sync_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            seen_cache_size: 10_000,
            peer_stale_after: Duration::from_secs(300),
            require_signed_gossip: true,
        }
    }
}

impl SyncConfig {
    pub fn for_testing(port: u16) -> Self {
        Self {
            port,
            sync_interval: Duration::from_millis(100),
            request_timeout: Duration::from_millis(500),
            ..Self::default()
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
