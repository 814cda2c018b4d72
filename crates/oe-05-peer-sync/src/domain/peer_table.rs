//! Known peers and their liveness.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared_types::PeerRecord;

const REPUTATION_STEP: f64 = 0.05;

#[derive(Debug)]
pub struct PeerTable {
    local_id: String,
    stale_after: Duration,
    peers: HashMap<String, PeerRecord>,
}

impl PeerTable {
    pub fn new(local_id: impl Into<String>, stale_after: Duration) -> Self {
        Self {
            local_id: local_id.into(),
            stale_after,
            peers: HashMap::new(),
        }
    }

    /// Register or refresh a peer. Returns `true` for a first contact.
    ///
    /// An existing entry keeps its `first_seen` and reputation; address and
    /// `last_seen` take the newer values.
    pub fn upsert(&mut self, record: PeerRecord) -> bool {
        if record.node_id == self.local_id {
            return false;
        }
        match self.peers.get_mut(&record.node_id) {
            Some(existing) => {
                existing.host = record.host;
                existing.port = record.port;
                existing.last_seen = existing.last_seen.max(record.last_seen);
                false
            }
            None => {
                self.peers.insert(record.node_id.clone(), record);
                true
            }
        }
    }

    /// Learn about a peer second hand. Never refreshes an existing entry.
    pub fn learn(&mut self, record: PeerRecord) -> bool {
        if record.node_id == self.local_id || self.peers.contains_key(&record.node_id) {
            return false;
        }
        self.peers.insert(record.node_id.clone(), record);
        true
    }

    pub fn touch(&mut self, node_id: &str, at: DateTime<Utc>) {
        if let Some(peer) = self.peers.get_mut(node_id) {
            peer.last_seen = peer.last_seen.max(at);
        }
    }

    /// Nudge reputation up or down, clamped to `[0, 1]`.
    pub fn adjust_reputation(&mut self, node_id: &str, good: bool) {
        if let Some(peer) = self.peers.get_mut(node_id) {
            let delta = if good { REPUTATION_STEP } else { -REPUTATION_STEP };
            peer.reputation = (peer.reputation + delta).clamp(0.0, 1.0);
        }
    }

    pub fn get(&self, node_id: &str) -> Option<&PeerRecord> {
        self.peers.get(node_id)
    }

    /// Peers heard from within the staleness window, most recent first.
    pub fn live(&self, now: DateTime<Utc>) -> Vec<PeerRecord> {
        let window = chrono::Duration::from_std(self.stale_after).unwrap_or_else(|_| chrono::Duration::days(36_500));
        let mut live: Vec<_> = self
            .peers
            .values()
            .filter(|p| now.signed_duration_since(p.last_seen) <= window)
            .cloned()
            .collect();
        live.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then_with(|| a.node_id.cmp(&b.node_id)));
        live
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
