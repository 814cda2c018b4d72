//! # Peer Sync
//!
//! Networking for the ledger node: handshakes, flood-fill gossip with
//! deduplication, peer discovery and periodic height reconciliation.
//!
//! ## Architecture
//!
//! ```text
//!            ┌──────────────── PeerSyncService ────────────────┐
//! inbound ──▶│ MessageHandler::handle ─▶ on_receive            │
//!            │   verify signature ─▶ dedup ─▶ LedgerGateway    │──▶ ledger
//!            │   forward to peers except sender ─┐             │
//!            │ periodic_sync ─▶ heights ─▶ chain ─┤             │
//!            └────────────────────────────────────┼────────────┘
//!                                                 ▼
//!                                           PeerTransport (TCP | memory)
//! ```
//!
//! The ledger is reached only through [`LedgerGateway`], so this crate does
//! not depend on consensus or storage.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::{MemoryNetwork, MemoryTransport, TcpTransport};
pub use config::SyncConfig;
pub use domain::{PeerClassification, PeerTable, SeenMessageCache};
pub use error::{Result, SyncError};
pub use ports::{BlockVerdict, ChainVerdict, LedgerGateway, MessageHandler, PeerTransport};
pub use service::{PeerSyncService, SyncOutcome, SyncStatsSnapshot};

#[cfg(test)]
mod tests;
