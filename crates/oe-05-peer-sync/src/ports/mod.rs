//! Ports: what the sync service offers and what it needs.

pub mod inbound;
pub mod outbound;

pub use inbound::MessageHandler;
pub use outbound::{BlockVerdict, ChainVerdict, LedgerGateway, PeerTransport};
