//! # Node Runtime Library
//!
//! The internals of the `node-runtime` binary, exposed for integration tests.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────┐
//!   peers ── TCP ──> │ PeerSyncSvc  │ ── LedgerGateway ──┐
//!                    └──────────────┘                    │
//!                           ^                            v
//!                    gossip │ relay              ┌───────────────┐
//!                           │                    │ LedgerWriter  │ <── LedgerHandle (API)
//!                    ┌──────┴───────┐            │ (single task) │
//!                    │ LedgerEvents │ <───────── └───────────────┘
//!                    └──────────────┘                    ^
//!                                                        │ mined blocks
//!                                                  ┌─────┴─────┐
//!                                                  │   Miner   │ (spawn_blocking)
//!                                                  └───────────┘
//! ```
//!
//! - `container/` - configuration and startup assembly
//! - `adapters/` - storage backend selection
//! - `ledger/` - the single-writer actor and its handle
//! - `mining` - the block production task
//! - `runtime` - task wiring and shutdown

pub mod adapters;
pub mod container;
pub mod ledger;
pub mod mining;
pub mod runtime;

pub use container::{NodeConfig, NodeContainer, StartupError};
pub use ledger::{LedgerHandle, SubmitError};
pub use runtime::{NodeRuntime, RuntimeError};
