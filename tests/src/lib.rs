//! # Orbis Ethica Test Suite
//!
//! Scenarios that cross crate boundaries.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs            # Genesis documents, miners, node launchers
//! └── integration/
//!     ├── ledger_flows.rs    # Transfers, staking, slashing, vesting, persistence
//!     ├── consensus.rs       # Longest-chain resolution and fork recovery
//!     ├── network.rs         # Live nodes over TCP: gossip, sync, shutdown
//!     └── startup.rs         # Refusal to start on bad genesis or keys
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p oe-tests
//! cargo test -p oe-tests integration::network::
//! ```

pub mod fixtures;
pub mod integration;
