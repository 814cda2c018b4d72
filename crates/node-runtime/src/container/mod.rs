//! # Node Container
//!
//! Configuration and the startup-time assembly of identity, genesis and
//! ledger storage.

pub mod config;
pub mod subsystems;

pub use config::{
    ConfigError, IdentityConfig, MiningConfig, NetworkConfig, NodeConfig, StorageBackend, StorageConfig,
};
pub use subsystems::{NodeContainer, StartupError};
