//! # Node Configuration
//!
//! Unified configuration for the ledger node, read from a TOML file with
//! every field defaulted, then overridden from the environment and CLI.
//!
//! ```toml
//! genesis_path = "genesis.json"
//!
//! [network]
//! port = 6000
//! seed_nodes = ["10.0.0.2:6000"]
//!
//! [storage]
//! backend = "rocksdb"
//! data_dir = "./data"
//!
//! [mining]
//! enabled = true
//! ```
//!
//! ## Environment Overrides
//!
//! - `OE_P2P_PORT`: listening port
//! - `OE_DATA_DIR`: storage and keystore root
//! - `OE_KEY_PASSWORD`: password for the encrypted identity key (never read
//!   from the file)

use std::path::{Path, PathBuf};
use std::time::Duration;

use oe_03_chain_builder::BuilderConfig;
use oe_05_peer_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("Malformed config file {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Peer networking and synchronisation.
    pub network: NetworkConfig,
    /// Node identity key.
    pub identity: IdentityConfig,
    /// Ledger persistence.
    pub storage: StorageConfig,
    /// Block production.
    pub mining: MiningConfig,
    /// Location of `genesis.json`.
    pub genesis_path: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            identity: IdentityConfig::default(),
            storage: StorageConfig::default(),
            mining: MiningConfig::default(),
            genesis_path: PathBuf::from("genesis.json"),
        }
    }
}

impl NodeConfig {
    /// Parse a TOML document.
    pub fn from_toml(raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: NodeConfig = toml::from_str(raw).map_err(|e| ConfigError::Malformed {
            path: origin.to_string(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            info!("No config file given, using defaults");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&raw, &path.display().to_string())
    }

    /// Apply `OE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(port) = var("OE_P2P_PORT") {
            self.network.port = port.parse().map_err(|_| ConfigError::Invalid {
                name: "OE_P2P_PORT",
                reason: format!("not a port number: {port}"),
            })?;
        }
        if let Some(dir) = var("OE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(&dir);
            self.identity.key_dir = PathBuf::from(dir).join("keys");
        }
        if let Some(password) = var("OE_KEY_PASSWORD") {
            if password.is_empty() {
                warn!("OE_KEY_PASSWORD is set but empty, ignoring");
            } else {
                self.identity.password = Some(password);
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.sync_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "network.sync_interval_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.network.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                name: "network.request_timeout_ms",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.mining.max_transactions_per_block == 0 {
            return Err(ConfigError::Invalid {
                name: "mining.max_transactions_per_block",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.storage.min_disk_space_percent > 100 {
            return Err(ConfigError::Invalid {
                name: "storage.min_disk_space_percent",
                reason: format!("{} is not a percentage", self.storage.min_disk_space_percent),
            });
        }
        Ok(())
    }
}

/// Network configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address advertised to peers and bound for listening.
    pub host: String,
    /// P2P listening port.
    pub port: u16,
    /// Peers contacted at startup.
    pub seed_nodes: Vec<String>,
    pub sync_interval_secs: u64,
    pub request_timeout_ms: u64,
    pub seen_cache_size: usize,
    pub peer_stale_after_secs: u64,
    pub require_signed_gossip: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            host: sync.host,
            port: sync.port,
            seed_nodes: Vec::new(),
            sync_interval_secs: sync.sync_interval.as_secs(),
            request_timeout_ms: sync.request_timeout.as_millis() as u64,
            seen_cache_size: sync.seen_cache_size,
            peer_stale_after_secs: sync.peer_stale_after.as_secs(),
            require_signed_gossip: sync.require_signed_gossip,
        }
    }
}

impl NetworkConfig {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            host: self.host.clone(),
            port: self.port,
            sync_interval: Duration::from_secs(self.sync_interval_secs),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            seen_cache_size: self.seen_cache_size,
            peer_stale_after: Duration::from_secs(self.peer_stale_after_secs),
            require_signed_gossip: self.require_signed_gossip,
        }
    }
}

/// Identity configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Directory holding `<label>.sk` and `<label>.pk`.
    pub key_dir: PathBuf,
    /// Key file label.
    pub node_id: String,
    /// Key password. Only ever set from `OE_KEY_PASSWORD`.
    #[serde(skip)]
    pub password: Option<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("./data/keys"),
            node_id: "node".to_string(),
            password: None,
        }
    }
}

/// Which key/value backend holds the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Rocksdb,
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Data directory for the persistent backend.
    pub data_dir: PathBuf,
    /// Minimum free disk space percentage required to open a persistent store.
    pub min_disk_space_percent: u8,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            data_dir: PathBuf::from("./data"),
            min_disk_space_percent: 5,
        }
    }
}

/// Mining/Block Production configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    pub enabled: bool,
    /// How often the miner looks at the pending pool.
    pub interval_ms: u64,
    pub max_transactions_per_block: usize,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 1_000,
            max_transactions_per_block: BuilderConfig::default().max_transactions_per_block,
        }
    }
}
