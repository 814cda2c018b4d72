//! # Subsystem Container
//!
//! Everything a node needs before its tasks start. Building the container is
//! where every StartupFatal condition surfaces: a malformed genesis, a key
//! that cannot be loaded or decrypted, or a ledger that cannot be opened or
//! belongs to another network. None of them are retried.

use std::sync::Arc;

use oe_02_ledger_store::{LedgerStore, StoreError};
use shared_crypto::{IdentityProvider, Keystore, KeystoreError, NodeIdentity};
use shared_types::{GenesisConfig, GenesisError};
use thiserror::Error;
use tracing::info;

use super::config::NodeConfig;
use crate::adapters::{open_backend, StorageError};

/// Conditions under which the node refuses to start.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Genesis configuration unusable: {0}")]
    Genesis(#[from] GenesisError),

    #[error("Node identity unavailable: {0}")]
    Identity(#[from] KeystoreError),

    #[error("Ledger storage unavailable: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger could not be opened: {0}")]
    Ledger(#[from] StoreError),
}

/// Initialized node subsystems, ready to be started.
pub struct NodeContainer {
    pub config: NodeConfig,
    pub genesis: GenesisConfig,
    pub identity: Arc<NodeIdentity>,
    pub store: LedgerStore,
}

impl std::fmt::Debug for NodeContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeContainer")
            .field("node_id", &self.identity.node_id())
            .field("height", &self.store.height())
            .finish_non_exhaustive()
    }
}

impl NodeContainer {
    /// Build with the genesis read from `config.genesis_path`.
    pub fn build(config: NodeConfig) -> Result<Self, StartupError> {
        let genesis = GenesisConfig::load_or_default(&config.genesis_path)?;
        Self::with_genesis(config, genesis)
    }

    /// Build with an already loaded genesis.
    ///
    /// ## Initialization Order
    ///
    /// 1. Validate genesis
    /// 2. Load or generate the identity key
    /// 3. Open storage and replay the persisted chain
    pub fn with_genesis(config: NodeConfig, genesis: GenesisConfig) -> Result<Self, StartupError> {
        genesis.validate()?;

        let keystore = Keystore::new(&config.identity.key_dir);
        let identity = keystore.load_or_generate(&config.identity.node_id, config.identity.password.as_deref())?;
        let identity = Arc::new(identity);

        let backend = open_backend(&config.storage)?;
        let store = LedgerStore::open(genesis.clone(), backend)?;

        info!(
            node_id = %identity.node_id(),
            genesis_hash = %store.genesis_hash(),
            height = store.height(),
            "Node subsystems initialized"
        );

        Ok(Self {
            config,
            genesis,
            identity,
            store,
        })
    }
}
