//! # Ledger Storage Backends
//!
//! Selects the [`KeyValueStore`] behind the ledger from `[storage]`.
//!
//! - `memory`: [`InMemoryKVStore`], lost on exit.
//! - `rocksdb`: `RocksDbStore` under `<data_dir>/ledger`. Only available when
//!   the crate is built with the `rocksdb` feature.
//!
//! A persistent backend is refused when the data directory's filesystem has
//! less free space than `min_disk_space_percent`.

use std::path::Path;

use oe_02_ledger_store::{InMemoryKVStore, KVStoreError, KeyValueStore};
use thiserror::Error;
use tracing::info;

use crate::container::{StorageBackend, StorageConfig};

/// Storage backend errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Backend '{0}' is not compiled into this binary")]
    Unavailable(&'static str),

    #[error("Cannot prepare data directory {path}: {reason}")]
    DataDir { path: String, reason: String },

    #[error("Only {available_percent}% disk space free at {path}, need {required_percent}%")]
    InsufficientDiskSpace {
        path: String,
        available_percent: u8,
        required_percent: u8,
    },

    #[error(transparent)]
    Backend(#[from] KVStoreError),
}

/// Open the configured backend.
pub fn open_backend(config: &StorageConfig) -> Result<Box<dyn KeyValueStore>, StorageError> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory ledger storage");
            Ok(Box::new(InMemoryKVStore::new()))
        }
        StorageBackend::Rocksdb => open_rocksdb(config),
    }
}

#[cfg(feature = "rocksdb")]
fn open_rocksdb(config: &StorageConfig) -> Result<Box<dyn KeyValueStore>, StorageError> {
    prepare_data_dir(&config.data_dir)?;
    check_disk_space(&config.data_dir, config.min_disk_space_percent)?;
    let store = oe_02_ledger_store::RocksDbStore::open_default(config.data_dir.join("ledger"))?;
    Ok(Box::new(store))
}

#[cfg(not(feature = "rocksdb"))]
fn open_rocksdb(_config: &StorageConfig) -> Result<Box<dyn KeyValueStore>, StorageError> {
    Err(StorageError::Unavailable("rocksdb"))
}

#[cfg_attr(not(feature = "rocksdb"), allow(dead_code))]
fn prepare_data_dir(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::DataDir {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Fail when the filesystem holding `path` has less than `required_percent`
/// of its space free.
pub fn check_disk_space(path: &Path, required_percent: u8) -> Result<(), StorageError> {
    let io = |e: std::io::Error| StorageError::DataDir {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let available = fs2::available_space(path).map_err(io)?;
    let total = fs2::total_space(path).map_err(io)?;
    if total == 0 {
        return Err(StorageError::DataDir {
            path: path.display().to_string(),
            reason: "Unable to determine disk space".to_string(),
        });
    }

    let available_percent = ((available as u128 * 100) / total as u128) as u8;
    if available_percent < required_percent {
        return Err(StorageError::InsufficientDiskSpace {
            path: path.display().to_string(),
            available_percent,
            required_percent,
        });
    }
    info!(path = %path.display(), available_percent, "Disk space check passed");
    Ok(())
}
