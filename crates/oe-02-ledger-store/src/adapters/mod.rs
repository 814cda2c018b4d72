//! Storage backends for the [`KeyValueStore`](crate::KeyValueStore) port.

mod memory;
#[cfg(feature = "rocksdb")]
mod rocks;

pub use memory::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use rocks::{RocksDbConfig, RocksDbStore};
