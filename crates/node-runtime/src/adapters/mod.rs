//! # Adapters
//!
//! Bindings from node configuration to concrete subsystem backends.

pub mod storage;

pub use storage::{check_disk_space, open_backend, StorageError};
