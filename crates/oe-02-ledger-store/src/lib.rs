//! # oe-02-ledger-store
//!
//! The node's copy of the chain and the state derived from it.
//!
//! ## Role in System
//!
//! - **Append-Only Chain**: [`LedgerStore::append`] accepts a block only if
//!   it extends the current tip; state is updated incrementally.
//! - **Atomic Replacement**: a longer chain is replayed from genesis into a
//!   [`CandidateChain`] off to the side and swapped in with
//!   [`LedgerStore::replace_chain`]. Readers never see a half-built chain.
//! - **Persistence**: every mutation is written through the
//!   [`KeyValueStore`] port as one atomic batch.
//!
//! ## Key Layout
//!
//! ```text
//! block/idx/<20-digit index>  -> block JSON
//! block/hash/<hash>           -> index
//! tx/<id>                     -> { transaction, block_hash | null }
//! ```
//!
//! A transaction record with a null `block_hash` is pending.

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::InMemoryKVStore;
#[cfg(feature = "rocksdb")]
pub use adapters::{RocksDbConfig, RocksDbStore};
pub use domain::*;
pub use ports::outbound::{BatchOperation, KVStoreError, KeyValueStore};
pub use service::{CandidateChain, LedgerStore, ReplaceReport};
