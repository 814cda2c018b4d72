//! # Chain Builder
//!
//! Block production for the ledger node.
//!
//! ```text
//! record_transaction ──▶ PendingPool ──snapshot──▶ ChainBuilder::mine
//!                                                     │ select (validator, scratch state)
//!                                                     │ nonce search (cancellable)
//!                                                     │ sign
//!                                                     ▼
//!                                                  MinedBlock ──▶ LedgerStore::append
//! ```
//!
//! The block reward is not a transaction in the block; the executor credits
//! it to the signer when the block is applied.

pub mod domain;
pub mod error;
pub mod service;

pub use domain::{select_transactions, PendingPool, PoolError, Selection, DEFAULT_POOL_CAPACITY};
pub use error::{BuildError, Result};
pub use service::{BuilderConfig, ChainBuilder, MinedBlock, MiningJob};
