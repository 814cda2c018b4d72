//! # oe-01-state-machine
//!
//! Ledger state and the rules that move it.
//!
//! ## Role in System
//!
//! - **Materialized State**: balances, stakes and the slashing escrow,
//!   updated incrementally as blocks are applied.
//! - **Admission**: [`TransactionValidator::admit`] decides whether a
//!   transaction may be applied to a given state. Rules run in a fixed
//!   order and the first failure rejects.
//! - **Block Execution**: [`BlockExecutor`] applies a whole block
//!   all-or-nothing, including the signer's block reward and escrow release.
//!
//! ```text
//!  Block ──► BlockExecutor ──► for each tx: admit ──► apply
//!                 │                                     │
//!                 ├──► block reward (capped by supply)  │
//!                 └──► release_from_escrow(height) ◄────┘
//! ```
//!
//! The crate is pure: no I/O, no clocks. Time enters only through the block
//! timestamp, which keeps replay deterministic.

pub mod domain;
pub mod service;

pub use domain::*;
pub use service::{block_time, BlockExecutor, BlockReceipt};
