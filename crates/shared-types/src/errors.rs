//! # Error Types
//!
//! Errors shared across subsystems.

use thiserror::Error;

/// A value could not be reduced to its canonical byte form.
#[derive(Debug, Error)]
#[error("Canonical encoding failed: {0}")]
pub struct EncodingError(#[from] pub serde_json::Error);

/// The genesis configuration is unusable. Always fatal at startup.
#[derive(Debug, Error)]
pub enum GenesisError {
    /// The configuration file could not be read.
    #[error("Failed to read genesis file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// The configuration file is not valid JSON for the genesis schema.
    #[error("Malformed genesis configuration: {0}")]
    Malformed(String),

    /// A balance or stake is negative or not finite.
    #[error("Invalid genesis amount for {address}: {amount}")]
    InvalidAmount { address: String, amount: f64 },

    /// Allocations already exceed the supply cap.
    #[error("Genesis allocations {allocated} exceed max supply {max_supply}")]
    ExceedsSupply { allocated: f64, max_supply: f64 },

    /// A protocol parameter is out of range.
    #[error("Invalid genesis parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// The genesis timestamp is not RFC 3339.
    #[error("Invalid genesis timestamp {0:?}")]
    InvalidTimestamp(String),

    /// Canonical encoding of the genesis block failed.
    #[error(transparent)]
    Encoding(#[from] EncodingError),
}
