//! # Consensus
//!
//! Block acceptance and fork resolution under the longest valid chain rule.
//!
//! Verdicts are values ([`BlockOutcome`], [`ChainOutcome`]); only a storage
//! failure while recording an accepted verdict surfaces as an error.

pub mod domain;
pub mod service;

pub use domain::{BlockOutcome, ChainOutcome, ConsensusError, IgnoreReason, RejectReason, Result};
pub use service::ConsensusResolver;
