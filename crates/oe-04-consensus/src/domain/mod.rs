//! Domain layer: consensus verdicts and errors.

pub mod error;
pub mod outcome;

pub use error::{ConsensusError, Result};
pub use outcome::{BlockOutcome, ChainOutcome, IgnoreReason, RejectReason};
