//! Domain layer: state, admission rules and vesting arithmetic.

pub mod errors;
pub mod state;
pub mod validator;
pub mod vesting;

pub use errors::{ExecutionError, ValidationError};
pub use state::{EscrowEntry, LedgerState};
pub use validator::TransactionValidator;
