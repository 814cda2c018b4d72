use shared_types::{Address, TransactionType};
use thiserror::Error;

/// Why a transaction was refused admission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid amount {amount}: must be finite and non-negative")]
    InvalidAmount { amount: f64 },

    #[error("{tx_type} transaction is missing its {role}")]
    MissingParty {
        tx_type: TransactionType,
        role: &'static str,
    },

    #[error("Protocol address {address} cannot originate transactions")]
    ProtectedAddress { address: Address },

    #[error("Supply cap exceeded: total {total_supply} + {amount} > {max_supply}")]
    SupplyCapExceeded {
        total_supply: f64,
        amount: f64,
        max_supply: f64,
    },

    #[error("APPEAL from {sender} rejected: only the governance wallet may issue appeals")]
    UnauthorizedAppeal { sender: Address },

    #[error("Vesting cliff not reached for {address}: {years_passed:.3} of {cliff_years:.3} years")]
    VestingCliff {
        address: Address,
        years_passed: f64,
        cliff_years: f64,
    },

    #[error("Vesting limit for {address}: {already_spent} spent + {amount} requested > {unlocked} unlocked")]
    VestingLocked {
        address: Address,
        unlocked: f64,
        already_spent: f64,
        amount: f64,
    },

    #[error("Grant of {amount} from {address} exceeds the {grant_amount} grant cap")]
    GrantExceeded {
        address: Address,
        amount: f64,
        grant_amount: f64,
    },

    #[error("Insufficient balance for {address}: available {available}, required {required}")]
    InsufficientBalance {
        address: Address,
        available: f64,
        required: f64,
    },

    #[error("Insufficient stake for {address}: staked {available}, required {required}")]
    InsufficientStake {
        address: Address,
        available: f64,
        required: f64,
    },
}

impl ValidationError {
    /// Short name of the violated rule, for logs.
    pub fn rule(&self) -> &'static str {
        match self {
            ValidationError::InvalidAmount { .. }
            | ValidationError::MissingParty { .. }
            | ValidationError::ProtectedAddress { .. } => "well_formed",
            ValidationError::SupplyCapExceeded { .. } => "supply_cap",
            ValidationError::UnauthorizedAppeal { .. } => "appeal_authorization",
            ValidationError::VestingCliff { .. } | ValidationError::VestingLocked { .. } => {
                "vesting"
            }
            ValidationError::GrantExceeded { .. } => "grant_cap",
            ValidationError::InsufficientBalance { .. }
            | ValidationError::InsufficientStake { .. } => "balance",
        }
    }

    /// Whether the same transaction could be admitted later without change.
    ///
    /// Balance and vesting failures depend on state that moves; the rest
    /// are permanent.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ValidationError::InsufficientBalance { .. }
                | ValidationError::InsufficientStake { .. }
                | ValidationError::VestingCliff { .. }
                | ValidationError::VestingLocked { .. }
        )
    }
}

/// A block could not be executed against the current state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutionError {
    #[error("Transaction {index} ({tx_id}) rejected: {source}")]
    Transaction {
        index: usize,
        tx_id: String,
        #[source]
        source: ValidationError,
    },

    #[error("Duplicate transaction id {0} in block")]
    DuplicateTransaction(String),

    #[error("Block timestamp {0:?} is not RFC 3339")]
    InvalidTimestamp(String),
}
