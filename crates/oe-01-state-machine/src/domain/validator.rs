//! # Transaction Admission
//!
//! Rules, evaluated in order; the first failure rejects:
//!
//! | # | Rule | Applies to |
//! |---|------|------------|
//! | 0 | Amount finite and non-negative, parties present, sender not escrow | all |
//! | 1 | `total_supply + amount <= max_supply` | MINT, REWARD, unfunded part of APPEAL |
//! | 2 | Sender is the governance wallet | APPEAL |
//! | 3 | Vesting cliff reached and unlocked cap not exceeded | TRANSFER/STAKE from vesting contracts |
//! | 4 | `amount <= grant_amount` | TRANSFER/STAKE from grant pools |
//! | 5 | Sufficient balance (TRANSFER, STAKE, PENALTY) or stake (UNSTAKE, SLASH) | debits |

use chrono::{DateTime, Utc};
use shared_types::{Address, ChainParams, GenesisConfig, Transaction, TransactionKind, ESCROW_ADDRESS};

use super::vesting::{cliff_years, unlocked_amount, years_between};
use super::{LedgerState, ValidationError};

/// Admission rules bound to one genesis configuration.
#[derive(Debug, Clone)]
pub struct TransactionValidator {
    params: ChainParams,
    governance_wallet: Address,
    genesis_time: DateTime<Utc>,
    /// Initial allocation of each vesting contract.
    vesting_allocations: Vec<(Address, f64)>,
}

impl TransactionValidator {
    /// Build a validator from a genesis configuration that has already
    /// passed [`GenesisConfig::validate`].
    pub fn new(genesis: &GenesisConfig) -> Result<Self, shared_types::GenesisError> {
        let vesting_allocations = genesis
            .params
            .vesting_contracts
            .iter()
            .map(|a| (a.clone(), genesis.initial_allocation(a)))
            .collect();
        Ok(Self {
            params: genesis.params.clone(),
            governance_wallet: genesis.governance_wallet.clone(),
            genesis_time: genesis.genesis_time()?,
            vesting_allocations,
        })
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn governance_wallet(&self) -> &str {
        &self.governance_wallet
    }

    /// Decide whether `tx` may be applied to `state` at time `at`.
    ///
    /// `at` is the timestamp of the block the transaction is (or will be)
    /// included in.
    pub fn admit(
        &self,
        state: &LedgerState,
        tx: &Transaction,
        at: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        self.check_well_formed(tx)?;
        self.check_supply(state, tx)?;
        self.check_appeal_authority(tx)?;
        self.check_vesting(state, tx, at)?;
        self.check_grant_cap(tx)?;
        self.check_funds(state, tx)
    }

    fn check_well_formed(&self, tx: &Transaction) -> Result<(), ValidationError> {
        let amount = tx.amount();
        if !amount.is_finite() || amount < 0.0 {
            return Err(ValidationError::InvalidAmount { amount });
        }
        let tx_type = tx.tx_type();
        if let Some(sender) = tx.kind.sender() {
            if sender.is_empty() {
                return Err(ValidationError::MissingParty {
                    tx_type,
                    role: "sender",
                });
            }
            if sender == ESCROW_ADDRESS {
                return Err(ValidationError::ProtectedAddress {
                    address: sender.to_string(),
                });
            }
        }
        if tx.kind.receiver().is_some_and(str::is_empty) {
            return Err(ValidationError::MissingParty {
                tx_type,
                role: "receiver",
            });
        }
        Ok(())
    }

    fn check_supply(&self, state: &LedgerState, tx: &Transaction) -> Result<(), ValidationError> {
        let issued = match &tx.kind {
            TransactionKind::Mint { amount, .. } | TransactionKind::Reward { amount, .. } => *amount,
            TransactionKind::Appeal {
                receiver, amount, ..
            } => (amount - state.escrowed_for(receiver)).max(0.0),
            _ => return Ok(()),
        };
        if state.total_supply() + issued > self.params.max_supply {
            return Err(ValidationError::SupplyCapExceeded {
                total_supply: state.total_supply(),
                amount: issued,
                max_supply: self.params.max_supply,
            });
        }
        Ok(())
    }

    fn check_appeal_authority(&self, tx: &Transaction) -> Result<(), ValidationError> {
        match &tx.kind {
            TransactionKind::Appeal { sender, .. } if *sender != self.governance_wallet => {
                Err(ValidationError::UnauthorizedAppeal {
                    sender: sender.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn check_vesting(
        &self,
        state: &LedgerState,
        tx: &Transaction,
        at: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        let Some((sender, amount)) = voluntary_outflow(&tx.kind) else {
            return Ok(());
        };
        let Some((_, allocation)) = self.vesting_allocations.iter().find(|(a, _)| a == sender) else {
            return Ok(());
        };

        let schedule = &self.params.vesting_schedule;
        let years_passed = years_between(self.genesis_time, at);
        let cliff = cliff_years(schedule);
        if years_passed < cliff {
            return Err(ValidationError::VestingCliff {
                address: sender.to_string(),
                years_passed,
                cliff_years: cliff,
            });
        }

        let unlocked = unlocked_amount(schedule, *allocation, years_passed);
        let already_spent = state.vesting_spent(sender);
        if already_spent + amount > unlocked {
            return Err(ValidationError::VestingLocked {
                address: sender.to_string(),
                unlocked,
                already_spent,
                amount,
            });
        }
        Ok(())
    }

    fn check_grant_cap(&self, tx: &Transaction) -> Result<(), ValidationError> {
        let Some((sender, amount)) = voluntary_outflow(&tx.kind) else {
            return Ok(());
        };
        let grant_amount = self.params.junior_validator_program.grant_amount;
        if self.params.grant_pools.iter().any(|p| p == sender) && amount > grant_amount {
            return Err(ValidationError::GrantExceeded {
                address: sender.to_string(),
                amount,
                grant_amount,
            });
        }
        Ok(())
    }

    fn check_funds(&self, state: &LedgerState, tx: &Transaction) -> Result<(), ValidationError> {
        match &tx.kind {
            TransactionKind::Transfer { sender, amount, .. }
            | TransactionKind::Stake { sender, amount }
            | TransactionKind::Penalty { sender, amount } => {
                let available = state.balance_of(sender);
                if available < *amount {
                    return Err(ValidationError::InsufficientBalance {
                        address: sender.clone(),
                        available,
                        required: *amount,
                    });
                }
            }
            TransactionKind::Unstake { sender, amount } | TransactionKind::Slash { sender, amount } => {
                let available = state.stake_of(sender);
                if available < *amount {
                    return Err(ValidationError::InsufficientStake {
                        address: sender.clone(),
                        available,
                        required: *amount,
                    });
                }
            }
            TransactionKind::Mint { .. }
            | TransactionKind::Reward { .. }
            | TransactionKind::Appeal { .. } => {}
        }
        Ok(())
    }
}

/// Sender and amount of transactions the sender chose to make.
fn voluntary_outflow(kind: &TransactionKind) -> Option<(&str, f64)> {
    match kind {
        TransactionKind::Transfer { sender, amount, .. } | TransactionKind::Stake { sender, amount } => {
            Some((sender, *amount))
        }
        _ => None,
    }
}
