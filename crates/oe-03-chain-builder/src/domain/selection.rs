//! Pick the pending transactions that may go into the next block.

use chrono::{DateTime, Utc};
use oe_01_state_machine::{LedgerState, TransactionValidator, ValidationError};
use shared_types::Transaction;
use std::collections::HashSet;
use tracing::warn;

/// Result of running pending transactions through the validator.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Admitted transactions, in the order they will be applied.
    pub included: Vec<Transaction>,
    /// Transactions dropped from this block and the rule they broke.
    pub rejected: Vec<(Transaction, ValidationError)>,
    /// State after applying `included`.
    pub state: LedgerState,
}

/// Admit `pending` one by one against a scratch copy of `state`.
///
/// Each admitted transaction is applied before the next is checked, so two
/// transfers that are individually affordable but jointly overdraw the
/// sender keep only the first. At most `limit` transactions are included.
pub fn select_transactions(
    validator: &TransactionValidator,
    state: &LedgerState,
    pending: Vec<Transaction>,
    height: u64,
    at: DateTime<Utc>,
    limit: usize,
) -> Selection {
    let vesting = &validator.params().vesting_contracts;
    let mut scratch = state.clone();
    let mut included = Vec::new();
    let mut rejected = Vec::new();
    let mut seen = HashSet::new();

    for tx in pending {
        if included.len() >= limit {
            break;
        }
        if !seen.insert(tx.id.clone()) {
            continue;
        }
        match validator.admit(&scratch, &tx, at) {
            Ok(()) => {
                scratch.apply_transaction(&tx, height, vesting);
                included.push(tx);
            }
            Err(e) => {
                warn!(tx_id = %tx.id, tx_type = %tx.tx_type(), rule = e.rule(), "Dropping transaction: {}", e);
                rejected.push((tx, e));
            }
        }
    }

    Selection {
        included,
        rejected,
        state: scratch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared_types::{GenesisConfig, TransactionKind, TransactionType};

    fn setup() -> (TransactionValidator, LedgerState, DateTime<Utc>) {
        let mut config = GenesisConfig::default();
        config.initial_balances.clear();
        config.initial_balances.insert("a".into(), 1_000.0);
        config.initial_balances.insert("b".into(), 1_000.0);
        let at = config.genesis_time().unwrap();
        (
            TransactionValidator::new(&config).unwrap(),
            LedgerState::from_genesis(&config),
            at,
        )
    }

    #[test]
    fn test_duplicate_ids_selected_once() {
        let (validator, state, at) = setup();
        let tx = Transaction::new(TransactionKind::from_parts(TransactionType::Transfer, "a", "b", 1.0));
        let selection = select_transactions(&validator, &state, vec![tx.clone(), tx], 1, at, 10);
        assert_eq!(selection.included.len(), 1);
        assert!(selection.rejected.is_empty());
    }

    proptest! {
        #[test]
        fn prop_selection_never_overdraws(
            ops in prop::collection::vec((0usize..4, 0usize..2, 1u32..800), 0..40)
        ) {
            let (validator, state, at) = setup();
            let parties = ["a", "b"];
            let pending: Vec<_> = ops
                .into_iter()
                .map(|(kind, who, amount)| {
                    let sender = parties[who];
                    let receiver = parties[1 - who];
                    let ty = [
                        TransactionType::Transfer,
                        TransactionType::Stake,
                        TransactionType::Unstake,
                        TransactionType::Transfer,
                    ][kind];
                    Transaction::new(TransactionKind::from_parts(ty, sender, receiver, f64::from(amount)))
                })
                .collect();

            let total = pending.len();
            let selection = select_transactions(&validator, &state, pending, 1, at, usize::MAX);
            prop_assert_eq!(selection.included.len() + selection.rejected.len(), total);
            for party in parties {
                prop_assert!(selection.state.balance_of(party) >= 0.0);
                prop_assert!(selection.state.stake_of(party) >= 0.0);
            }
            let held: f64 = parties
                .iter()
                .map(|p| selection.state.balance_of(p) + selection.state.stake_of(p))
                .sum();
            prop_assert!((held - 2_000.0).abs() < 1e-6);
        }
    }
}
