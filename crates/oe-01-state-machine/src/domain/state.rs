//! # Ledger State
//!
//! Materialized view of the chain: liquid balances, stakes, and the escrow
//! ledger for slashed funds. Derived entirely from the genesis configuration
//! and the ordered transactions of the chain.
//!
//! ## Invariants
//!
//! - No balance or stake is negative (guaranteed by admission).
//! - `total_supply` equals the sum of all balances plus all stakes.
//! - `balances[ESCROW_ADDRESS]` equals the sum of pending escrow entries.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shared_types::{
    Address, GenesisConfig, Transaction, TransactionKind, ESCROW_ADDRESS, RECYCLING_TREASURY,
};

/// Funds confiscated by SLASH or PENALTY, awaiting appeal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscrowEntry {
    pub offender: Address,
    pub amount: f64,
    /// Height of the block that confiscated the funds.
    pub height: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerState {
    balances: BTreeMap<Address, f64>,
    stakes: BTreeMap<Address, f64>,
    escrow: Vec<EscrowEntry>,
    /// Cumulative voluntary outflows of vesting addresses.
    vesting_spent: BTreeMap<Address, f64>,
    total_supply: f64,
}

impl LedgerState {
    /// State immediately after genesis.
    pub fn from_genesis(genesis: &GenesisConfig) -> Self {
        let balances: BTreeMap<_, _> = genesis
            .initial_balances
            .iter()
            .filter(|(_, amount)| **amount > 0.0)
            .map(|(a, v)| (a.clone(), *v))
            .collect();
        let stakes: BTreeMap<_, _> = genesis
            .initial_stakes
            .iter()
            .filter(|(_, amount)| **amount > 0.0)
            .map(|(a, v)| (a.clone(), *v))
            .collect();
        Self {
            balances,
            stakes,
            escrow: Vec::new(),
            vesting_spent: BTreeMap::new(),
            total_supply: genesis.allocated_supply(),
        }
    }

    pub fn balance_of(&self, address: &str) -> f64 {
        self.balances.get(address).copied().unwrap_or(0.0)
    }

    pub fn stake_of(&self, address: &str) -> f64 {
        self.stakes.get(address).copied().unwrap_or(0.0)
    }

    pub fn total_supply(&self) -> f64 {
        self.total_supply
    }

    /// Supply recomputed from scratch, for audits.
    pub fn computed_supply(&self) -> f64 {
        self.balances.values().sum::<f64>() + self.stakes.values().sum::<f64>()
    }

    pub fn vesting_spent(&self, address: &str) -> f64 {
        self.vesting_spent.get(address).copied().unwrap_or(0.0)
    }

    pub fn escrow_entries(&self) -> &[EscrowEntry] {
        &self.escrow
    }

    /// Pending escrow held against `offender`.
    pub fn escrowed_for(&self, offender: &str) -> f64 {
        self.escrow
            .iter()
            .filter(|e| e.offender == offender)
            .map(|e| e.amount)
            .sum()
    }

    pub fn balances(&self) -> &BTreeMap<Address, f64> {
        &self.balances
    }

    pub fn stakes(&self) -> &BTreeMap<Address, f64> {
        &self.stakes
    }

    /// Addresses staking at least `min_stake`, ordered by address.
    pub fn validators(&self, min_stake: f64) -> Vec<(Address, f64)> {
        self.stakes
            .iter()
            .filter(|(_, s)| **s >= min_stake)
            .map(|(a, s)| (a.clone(), *s))
            .collect()
    }

    /// Apply an admitted transaction.
    ///
    /// `height` is the index of the enclosing block; `vesting` lists the
    /// addresses whose outflows count towards their vesting cap. The caller
    /// must have run admission against this state first.
    pub fn apply_transaction(&mut self, tx: &Transaction, height: u64, vesting: &[Address]) {
        match &tx.kind {
            TransactionKind::Transfer {
                sender,
                receiver,
                amount,
            } => {
                self.debit(sender, *amount);
                self.credit(receiver, *amount);
                self.track_vesting(sender, *amount, vesting);
            }
            TransactionKind::Stake { sender, amount } => {
                self.debit(sender, *amount);
                *self.stakes.entry(sender.clone()).or_insert(0.0) += amount;
                self.track_vesting(sender, *amount, vesting);
            }
            TransactionKind::Unstake { sender, amount } => {
                self.unstake(sender, *amount);
                self.credit(sender, *amount);
            }
            TransactionKind::Slash { sender, amount } => {
                self.unstake(sender, *amount);
                self.escrow(sender, *amount, height);
            }
            TransactionKind::Penalty { sender, amount } => {
                self.debit(sender, *amount);
                self.escrow(sender, *amount, height);
            }
            TransactionKind::Mint { receiver, amount }
            | TransactionKind::Reward { receiver, amount } => {
                self.credit(receiver, *amount);
                self.total_supply += amount;
            }
            TransactionKind::Appeal {
                receiver, amount, ..
            } => {
                let drawn = self.draw_escrow(receiver, *amount);
                self.credit(receiver, *amount);
                self.total_supply += amount - drawn;
            }
        }
    }

    /// Credit the block reward to `signer`, clipped so total supply never
    /// passes `max_supply`. Returns the amount actually credited.
    pub fn apply_block_reward(&mut self, signer: &str, reward: f64, max_supply: f64) -> f64 {
        let credited = reward.min((max_supply - self.total_supply).max(0.0));
        if credited > 0.0 {
            self.credit(signer, credited);
            self.total_supply += credited;
        }
        credited
    }

    /// Move escrow entries whose appeal window has closed at `height` to the
    /// recycling treasury. Returns the total released.
    pub fn release_from_escrow(&mut self, height: u64, appeal_window: u64) -> f64 {
        let (expired, pending): (Vec<_>, Vec<_>) = self
            .escrow
            .drain(..)
            .partition(|e| e.height.saturating_add(appeal_window) <= height);
        self.escrow = pending;

        let released: f64 = expired.iter().map(|e| e.amount).sum();
        if released > 0.0 {
            self.debit(ESCROW_ADDRESS, released);
            self.credit(RECYCLING_TREASURY, released);
            tracing::debug!(height, released, entries = expired.len(), "Released escrow to treasury");
        }
        released
    }

    fn credit(&mut self, address: &str, amount: f64) {
        *self.balances.entry(address.to_string()).or_insert(0.0) += amount;
    }

    fn debit(&mut self, address: &str, amount: f64) {
        let entry = self.balances.entry(address.to_string()).or_insert(0.0);
        *entry -= amount;
        if *entry <= 0.0 {
            self.balances.remove(address);
        }
    }

    fn unstake(&mut self, address: &str, amount: f64) {
        let entry = self.stakes.entry(address.to_string()).or_insert(0.0);
        *entry -= amount;
        if *entry <= 0.0 {
            self.stakes.remove(address);
        }
    }

    fn escrow(&mut self, offender: &str, amount: f64, height: u64) {
        self.credit(ESCROW_ADDRESS, amount);
        self.escrow.push(EscrowEntry {
            offender: offender.to_string(),
            amount,
            height,
        });
    }

    /// Take up to `amount` from `offender`'s escrow entries, oldest first.
    fn draw_escrow(&mut self, offender: &str, amount: f64) -> f64 {
        let mut remaining = amount;
        for entry in self.escrow.iter_mut().filter(|e| e.offender == offender) {
            if remaining <= 0.0 {
                break;
            }
            let take = entry.amount.min(remaining);
            entry.amount -= take;
            remaining -= take;
        }
        self.escrow.retain(|e| e.amount > 0.0);

        let drawn = amount - remaining;
        if drawn > 0.0 {
            self.debit(ESCROW_ADDRESS, drawn);
        }
        drawn
    }

    fn track_vesting(&mut self, sender: &str, amount: f64, vesting: &[Address]) {
        if vesting.iter().any(|v| v == sender) {
            *self.vesting_spent.entry(sender.to_string()).or_insert(0.0) += amount;
        }
    }
}
