//! # Pending Pool
//!
//! Transactions accepted by `record_transaction` wait here until a block
//! includes them. Arrival order is preserved and is the order in which the
//! builder offers them to the validator.
//!
//! ## Invariants
//!
//! - No two pending transactions share an id.
//! - The pool never holds more than `capacity` transactions.

use std::collections::{BTreeMap, HashMap};

use shared_types::{Block, Transaction};
use thiserror::Error;

pub const DEFAULT_POOL_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("Transaction {0} is already pending")]
    Duplicate(String),

    #[error("Pending pool is full ({capacity} transactions)")]
    Full { capacity: usize },
}

/// Arrival-ordered set of pending transactions.
#[derive(Debug)]
pub struct PendingPool {
    capacity: usize,
    next_seq: u64,
    by_seq: BTreeMap<u64, Transaction>,
    by_id: HashMap<String, u64>,
}

impl Default for PendingPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl PendingPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            next_seq: 0,
            by_seq: BTreeMap::new(),
            by_id: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.by_seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_seq.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Queue a transaction behind everything already pending.
    pub fn insert(&mut self, tx: Transaction) -> Result<(), PoolError> {
        if self.by_id.contains_key(&tx.id) {
            return Err(PoolError::Duplicate(tx.id));
        }
        if self.by_seq.len() >= self.capacity {
            return Err(PoolError::Full {
                capacity: self.capacity,
            });
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.by_id.insert(tx.id.clone(), seq);
        self.by_seq.insert(seq, tx);
        Ok(())
    }

    /// Up to `limit` pending transactions, oldest first, left in place.
    pub fn snapshot(&self, limit: usize) -> Vec<Transaction> {
        self.by_seq.values().take(limit).cloned().collect()
    }

    /// Remove and return everything, oldest first.
    pub fn drain(&mut self) -> Vec<Transaction> {
        self.by_id.clear();
        std::mem::take(&mut self.by_seq).into_values().collect()
    }

    pub fn remove(&mut self, id: &str) -> Option<Transaction> {
        let seq = self.by_id.remove(id)?;
        self.by_seq.remove(&seq)
    }

    /// Drop every transaction the block confirmed. Returns how many were removed.
    pub fn remove_included(&mut self, block: &Block) -> usize {
        block
            .transactions
            .iter()
            .filter(|tx| self.remove(&tx.id).is_some())
            .count()
    }
}
