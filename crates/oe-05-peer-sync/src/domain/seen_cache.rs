//! Bounded record of gossip already handled.
//!
//! Keys are `(sender_id, timestamp, type)`. When full, the oldest key is
//! evicted first.

use std::collections::{HashSet, VecDeque};

use shared_types::MessageKey;

#[derive(Debug)]
pub struct SeenMessageCache {
    capacity: usize,
    keys: HashSet<MessageKey>,
    order: VecDeque<MessageKey>,
}

impl SeenMessageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            keys: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.keys.contains(key)
    }

    /// Record `key`. Returns `false` if it was already present.
    pub fn insert(&mut self, key: MessageKey) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        self.keys.insert(key.clone());
        self.order.push_back(key);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
