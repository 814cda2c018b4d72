//! Persistent key layout.

pub const BLOCK_BY_INDEX_PREFIX: &str = "block/idx/";
pub const BLOCK_BY_HASH_PREFIX: &str = "block/hash/";
pub const TX_PREFIX: &str = "tx/";

/// Zero-padded so lexicographic key order is chain order.
pub fn block_by_index(index: u64) -> Vec<u8> {
    format!("{BLOCK_BY_INDEX_PREFIX}{index:020}").into_bytes()
}

pub fn block_by_hash(hash: &str) -> Vec<u8> {
    format!("{BLOCK_BY_HASH_PREFIX}{hash}").into_bytes()
}

pub fn transaction(id: &str) -> Vec<u8> {
    format!("{TX_PREFIX}{id}").into_bytes()
}
