//! Domain layer: the pending pool and transaction selection.

pub mod pool;
pub mod selection;

pub use pool::{PendingPool, PoolError, DEFAULT_POOL_CAPACITY};
pub use selection::{select_transactions, Selection};
