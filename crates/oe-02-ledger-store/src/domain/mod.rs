//! Domain layer: errors, key layout, block seals and stored records.

pub mod errors;
pub mod keys;
pub mod records;
pub mod seal;

pub use errors::{ChainLinkError, IntegrityError, StoreError};
pub use records::{StoredTransaction, TransactionRecord};
pub use seal::{verify_seal, SealError};
