//! # Core Ledger Entities
//!
//! ## Clusters
//!
//! - **Chain**: [`Block`], [`Transaction`], [`TransactionKind`]
//! - **Addresses**: well-known system accounts that the state machine
//!   credits or debits on behalf of the protocol.

use std::fmt;
use std::str::FromStr;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::hashing::{canonical_json, sha256_hex};
use crate::EncodingError;

/// An account identifier. Either a hex-encoded public key or a named
/// contract address such as `founder_vesting_contract`.
pub type Address = String;

/// Hex-encoded SHA-256 block hash.
pub type BlockHash = String;

/// `previous_hash` of the genesis block.
pub const GENESIS_PREVIOUS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Nominal sender of protocol-issued MINT and REWARD transactions.
pub const SYSTEM_ADDRESS: &str = "SYSTEM";

/// Account that holds slashed and penalised funds until the appeal window closes.
pub const ESCROW_ADDRESS: &str = "SLASHING_ESCROW";

/// Account that receives escrowed funds nobody appealed.
pub const RECYCLING_TREASURY: &str = "RECYCLING_TREASURY";

/// Sink for the burn protocol. Funds sent here stay counted in supply.
pub const BURN_ADDRESS: &str = "BURN_ADDRESS";

/// Current time as an RFC 3339 string with microsecond precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// The closed set of transaction types, without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Transfer,
    Stake,
    Unstake,
    Slash,
    Mint,
    Appeal,
    Reward,
    Penalty,
}

impl TransactionType {
    /// All variants, in wire order.
    pub const ALL: [TransactionType; 8] = [
        TransactionType::Transfer,
        TransactionType::Stake,
        TransactionType::Unstake,
        TransactionType::Slash,
        TransactionType::Mint,
        TransactionType::Appeal,
        TransactionType::Reward,
        TransactionType::Penalty,
    ];

    /// Wire name of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Transfer => "TRANSFER",
            TransactionType::Stake => "STAKE",
            TransactionType::Unstake => "UNSTAKE",
            TransactionType::Slash => "SLASH",
            TransactionType::Mint => "MINT",
            TransactionType::Appeal => "APPEAL",
            TransactionType::Reward => "REWARD",
            TransactionType::Penalty => "PENALTY",
        }
    }

    /// True for types that increase total supply.
    pub fn is_issuance(&self) -> bool {
        matches!(self, TransactionType::Mint | TransactionType::Reward)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown transaction type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown transaction type: {0}")]
pub struct UnknownTransactionType(pub String);

impl FromStr for TransactionType {
    type Err = UnknownTransactionType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownTransactionType(s.to_string()))
    }
}

/// A transaction's type together with the parties and amount it needs.
///
/// Serialized flat with a `type` tag, so the wire form is
/// `{"type": "TRANSFER", "sender": .., "receiver": .., "amount": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Move liquid balance from sender to receiver.
    Transfer {
        sender: Address,
        receiver: Address,
        amount: f64,
    },
    /// Lock liquid balance as stake.
    Stake { sender: Address, amount: f64 },
    /// Release stake back to liquid balance.
    Unstake { sender: Address, amount: f64 },
    /// Confiscate stake into escrow.
    Slash { sender: Address, amount: f64 },
    /// Issue new supply to the receiver.
    Mint { receiver: Address, amount: f64 },
    /// Governance-authorised restitution to the receiver.
    Appeal {
        sender: Address,
        receiver: Address,
        amount: f64,
    },
    /// Issue a protocol reward to the receiver.
    Reward { receiver: Address, amount: f64 },
    /// Confiscate liquid balance into escrow.
    Penalty { sender: Address, amount: f64 },
}

impl TransactionKind {
    /// Build a kind from the flat `(type, sender, receiver, amount)` form
    /// used by the external interface. Parties a type does not use are dropped.
    pub fn from_parts(
        tx_type: TransactionType,
        sender: impl Into<Address>,
        receiver: impl Into<Address>,
        amount: f64,
    ) -> Self {
        let sender = sender.into();
        let receiver = receiver.into();
        match tx_type {
            TransactionType::Transfer => TransactionKind::Transfer {
                sender,
                receiver,
                amount,
            },
            TransactionType::Stake => TransactionKind::Stake { sender, amount },
            TransactionType::Unstake => TransactionKind::Unstake { sender, amount },
            TransactionType::Slash => TransactionKind::Slash { sender, amount },
            TransactionType::Mint => TransactionKind::Mint { receiver, amount },
            TransactionType::Appeal => TransactionKind::Appeal {
                sender,
                receiver,
                amount,
            },
            TransactionType::Reward => TransactionKind::Reward { receiver, amount },
            TransactionType::Penalty => TransactionKind::Penalty { sender, amount },
        }
    }

    pub fn tx_type(&self) -> TransactionType {
        match self {
            TransactionKind::Transfer { .. } => TransactionType::Transfer,
            TransactionKind::Stake { .. } => TransactionType::Stake,
            TransactionKind::Unstake { .. } => TransactionType::Unstake,
            TransactionKind::Slash { .. } => TransactionType::Slash,
            TransactionKind::Mint { .. } => TransactionType::Mint,
            TransactionKind::Appeal { .. } => TransactionType::Appeal,
            TransactionKind::Reward { .. } => TransactionType::Reward,
            TransactionKind::Penalty { .. } => TransactionType::Penalty,
        }
    }

    pub fn amount(&self) -> f64 {
        match self {
            TransactionKind::Transfer { amount, .. }
            | TransactionKind::Stake { amount, .. }
            | TransactionKind::Unstake { amount, .. }
            | TransactionKind::Slash { amount, .. }
            | TransactionKind::Mint { amount, .. }
            | TransactionKind::Appeal { amount, .. }
            | TransactionKind::Reward { amount, .. }
            | TransactionKind::Penalty { amount, .. } => *amount,
        }
    }

    /// The debited or authorising party, if the type has one.
    pub fn sender(&self) -> Option<&str> {
        match self {
            TransactionKind::Transfer { sender, .. }
            | TransactionKind::Stake { sender, .. }
            | TransactionKind::Unstake { sender, .. }
            | TransactionKind::Slash { sender, .. }
            | TransactionKind::Appeal { sender, .. }
            | TransactionKind::Penalty { sender, .. } => Some(sender),
            TransactionKind::Mint { .. } | TransactionKind::Reward { .. } => None,
        }
    }

    /// The credited party, if the type has one.
    pub fn receiver(&self) -> Option<&str> {
        match self {
            TransactionKind::Transfer { receiver, .. }
            | TransactionKind::Mint { receiver, .. }
            | TransactionKind::Appeal { receiver, .. }
            | TransactionKind::Reward { receiver, .. } => Some(receiver),
            TransactionKind::Stake { .. }
            | TransactionKind::Unstake { .. }
            | TransactionKind::Slash { .. }
            | TransactionKind::Penalty { .. } => None,
        }
    }

    /// True if `address` is a party to this transaction.
    pub fn involves(&self, address: &str) -> bool {
        self.sender() == Some(address) || self.receiver() == Some(address)
    }
}

/// A ledger transaction. Immutable once included in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Globally unique identifier (UUID v4).
    pub id: String,
    #[serde(flatten)]
    pub kind: TransactionKind,
    /// Optional signature by the sender. Empty for protocol-issued transactions.
    #[serde(default)]
    pub signature: String,
    /// RFC 3339 creation time.
    pub timestamp: String,
    /// Cross-reference to an external record (burn proposal, appeal case, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Transaction {
    /// Create an unsigned transaction stamped with a fresh id and the current time.
    pub fn new(kind: TransactionKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            signature: String::new(),
            timestamp: now_rfc3339(),
            reference_id: None,
            description: None,
        }
    }

    pub fn with_reference(mut self, reference_id: Option<String>) -> Self {
        self.reference_id = reference_id;
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn tx_type(&self) -> TransactionType {
        self.kind.tx_type()
    }

    pub fn amount(&self) -> f64 {
        self.kind.amount()
    }

    /// Bytes a sender signs: the transaction without its signature.
    pub fn signing_payload(&self) -> Result<Vec<u8>, EncodingError> {
        let mut unsigned = self.clone();
        unsigned.signature = String::new();
        let mut value = serde_json::to_value(&unsigned)?;
        if let Value::Object(map) = &mut value {
            map.remove("signature");
        }
        canonical_json(&value)
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

/// A sealed block of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Height in the chain. Genesis is 0.
    pub index: u64,
    /// RFC 3339 sealing time.
    pub timestamp: String,
    /// Free-form metadata.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Hash of the parent block; 64 zeros for genesis.
    pub previous_hash: BlockHash,
    /// SHA-256 over the canonical form of every field except `hash` and `signature`.
    pub hash: BlockHash,
    /// Proof-of-work counter.
    pub nonce: u64,
    /// Hex public key of the sealing node. Empty for genesis.
    #[serde(default)]
    pub signer_id: String,
    /// Hex Ed25519 signature over the block without `signature`. Empty for genesis.
    #[serde(default)]
    pub signature: String,
}

/// Borrowed view of the hashed fields of a block.
#[derive(Serialize)]
struct HashedFields<'a> {
    index: u64,
    timestamp: &'a str,
    data: &'a Map<String, Value>,
    transactions: &'a [Transaction],
    previous_hash: &'a str,
    nonce: u64,
    signer_id: &'a str,
}

/// Borrowed view of the signed fields of a block.
#[derive(Serialize)]
struct SignedFields<'a> {
    #[serde(flatten)]
    hashed: HashedFields<'a>,
    hash: &'a str,
}

impl Block {
    /// Create an unsealed block: hash empty, nonce 0, unsigned.
    pub fn unsealed(
        index: u64,
        previous_hash: impl Into<BlockHash>,
        transactions: Vec<Transaction>,
        data: Map<String, Value>,
        signer_id: impl Into<String>,
    ) -> Self {
        Self {
            index,
            timestamp: now_rfc3339(),
            data,
            transactions,
            previous_hash: previous_hash.into(),
            hash: String::new(),
            nonce: 0,
            signer_id: signer_id.into(),
            signature: String::new(),
        }
    }

    fn hashed_fields(&self) -> HashedFields<'_> {
        HashedFields {
            index: self.index,
            timestamp: &self.timestamp,
            data: &self.data,
            transactions: &self.transactions,
            previous_hash: &self.previous_hash,
            nonce: self.nonce,
            signer_id: &self.signer_id,
        }
    }

    /// Canonical bytes that `hash` is computed over.
    pub fn hashing_payload(&self) -> Result<Vec<u8>, EncodingError> {
        canonical_json(&self.hashed_fields())
    }

    /// Recompute the block hash from its contents.
    pub fn compute_hash(&self) -> Result<BlockHash, EncodingError> {
        Ok(sha256_hex(&self.hashing_payload()?))
    }

    /// Canonical bytes that `signature` is computed over.
    pub fn signing_payload(&self) -> Result<Vec<u8>, EncodingError> {
        canonical_json(&SignedFields {
            hashed: self.hashed_fields(),
            hash: &self.hash,
        })
    }

    /// True if the stored hash matches the contents.
    pub fn hash_is_consistent(&self) -> bool {
        self.compute_hash().map(|h| h == self.hash).unwrap_or(false)
    }

    pub fn is_genesis(&self) -> bool {
        self.index == 0
    }

    /// Whether any transaction in this block involves `address`.
    pub fn involves(&self, address: &str) -> bool {
        self.transactions.iter().any(|tx| tx.kind.involves(address))
    }
}
