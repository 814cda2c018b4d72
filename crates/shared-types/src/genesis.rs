//! # Genesis Configuration
//!
//! The `genesis.json` document that seeds the ledger, plus the protocol
//! parameters every node on a network must agree on.
//!
//! ```json
//! {
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "initial_balances": { "genesis_wallet": 10000000 },
//!   "initial_stakes": {},
//!   "governance_wallet": "GOVERNANCE_DAO_MULTI_SIG_V1",
//!   "params": {
//!     "vesting_schedule": { "cliff_months": 12, "duration_years": 5, "release_per_year": 0.2 },
//!     "block_reward": 5.0,
//!     "junior_validator_program": { "grant_amount": 32000 }
//!   }
//! }
//! ```
//!
//! The genesis block is derived deterministically from this document, so two
//! nodes share a chain exactly when they share a configuration.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    sha256_hex, Address, Block, GenesisError, Transaction, TransactionKind, TransactionType, GENESIS_PREVIOUS_HASH,
};

/// Default multi-signature governance wallet.
pub const DEFAULT_GOVERNANCE_WALLET: &str = "GOVERNANCE_DAO_MULTI_SIG_V1";

/// Default treasury allocation holder.
pub const DEFAULT_GENESIS_WALLET: &str = "genesis_wallet";

/// Default founder vesting contract address.
pub const DEFAULT_VESTING_CONTRACT: &str = "founder_vesting_contract";

/// Default ethical allocation (junior validator grant) pool.
pub const DEFAULT_GRANT_POOL: &str = "ethical_allocation_pool";

const DEFAULT_GENESIS_TIMESTAMP: &str = "2025-01-01T00:00:00Z";

/// Time-locked release schedule applied to vesting contract addresses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VestingSchedule {
    pub cliff_months: u32,
    pub duration_years: u32,
    /// Fraction of the initial allocation unlocked per full year.
    pub release_per_year: f64,
}

impl Default for VestingSchedule {
    fn default() -> Self {
        Self {
            cliff_months: 12,
            duration_years: 5,
            release_per_year: 0.20,
        }
    }
}

/// Grant cap for the junior validator program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JuniorValidatorProgram {
    pub grant_amount: f64,
}

impl Default for JuniorValidatorProgram {
    fn default() -> Self {
        Self {
            grant_amount: 32_000.0,
        }
    }
}

/// Network-wide protocol parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainParams {
    pub vesting_schedule: VestingSchedule,
    /// Amount credited to the signer of every non-genesis block.
    pub block_reward: f64,
    pub junior_validator_program: JuniorValidatorProgram,
    /// Hard cap on total supply.
    pub max_supply: f64,
    /// Required leading hex zeros of a block hash.
    pub difficulty: usize,
    /// Stake at or above which an address counts as a validator.
    pub min_validator_stake: f64,
    /// Blocks an escrow entry waits before release to the recycling treasury.
    pub appeal_window_blocks: u64,
    /// Addresses subject to the vesting schedule.
    pub vesting_contracts: Vec<Address>,
    /// Addresses whose outflows are capped at the grant amount.
    pub grant_pools: Vec<Address>,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self {
            vesting_schedule: VestingSchedule::default(),
            block_reward: 5.0,
            junior_validator_program: JuniorValidatorProgram::default(),
            max_supply: 100_000_000.0,
            difficulty: 2,
            min_validator_stake: 32_000.0,
            appeal_window_blocks: 100,
            vesting_contracts: vec![DEFAULT_VESTING_CONTRACT.to_string()],
            grant_pools: vec![DEFAULT_GRANT_POOL.to_string()],
        }
    }
}

/// Contents of `genesis.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisConfig {
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
    pub initial_balances: BTreeMap<Address, f64>,
    #[serde(default)]
    pub initial_stakes: BTreeMap<Address, f64>,
    #[serde(default = "default_governance_wallet")]
    pub governance_wallet: Address,
    #[serde(default)]
    pub params: ChainParams,
}

fn default_timestamp() -> String {
    DEFAULT_GENESIS_TIMESTAMP.to_string()
}

fn default_governance_wallet() -> Address {
    DEFAULT_GOVERNANCE_WALLET.to_string()
}

impl Default for GenesisConfig {
    fn default() -> Self {
        let mut initial_balances = BTreeMap::new();
        initial_balances.insert(DEFAULT_GENESIS_WALLET.to_string(), 10_000_000.0);
        Self {
            timestamp: default_timestamp(),
            initial_balances,
            initial_stakes: BTreeMap::new(),
            governance_wallet: default_governance_wallet(),
            params: ChainParams::default(),
        }
    }
}

impl GenesisConfig {
    /// Parse and validate a genesis document.
    pub fn from_json(raw: &str) -> Result<Self, GenesisError> {
        let config: GenesisConfig =
            serde_json::from_str(raw).map_err(|e| GenesisError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, falling back to [`GenesisConfig::default`] when the file
    /// does not exist. A file that exists but cannot be parsed is an error.
    pub fn load_or_default(path: &Path) -> Result<Self, GenesisError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "Genesis file not found, using built-in genesis");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|e| GenesisError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&raw)
    }

    /// Check amounts, parameters and timestamp.
    pub fn validate(&self) -> Result<(), GenesisError> {
        for (address, amount) in self.initial_balances.iter().chain(&self.initial_stakes) {
            if !amount.is_finite() || *amount < 0.0 {
                return Err(GenesisError::InvalidAmount {
                    address: address.clone(),
                    amount: *amount,
                });
            }
        }

        let p = &self.params;
        if !(p.max_supply.is_finite() && p.max_supply > 0.0) {
            return Err(GenesisError::InvalidParameter {
                name: "max_supply",
                reason: format!("must be positive, got {}", p.max_supply),
            });
        }
        let allocated = self.allocated_supply();
        if allocated > p.max_supply {
            return Err(GenesisError::ExceedsSupply {
                allocated,
                max_supply: p.max_supply,
            });
        }
        if !(p.block_reward.is_finite() && p.block_reward >= 0.0) {
            return Err(GenesisError::InvalidParameter {
                name: "block_reward",
                reason: format!("must be non-negative, got {}", p.block_reward),
            });
        }
        if p.difficulty > 64 {
            return Err(GenesisError::InvalidParameter {
                name: "difficulty",
                reason: format!("at most 64 hex digits, got {}", p.difficulty),
            });
        }
        let release = p.vesting_schedule.release_per_year;
        if !(release > 0.0 && release <= 1.0) {
            return Err(GenesisError::InvalidParameter {
                name: "vesting_schedule.release_per_year",
                reason: format!("must be in (0, 1], got {release}"),
            });
        }
        if !(p.junior_validator_program.grant_amount >= 0.0) {
            return Err(GenesisError::InvalidParameter {
                name: "junior_validator_program.grant_amount",
                reason: "must be non-negative".to_string(),
            });
        }
        self.genesis_time()?;
        Ok(())
    }

    /// Sum of every initial balance and stake.
    pub fn allocated_supply(&self) -> f64 {
        self.initial_balances.values().sum::<f64>() + self.initial_stakes.values().sum::<f64>()
    }

    /// Parsed genesis timestamp.
    pub fn genesis_time(&self) -> Result<DateTime<Utc>, GenesisError> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| GenesisError::InvalidTimestamp(self.timestamp.clone()))
    }

    /// Initial allocation of `address`, as used by the vesting cap.
    pub fn initial_allocation(&self, address: &str) -> f64 {
        self.initial_balances.get(address).copied().unwrap_or(0.0)
    }

    /// The allocations recorded in the genesis block.
    ///
    /// One MINT per positive initial balance, then MINT followed by STAKE per
    /// positive initial stake. They record the seeded state and are never
    /// executed; the ledger state is seeded from the same maps. Ids derive
    /// from the genesis timestamp, the type and the address.
    pub fn genesis_transactions(&self) -> Vec<Transaction> {
        let balances = self.initial_balances.iter().filter(|(_, amount)| **amount > 0.0);
        let stakes = self.initial_stakes.iter().filter(|(_, amount)| **amount > 0.0);

        let mut txs = Vec::new();
        for (address, amount) in balances {
            txs.push(self.genesis_transaction(TransactionKind::Mint {
                receiver: address.clone(),
                amount: *amount,
            }));
        }
        for (address, amount) in stakes {
            txs.push(self.genesis_transaction(TransactionKind::Mint {
                receiver: address.clone(),
                amount: *amount,
            }));
            txs.push(self.genesis_transaction(TransactionKind::Stake {
                sender: address.clone(),
                amount: *amount,
            }));
        }
        txs
    }

    fn genesis_transaction(&self, kind: TransactionKind) -> Transaction {
        let party = match &kind {
            TransactionKind::Stake { sender, .. } => sender.as_str(),
            TransactionKind::Mint { receiver, .. } => receiver.as_str(),
            _ => "",
        };
        let seed = format!("genesis|{}|{}|{}", self.timestamp, kind.tx_type(), party);
        let description = match kind.tx_type() {
            TransactionType::Stake => "genesis stake",
            _ => "genesis allocation",
        };
        Transaction {
            id: sha256_hex(seed.as_bytes()),
            kind,
            signature: String::new(),
            timestamp: self.timestamp.clone(),
            reference_id: None,
            description: Some(description.to_string()),
        }
    }

    /// Derive the genesis block. Unsigned, not mined, identical on every node.
    pub fn genesis_block(&self) -> Result<Block, GenesisError> {
        let mut data = Map::new();
        data.insert("type".to_string(), Value::String("genesis".to_string()));
        data.insert(
            "config".to_string(),
            serde_json::to_value(self).map_err(|e| GenesisError::Malformed(e.to_string()))?,
        );

        let mut block = Block {
            index: 0,
            timestamp: self.timestamp.clone(),
            data,
            transactions: self.genesis_transactions(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            hash: String::new(),
            nonce: 0,
            signer_id: String::new(),
            signature: String::new(),
        };
        block.hash = block.compute_hash()?;
        Ok(block)
    }
}
