//! # Ledger Store Service
//!
//! Owns the chain, the materialized state and the indices over both.
//! All writers go through `&mut self`; the node wraps the store in a
//! single-writer lock, so every method here can assume exclusive access.

use std::collections::{HashMap, HashSet};

use oe_01_state_machine::{BlockExecutor, BlockReceipt, LedgerState, TransactionValidator};
use shared_types::{Address, Block, BlockHash, GenesisConfig, Transaction};
use tracing::{debug, info, warn};

use crate::domain::keys;
use crate::domain::{
    verify_seal, ChainLinkError, IntegrityError, StoreError, StoredTransaction, TransactionRecord,
};
use crate::ports::outbound::{BatchOperation, KeyValueStore};

/// Chain plus everything derived from it.
#[derive(Debug, Clone)]
struct ChainView {
    blocks: Vec<Block>,
    state: LedgerState,
    by_hash: HashMap<BlockHash, u64>,
    tx_locations: HashMap<String, u64>,
}

impl ChainView {
    fn from_genesis(genesis_block: Block, state: LedgerState) -> Self {
        let mut by_hash = HashMap::new();
        by_hash.insert(genesis_block.hash.clone(), 0);
        let tx_locations = genesis_block.transactions.iter().map(|tx| (tx.id.clone(), 0)).collect();
        Self {
            blocks: vec![genesis_block],
            state,
            by_hash,
            tx_locations,
        }
    }

    fn tip(&self) -> &Block {
        // A view is never constructed without its genesis block.
        &self.blocks[self.blocks.len() - 1]
    }

    /// Check that `block` extends the tip and compute the resulting state.
    fn prepare(
        &self,
        executor: &BlockExecutor,
        block: &Block,
    ) -> Result<(LedgerState, BlockReceipt), ChainLinkError> {
        let tip = self.tip();
        let expected = tip.index + 1;
        if block.index != expected {
            return Err(ChainLinkError::IndexMismatch {
                expected,
                got: block.index,
            });
        }
        if block.previous_hash != tip.hash {
            return Err(ChainLinkError::PreviousHashMismatch {
                index: block.index,
                expected: tip.hash.clone(),
                got: block.previous_hash.clone(),
            });
        }
        if let Some(tx) = block
            .transactions
            .iter()
            .find(|tx| self.tx_locations.contains_key(&tx.id))
        {
            return Err(ChainLinkError::DuplicateTransaction(tx.id.clone()));
        }
        executor
            .execute(&self.state, block)
            .map_err(|source| ChainLinkError::Execution {
                index: block.index,
                source,
            })
    }

    fn commit(&mut self, block: Block, state: LedgerState) {
        for tx in &block.transactions {
            self.tx_locations.insert(tx.id.clone(), block.index);
        }
        self.by_hash.insert(block.hash.clone(), block.index);
        self.blocks.push(block);
        self.state = state;
    }

    fn extend(&mut self, executor: &BlockExecutor, block: Block) -> Result<BlockReceipt, ChainLinkError> {
        let (state, receipt) = self.prepare(executor, &block)?;
        self.commit(block, state);
        Ok(receipt)
    }
}

/// A fully replayed alternative chain, ready to be swapped in.
#[derive(Debug, Clone)]
pub struct CandidateChain {
    view: ChainView,
}

impl CandidateChain {
    pub fn height(&self) -> u64 {
        self.view.tip().index
    }

    pub fn len(&self) -> usize {
        self.view.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.blocks.is_empty()
    }

    pub fn tip_hash(&self) -> &str {
        &self.view.tip().hash
    }

    pub fn state(&self) -> &LedgerState {
        &self.view.state
    }

    pub fn blocks(&self) -> &[Block] {
        &self.view.blocks
    }
}

/// Outcome of swapping in a longer chain.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaceReport {
    pub old_height: u64,
    pub new_height: u64,
    /// Index of the first block that differs between the two chains.
    pub fork_index: u64,
    /// Transactions that were on the old chain but not on the new one.
    pub orphaned: Vec<Transaction>,
}

/// The node's ledger: chain, state, indices and persistence.
pub struct LedgerStore {
    genesis: GenesisConfig,
    executor: BlockExecutor,
    view: ChainView,
    backend: Option<Box<dyn KeyValueStore>>,
}

impl std::fmt::Debug for LedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerStore")
            .field("height", &self.height())
            .field("tip", &self.latest().hash)
            .field("persistent", &self.backend.is_some())
            .finish()
    }
}

impl LedgerStore {
    /// In-memory ledger holding only the genesis block.
    pub fn new(genesis: GenesisConfig) -> Result<Self, StoreError> {
        genesis.validate()?;
        let executor = BlockExecutor::new(&genesis)?;
        let view = ChainView::from_genesis(genesis.genesis_block()?, LedgerState::from_genesis(&genesis));
        Ok(Self {
            genesis,
            executor,
            view,
            backend: None,
        })
    }

    /// Open a persistent ledger, replaying every stored block from genesis.
    ///
    /// An empty backend is initialised with the genesis block. A backend
    /// holding a different genesis is refused.
    pub fn open(genesis: GenesisConfig, backend: Box<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let mut store = Self::new(genesis)?;
        let stored = backend.prefix_scan(keys::BLOCK_BY_INDEX_PREFIX.as_bytes())?;
        store.backend = Some(backend);

        if stored.is_empty() {
            let genesis_block = store.latest().clone();
            store.persist(block_ops(&genesis_block)?)?;
            info!(genesis_hash = %genesis_block.hash, "Initialised empty ledger with genesis block");
            return Ok(store);
        }

        let mut blocks = stored.into_iter().map(|(key, value)| {
            serde_json::from_slice::<Block>(&value).map_err(|e| StoreError::Corrupt {
                key: String::from_utf8_lossy(&key).into_owned(),
                reason: e.to_string(),
            })
        });

        let first = blocks.next().ok_or(ChainLinkError::EmptyChain)??;
        if first.hash != store.latest().hash {
            return Err(ChainLinkError::GenesisMismatch {
                expected: store.latest().hash.clone(),
                got: first.hash,
            }
            .into());
        }
        for block in blocks {
            let block = block?;
            let index = block.index;
            store
                .view
                .extend(&store.executor, block)
                .map_err(|e| StoreError::Corrupt {
                    key: String::from_utf8_lossy(&keys::block_by_index(index)).into_owned(),
                    reason: e.to_string(),
                })?;
        }
        info!(height = store.height(), tip = %store.latest().hash, "Replayed persisted ledger");
        Ok(store)
    }

    pub fn genesis(&self) -> &GenesisConfig {
        &self.genesis
    }

    pub fn genesis_hash(&self) -> &str {
        &self.view.blocks[0].hash
    }

    pub fn executor(&self) -> &BlockExecutor {
        &self.executor
    }

    pub fn validator(&self) -> &TransactionValidator {
        self.executor.validator()
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// Append a block that extends the current tip.
    ///
    /// Checks linkage and executes every transaction; does not check the
    /// seal (see [`verify_seal`]). Nothing changes on failure.
    pub fn append(&mut self, block: Block) -> Result<BlockReceipt, StoreError> {
        let (state, receipt) = self.view.prepare(&self.executor, &block)?;
        self.persist(block_ops(&block)?)?;

        debug!(
            block_height = block.index,
            block_hash = %block.hash,
            transactions = block.transactions.len(),
            "Appended block"
        );
        self.view.commit(block, state);
        Ok(receipt)
    }

    /// Persist a transaction as pending (no block yet).
    pub fn record_pending(&mut self, tx: &Transaction) -> Result<(), StoreError> {
        if self.backend.is_none() || self.view.tx_locations.contains_key(&tx.id) {
            return Ok(());
        }
        let record = StoredTransaction {
            transaction: tx.clone(),
            block_hash: None,
        };
        self.persist(vec![BatchOperation::put(keys::transaction(&tx.id), encode(&record)?)])
    }

    /// Drop a pending transaction record.
    pub fn forget_pending(&mut self, id: &str) -> Result<(), StoreError> {
        if self.view.tx_locations.contains_key(id) {
            return Ok(());
        }
        self.persist(vec![BatchOperation::delete(keys::transaction(id))])
    }

    /// Pending transactions that survived in the backend, oldest key first.
    pub fn pending_transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        let Some(backend) = &self.backend else {
            return Ok(Vec::new());
        };
        let mut pending = Vec::new();
        for (key, value) in backend.prefix_scan(keys::TX_PREFIX.as_bytes())? {
            let record: StoredTransaction =
                serde_json::from_slice(&value).map_err(|e| StoreError::Corrupt {
                    key: String::from_utf8_lossy(&key).into_owned(),
                    reason: e.to_string(),
                })?;
            if record.block_hash.is_none() {
                pending.push(record.transaction);
            }
        }
        Ok(pending)
    }

    /// Replay `blocks` from genesis into a detached candidate.
    ///
    /// The candidate must start with this ledger's genesis block. Seals are
    /// not checked here.
    pub fn build_candidate(&self, blocks: Vec<Block>) -> Result<CandidateChain, ChainLinkError> {
        let mut blocks = blocks.into_iter();
        let first = blocks.next().ok_or(ChainLinkError::EmptyChain)?;
        if first.hash != self.genesis_hash() {
            return Err(ChainLinkError::GenesisMismatch {
                expected: self.genesis_hash().to_string(),
                got: first.hash,
            });
        }

        let mut view = ChainView::from_genesis(first, LedgerState::from_genesis(&self.genesis));
        for block in blocks {
            view.extend(&self.executor, block)?;
        }
        Ok(CandidateChain { view })
    }

    /// Swap in a candidate chain in one step.
    ///
    /// Persistence happens first as one batch; the in-memory view is only
    /// replaced once the batch has been written.
    pub fn replace_chain(&mut self, candidate: CandidateChain) -> Result<ReplaceReport, StoreError> {
        let old = &self.view;
        let new = &candidate.view;
        let old_height = old.tip().index;
        let new_height = new.tip().index;

        let fork = old
            .blocks
            .iter()
            .zip(&new.blocks)
            .position(|(a, b)| a.hash != b.hash)
            .unwrap_or_else(|| old.blocks.len().min(new.blocks.len()));

        let retained: HashSet<&str> = new.tx_locations.keys().map(String::as_str).collect();
        let orphaned: Vec<Transaction> = old.blocks[fork..]
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|tx| !retained.contains(tx.id.as_str()))
            .cloned()
            .collect();

        if self.backend.is_some() {
            let mut ops = Vec::new();
            for block in &old.blocks[fork..] {
                ops.push(BatchOperation::delete(keys::block_by_index(block.index)));
                ops.push(BatchOperation::delete(keys::block_by_hash(&block.hash)));
            }
            for tx in &orphaned {
                let record = StoredTransaction {
                    transaction: tx.clone(),
                    block_hash: None,
                };
                ops.push(BatchOperation::put(keys::transaction(&tx.id), encode(&record)?));
            }
            for block in &new.blocks[fork..] {
                ops.extend(block_ops(block)?);
            }
            self.persist(ops)?;
        }

        let report = ReplaceReport {
            old_height,
            new_height,
            fork_index: fork as u64,
            orphaned,
        };
        self.view = candidate.view;

        info!(
            old_height = report.old_height,
            new_height = report.new_height,
            fork_index = report.fork_index,
            orphaned = report.orphaned.len(),
            "Replaced chain"
        );
        Ok(report)
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub fn latest(&self) -> &Block {
        self.view.tip()
    }

    pub fn height(&self) -> u64 {
        self.view.tip().index
    }

    pub fn chain(&self) -> &[Block] {
        &self.view.blocks
    }

    pub fn block_at(&self, index: u64) -> Option<&Block> {
        usize::try_from(index).ok().and_then(|i| self.view.blocks.get(i))
    }

    pub fn block_by_hash(&self, hash: &str) -> Option<&Block> {
        self.view.by_hash.get(hash).and_then(|i| self.block_at(*i))
    }

    pub fn state(&self) -> &LedgerState {
        &self.view.state
    }

    pub fn balance_of(&self, address: &str) -> f64 {
        self.view.state.balance_of(address)
    }

    pub fn stake_of(&self, address: &str) -> f64 {
        self.view.state.stake_of(address)
    }

    pub fn total_supply(&self) -> f64 {
        self.view.state.total_supply()
    }

    /// Whether `address` stakes enough to act as a validator.
    pub fn is_validator(&self, address: &str) -> bool {
        self.stake_of(address) >= self.genesis.params.min_validator_stake
    }

    pub fn validators(&self) -> Vec<(Address, f64)> {
        self.view.state.validators(self.genesis.params.min_validator_stake)
    }

    pub fn contains_transaction(&self, id: &str) -> bool {
        self.view.tx_locations.contains_key(id)
    }

    pub fn transaction(&self, id: &str) -> Option<TransactionRecord> {
        let index = *self.view.tx_locations.get(id)?;
        let block = self.block_at(index)?;
        let tx = block.transactions.iter().find(|tx| tx.id == id)?;
        Some(record(block, tx))
    }

    /// Confirmed transactions in chain order, optionally only those
    /// involving `address`.
    pub fn transaction_history(&self, address: Option<&str>) -> Vec<TransactionRecord> {
        self.view
            .blocks
            .iter()
            .flat_map(|block| block.transactions.iter().map(move |tx| (block, tx)))
            .filter(|(_, tx)| address.map_or(true, |a| tx.kind.involves(a)))
            .map(|(block, tx)| record(block, tx))
            .collect()
    }

    /// Audit the whole chain: links, seals, and a replay from genesis that
    /// must reproduce the materialized state.
    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        let difficulty = self.genesis.params.difficulty;
        for (i, block) in self.view.blocks.iter().enumerate() {
            if i > 0 {
                let prev = &self.view.blocks[i - 1];
                if block.previous_hash != prev.hash || block.index != prev.index + 1 {
                    return Err(IntegrityError::BrokenLink { index: block.index });
                }
            }
            verify_seal(block, difficulty).map_err(|source| IntegrityError::Seal {
                index: block.index,
                source,
            })?;
        }

        let replayed = self
            .build_candidate(self.view.blocks.clone())
            .map_err(IntegrityError::Replay)?;
        if replayed.state() != &self.view.state {
            warn!(height = self.height(), "Replayed state diverges from materialized state");
            return Err(IntegrityError::StateDivergence);
        }

        let tracked = self.view.state.total_supply();
        let computed = self.view.state.computed_supply();
        if (tracked - computed).abs() > 1e-6 * tracked.max(1.0) {
            return Err(IntegrityError::SupplyMismatch { tracked, computed });
        }
        Ok(())
    }

    fn persist(&mut self, ops: Vec<BatchOperation>) -> Result<(), StoreError> {
        match self.backend.as_mut() {
            Some(backend) if !ops.is_empty() => Ok(backend.atomic_batch_write(ops)?),
            _ => Ok(()),
        }
    }
}

fn record(block: &Block, tx: &Transaction) -> TransactionRecord {
    TransactionRecord {
        transaction: tx.clone(),
        block_index: block.index,
        block_hash: block.hash.clone(),
        block_timestamp: block.timestamp.clone(),
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Encoding(e.to_string()))
}

/// Writes for one block: both block keys plus a confirmed record per transaction.
fn block_ops(block: &Block) -> Result<Vec<BatchOperation>, StoreError> {
    let mut ops = Vec::with_capacity(2 + block.transactions.len());
    ops.push(BatchOperation::put(keys::block_by_index(block.index), encode(block)?));
    ops.push(BatchOperation::put(
        keys::block_by_hash(&block.hash),
        block.index.to_string().into_bytes(),
    ));
    for tx in &block.transactions {
        let record = StoredTransaction {
            transaction: tx.clone(),
            block_hash: Some(block.hash.clone()),
        };
        ops.push(BatchOperation::put(keys::transaction(&tx.id), encode(&record)?));
    }
    Ok(ops)
}
