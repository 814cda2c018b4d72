//! # Ledger Flows
//!
//! End-to-end behaviour of the state machine, block production and the
//! store, driven the way a node drives them.

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use oe_02_ledger_store::{InMemoryKVStore, LedgerStore};
    use oe_04_consensus::{ChainOutcome, ConsensusResolver, IgnoreReason};
    use shared_types::{
        TransactionKind, TransactionType, DEFAULT_GOVERNANCE_WALLET, DEFAULT_GRANT_POOL, ESCROW_ADDRESS,
        RECYCLING_TREASURY,
    };

    use crate::fixtures::{alice_genesis, tx, TestMiner};

    // =============================================================================
    // TRANSFERS
    // =============================================================================

    #[test]
    fn test_transfer_then_overdraw_is_left_out() {
        let mut store = LedgerStore::new(alice_genesis()).unwrap();
        let miner = TestMiner::new(&store, 1);

        let pay_bob = tx(TransactionType::Transfer, "wallet_alice", "wallet_bob", 500.0);
        let b1 = miner.extend(&mut store, vec![pay_bob]);
        assert_eq!(b1.index, 1);
        assert_eq!(store.balance_of("wallet_alice"), 999_500.0);
        assert_eq!(store.balance_of("wallet_bob"), 500.0);

        let overdraw = tx(TransactionType::Transfer, "wallet_alice", "wallet_carol", 2_000_000.0);
        let small = tx(TransactionType::Transfer, "wallet_alice", "wallet_carol", 25.0);
        let b2 = miner.extend(&mut store, vec![overdraw.clone(), small.clone()]);

        assert_eq!(b2.transactions.len(), 1);
        assert_eq!(b2.transactions[0].id, small.id);
        assert!(!store.contains_transaction(&overdraw.id));
        assert_eq!(store.balance_of("wallet_carol"), 25.0);
        assert_eq!(store.balance_of("wallet_alice"), 999_475.0);

        // Every non-genesis block paid its signer.
        assert_eq!(store.balance_of(&b2.signer_id), 10.0);
        store.verify_integrity().unwrap();
    }

    #[test]
    fn test_history_lists_confirmed_transactions_per_address() {
        let mut store = LedgerStore::new(alice_genesis()).unwrap();
        let miner = TestMiner::new(&store, 1);
        miner.extend(
            &mut store,
            vec![
                tx(TransactionType::Transfer, "wallet_alice", "wallet_bob", 1.0),
                tx(TransactionType::Transfer, "wallet_alice", "wallet_carol", 2.0),
            ],
        );
        miner.extend(&mut store, vec![tx(TransactionType::Transfer, "wallet_bob", "wallet_carol", 1.0)]);

        // two blocks of transfers plus the genesis MINT
        assert_eq!(store.transaction_history(None).len(), 4);
        let alice = store.transaction_history(Some("wallet_alice"));
        assert_eq!(alice.len(), 3);
        assert_eq!(alice[0].block_index, 0);
        assert_eq!(alice[0].transaction.kind.tx_type(), TransactionType::Mint);
        assert_eq!(alice[0].transaction.kind.amount(), 1_000_000.0);
        let carol = store.transaction_history(Some("wallet_carol"));
        assert_eq!(carol.len(), 2);
        assert_eq!(carol[0].block_index, 1);
        assert_eq!(carol[1].block_index, 2);
        assert!(store.transaction_history(Some("wallet_nobody")).is_empty());
    }

    // =============================================================================
    // STAKING AND ESCROW
    // =============================================================================

    #[test]
    fn test_stake_slash_unstake() {
        let mut store = LedgerStore::new(alice_genesis()).unwrap();
        let miner = TestMiner::new(&store, 1);

        miner.extend(&mut store, vec![tx(TransactionType::Stake, "wallet_alice", "", 40_000.0)]);
        assert!(store.is_validator("wallet_alice"));
        miner.extend(&mut store, vec![tx(TransactionType::Slash, "wallet_alice", "", 20_000.0)]);
        assert_eq!(store.stake_of("wallet_alice"), 20_000.0);
        assert_eq!(store.balance_of(ESCROW_ADDRESS), 20_000.0);
        assert!(!store.is_validator("wallet_alice"));

        let before = store.balance_of("wallet_alice");
        miner.extend(&mut store, vec![tx(TransactionType::Unstake, "wallet_alice", "", 10_000.0)]);
        assert_eq!(store.stake_of("wallet_alice"), 10_000.0);
        assert_eq!(store.balance_of("wallet_alice"), before + 10_000.0);
    }

    #[test]
    fn test_stake_round_trip_restores_balances() {
        let mut store = LedgerStore::new(alice_genesis()).unwrap();
        let miner = TestMiner::new(&store, 1);
        let balance = store.balance_of("wallet_alice");

        miner.extend(
            &mut store,
            vec![
                tx(TransactionType::Stake, "wallet_alice", "", 12_345.0),
                tx(TransactionType::Unstake, "wallet_alice", "", 12_345.0),
            ],
        );
        assert_eq!(store.balance_of("wallet_alice"), balance);
        assert_eq!(store.stake_of("wallet_alice"), 0.0);
    }

    #[test]
    fn test_appeal_draws_escrow_and_remainder_is_recycled() {
        let mut genesis = alice_genesis();
        genesis.params.appeal_window_blocks = 2;
        let mut store = LedgerStore::new(genesis).unwrap();
        let miner = TestMiner::new(&store, 1);

        miner.extend(
            &mut store,
            vec![
                tx(TransactionType::Stake, "wallet_alice", "", 40_000.0),
                tx(TransactionType::Slash, "wallet_alice", "", 20_000.0),
            ],
        );
        let supply = store.total_supply();

        let appeal = tx(TransactionType::Appeal, DEFAULT_GOVERNANCE_WALLET, "wallet_alice", 5_000.0);
        let forged = tx(TransactionType::Appeal, "wallet_mallory", "wallet_mallory", 5_000.0);
        let b2 = miner.extend(&mut store, vec![appeal, forged]);
        assert_eq!(b2.transactions.len(), 1);
        assert_eq!(store.balance_of(ESCROW_ADDRESS), 15_000.0);
        assert_eq!(store.balance_of("wallet_mallory"), 0.0);
        // Paid from escrow, so only the block reward was issued.
        assert_eq!(store.total_supply(), supply + 5.0);

        // The slash entry from block 1 expires at block 3.
        miner.extend(&mut store, Vec::new());
        assert_eq!(store.balance_of(ESCROW_ADDRESS), 0.0);
        assert_eq!(store.balance_of(RECYCLING_TREASURY), 15_000.0);
        store.verify_integrity().unwrap();
    }

    // =============================================================================
    // VESTING
    // =============================================================================

    fn vesting_genesis(age_days: i64) -> shared_types::GenesisConfig {
        let mut genesis = alice_genesis();
        genesis.timestamp = (Utc::now() - Duration::days(age_days)).to_rfc3339();
        genesis
            .initial_balances
            .insert("founder_vesting_contract".into(), 8_000_000.0);
        genesis
    }

    #[test]
    fn test_vesting_contract_locked_before_cliff() {
        let mut store = LedgerStore::new(vesting_genesis(180)).unwrap();
        let miner = TestMiner::new(&store, 1);
        let early = tx(TransactionType::Transfer, "founder_vesting_contract", "wallet_bob", 1.0);
        let block = miner.extend(&mut store, vec![early]);
        assert!(block.transactions.is_empty());
        assert_eq!(store.balance_of("wallet_bob"), 0.0);
    }

    #[test]
    fn test_vesting_releases_one_year_tranche_after_cliff() {
        // A little over one year: 20% of 8M is unlocked.
        let mut store = LedgerStore::new(vesting_genesis(400)).unwrap();
        let miner = TestMiner::new(&store, 1);

        let first = tx(TransactionType::Transfer, "founder_vesting_contract", "wallet_bob", 1_500_000.0);
        let too_much = tx(TransactionType::Transfer, "founder_vesting_contract", "wallet_bob", 200_000.0);
        let rest = tx(TransactionType::Transfer, "founder_vesting_contract", "wallet_bob", 100_000.0);
        let block = miner.extend(&mut store, vec![first, too_much.clone(), rest]);

        assert_eq!(block.transactions.len(), 2);
        assert!(block.transactions.iter().all(|t| t.id != too_much.id));
        assert_eq!(store.balance_of("wallet_bob"), 1_600_000.0);
    }

    // =============================================================================
    // GRANTS AND INTEGRITY
    // =============================================================================

    #[test]
    fn test_grant_pool_outflow_is_capped() {
        let mut genesis = alice_genesis();
        genesis.initial_balances.insert(DEFAULT_GRANT_POOL.into(), 1_000_000.0);
        let mut store = LedgerStore::new(genesis).unwrap();
        let miner = TestMiner::new(&store, 1);

        let oversized = tx(TransactionType::Transfer, DEFAULT_GRANT_POOL, "junior", 32_001.0);
        let grant = tx(TransactionType::Transfer, DEFAULT_GRANT_POOL, "junior", 32_000.0);
        let block = miner.extend(&mut store, vec![oversized, grant.clone()]);

        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].id, grant.id);
        assert_eq!(store.balance_of("junior"), 32_000.0);
    }

    #[test]
    fn test_tampered_history_is_refused() {
        let mut store = LedgerStore::new(alice_genesis()).unwrap();
        let miner = TestMiner::new(&store, 1);
        miner.extend(&mut store, vec![tx(TransactionType::Transfer, "wallet_alice", "wallet_bob", 10.0)]);

        let mut replica = LedgerStore::new(alice_genesis()).unwrap();
        let mut forged: Vec<_> = store.chain().to_vec();
        if let TransactionKind::Transfer { amount, .. } = &mut forged[1].transactions[0].kind {
            *amount = 900_000.0;
        }
        forged.push(miner.mine(&store, Vec::new()));

        let resolver = ConsensusResolver::from_genesis(store.genesis());
        let outcome = resolver.accept_chain(&mut replica, forged).unwrap();
        assert!(matches!(outcome, ChainOutcome::Ignored(IgnoreReason::Seal { index: 1, .. })));
        assert_eq!(replica.height(), 0);
        store.verify_integrity().unwrap();
    }

    // =============================================================================
    // PERSISTENCE
    // =============================================================================

    #[test]
    fn test_restart_after_fork_switch_keeps_orphans_pending() {
        let backend = InMemoryKVStore::new();
        let mut local = LedgerStore::open(alice_genesis(), Box::new(backend.clone())).unwrap();
        let miner = TestMiner::new(&local, 1);
        let paid = tx(TransactionType::Transfer, "wallet_alice", "wallet_bob", 42.0);
        miner.extend(&mut local, vec![paid.clone()]);

        let mut rival_store = LedgerStore::new(alice_genesis()).unwrap();
        let rival = TestMiner::new(&rival_store, 2);
        rival.extend(&mut rival_store, Vec::new());
        rival.extend(&mut rival_store, Vec::new());

        let resolver = ConsensusResolver::from_genesis(local.genesis());
        let outcome = resolver.accept_chain(&mut local, rival_store.chain().to_vec()).unwrap();
        assert!(outcome.is_replaced());
        drop(local);

        let reopened = LedgerStore::open(alice_genesis(), Box::new(backend)).unwrap();
        assert_eq!(reopened.height(), 2);
        assert_eq!(reopened.latest().hash, rival_store.latest().hash);
        assert_eq!(reopened.balance_of("wallet_bob"), 0.0);
        let pending: Vec<_> = reopened.pending_transactions().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(pending, vec![paid.id]);
        reopened.verify_integrity().unwrap();
    }
}
