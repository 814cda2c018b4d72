//! # Fork Resolution
//!
//! Independent miners on one genesis, reconciled through the resolver.

#[cfg(test)]
mod tests {
    use oe_02_ledger_store::LedgerStore;
    use oe_04_consensus::{BlockOutcome, ChainOutcome, ConsensusResolver, IgnoreReason, RejectReason};
    use proptest::prelude::*;
    use shared_types::{Block, TransactionType};

    use crate::fixtures::{alice_genesis, tx, TestMiner};

    fn resolver() -> ConsensusResolver {
        ConsensusResolver::from_genesis(&alice_genesis())
    }

    /// A chain of `len` blocks past genesis, sealed by the miner seeded with `seed`.
    fn mined_chain(seed: u8, len: usize) -> Vec<Block> {
        let mut store = LedgerStore::new(alice_genesis()).unwrap();
        let miner = TestMiner::new(&store, seed);
        for _ in 0..len {
            miner.extend(&mut store, Vec::new());
        }
        store.chain().to_vec()
    }

    #[test]
    fn test_longest_chain_wins_in_either_order() {
        let short = mined_chain(1, 2);
        let long = mined_chain(2, 3);

        let mut first = LedgerStore::new(alice_genesis()).unwrap();
        resolver().accept_chain(&mut first, short.clone()).unwrap();
        resolver().accept_chain(&mut first, long.clone()).unwrap();

        let mut second = LedgerStore::new(alice_genesis()).unwrap();
        resolver().accept_chain(&mut second, long.clone()).unwrap();
        let outcome = resolver().accept_chain(&mut second, short).unwrap();
        assert!(matches!(outcome, ChainOutcome::Ignored(IgnoreReason::NotLonger { local: 4, candidate: 3 })));

        assert_eq!(first.latest().hash, long[3].hash);
        assert_eq!(second.latest().hash, long[3].hash);
    }

    #[test]
    fn test_equal_length_keeps_incumbent() {
        let ours = mined_chain(1, 2);
        let theirs = mined_chain(2, 2);
        assert_ne!(ours[2].hash, theirs[2].hash);

        let mut store = LedgerStore::new(alice_genesis()).unwrap();
        resolver().accept_chain(&mut store, ours.clone()).unwrap();
        let outcome = resolver().accept_chain(&mut store, theirs).unwrap();

        assert!(!outcome.is_replaced());
        assert_eq!(store.latest().hash, ours[2].hash);
    }

    #[test]
    fn test_fork_switch_reports_orphans() {
        let mut local = LedgerStore::new(alice_genesis()).unwrap();
        let miner = TestMiner::new(&local, 1);
        let paid = tx(TransactionType::Transfer, "wallet_alice", "wallet_bob", 75.0);
        miner.extend(&mut local, vec![paid.clone()]);

        let rival = mined_chain(2, 2);
        let outcome = resolver().accept_chain(&mut local, rival.clone()).unwrap();

        let ChainOutcome::Replaced(report) = outcome else {
            panic!("expected the longer rival chain to win");
        };
        assert_eq!(report.fork_index, 1);
        assert_eq!((report.old_height, report.new_height), (1, 2));
        assert_eq!(report.orphaned.len(), 1);
        assert_eq!(report.orphaned[0].id, paid.id);
        assert!(!local.contains_transaction(&paid.id));
        assert_eq!(local.balance_of("wallet_bob"), 0.0);
        assert_eq!(local.latest().hash, rival[2].hash);
        local.verify_integrity().unwrap();
    }

    #[test]
    fn test_single_block_verdicts() {
        let chain = mined_chain(1, 2);
        let mut store = LedgerStore::new(alice_genesis()).unwrap();

        let ahead = resolver().accept_block(&mut store, chain[2].clone()).unwrap();
        match ahead {
            BlockOutcome::Rejected(reason) => assert!(reason.requires_sync()),
            other => panic!("unexpected outcome {other:?}"),
        }

        assert!(resolver().accept_block(&mut store, chain[1].clone()).unwrap().is_accepted());
        assert!(resolver().accept_block(&mut store, chain[2].clone()).unwrap().is_accepted());

        let again = resolver().accept_block(&mut store, chain[2].clone()).unwrap();
        assert!(matches!(
            again,
            BlockOutcome::Rejected(RejectReason::AlreadyKnown { .. } | RejectReason::Stale { .. })
        ));
        assert_eq!(store.height(), 2);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_replicas_converge_on_longest(lengths in proptest::collection::btree_set(1usize..5, 2..4)) {
            let chains: Vec<Vec<Block>> = lengths
                .iter()
                .enumerate()
                .map(|(i, len)| mined_chain(i as u8 + 1, *len))
                .collect();
            let longest = chains.last().unwrap().last().unwrap().hash.clone();

            let mut forward = LedgerStore::new(alice_genesis()).unwrap();
            for chain in &chains {
                resolver().accept_chain(&mut forward, chain.clone()).unwrap();
            }
            let mut backward = LedgerStore::new(alice_genesis()).unwrap();
            for chain in chains.iter().rev() {
                resolver().accept_chain(&mut backward, chain.clone()).unwrap();
            }

            prop_assert_eq!(&forward.latest().hash, &longest);
            prop_assert_eq!(&backward.latest().hash, &longest);
        }
    }
}
