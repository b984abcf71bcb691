//! End-to-end flow scenarios: mining, transfer, cross-chain deps.

use crate::{alf, keypair, signed_transfer, TestNode};
use flow_consensus::params::MINIMAL_GAS;
use flow_handler::DataOrigin;
use flow_types::{ChainIndex, Transaction};

// ============ Single-Group Lifecycle ============

#[test]
fn test_mine_and_accept_block() {
    let mut node = TestNode::new(1, 16);
    let (_, pk) = keypair(1);
    let block = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);

    node.add_block(block.clone(), DataOrigin::Local);
    assert!(node.has_block(&block));

    // The coinbase UTXO is live in the block's resulting world state.
    let coinbase = block.coinbase().unwrap();
    let reward_ref = coinbase.fixed_output_refs(1)[0];
    let state = node
        .flow
        .get_trie(&node.mine_block(ChainIndex::new(0, 0), &pk, vec![]))
        .unwrap();
    assert!(state.contains_asset(&reward_ref));
}

#[test]
fn test_transfer_across_blocks() {
    let mut node = TestNode::new(1, 16);
    let (sk, pk) = keypair(1);

    // Block 1 funds the key via its coinbase.
    let funding = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);
    let reward_ref = funding.coinbase().unwrap().fixed_output_refs(1)[0];
    node.add_block(funding.clone(), DataOrigin::Local);

    // Block 2 spends the reward.
    let transfer = signed_transfer(&sk, &pk, reward_ref, alf(3), alf(1), MINIMAL_GAS);
    let spend = node.mine_block(ChainIndex::new(0, 0), &pk, vec![transfer.clone()]);
    node.add_block(spend.clone(), DataOrigin::Local);
    assert!(node.has_block(&spend));

    // The spent UTXO is gone and the transfer outputs are live.
    let probe = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);
    let state = node.flow.get_trie(&probe).unwrap();
    assert!(!state.contains_asset(&reward_ref));
    for output_ref in transfer.fixed_output_refs(1) {
        assert!(state.contains_asset(&output_ref));
    }
}

#[test]
fn test_double_spend_across_blocks_rejected() {
    let mut node = TestNode::new(1, 16);
    let (sk, pk) = keypair(1);

    let funding = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);
    let reward_ref = funding.coinbase().unwrap().fixed_output_refs(1)[0];
    node.add_block(funding, DataOrigin::Local);

    let spend_a = signed_transfer(&sk, &pk, reward_ref, alf(3), alf(1), MINIMAL_GAS);
    let block_a = node.mine_block(ChainIndex::new(0, 0), &pk, vec![spend_a]);
    node.add_block(block_a.clone(), DataOrigin::Local);
    assert!(node.has_block(&block_a));

    // A later block re-spending the same UTXO is rejected: the ref no
    // longer exists on this branch.
    let spend_b = signed_transfer(&sk, &pk, reward_ref, alf(3), alf(2), MINIMAL_GAS);
    let block_b = node.mine_block(ChainIndex::new(0, 0), &pk, vec![spend_b]);
    node.add_block(block_b.clone(), DataOrigin::Remote);
    assert!(!node.has_block(&block_b));
}

// ============ Multi-Group DAG ============

#[test]
fn test_chain_index_invariant_on_mined_blocks() {
    let node = TestNode::new(2, 16);
    let (_, pk) = keypair(1);
    for from in 0..2 {
        for to in 0..2 {
            let index = ChainIndex::new(from, to);
            let block = node.mine_block(index, &pk, vec![]);
            assert_eq!(block.chain_index(2), index);
            assert!(block.header.satisfies_work());
        }
    }
}

#[test]
fn test_deps_reference_other_chain_tips() {
    let mut node = TestNode::new(2, 16);
    let (_, pk) = keypair(1);

    // Advance chain (1, 1) first.
    let other = node.mine_block(ChainIndex::new(1, 1), &pk, vec![]);
    node.add_block(other.clone(), DataOrigin::Local);

    // A template on (0, 0) must commit to the new (1, 1) tip.
    let block = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);
    let dep = block
        .header
        .chain_hash_of(ChainIndex::new(1, 1), 2)
        .unwrap();
    assert_eq!(dep, other.hash());

    node.add_block(block.clone(), DataOrigin::Local);
    assert!(node.has_block(&block));
}

#[test]
fn test_mined_blocks_clear_mempool() {
    let mut node = TestNode::new(1, 16);
    let (sk, pk) = keypair(1);

    let funding = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);
    let reward_ref = funding.coinbase().unwrap().fixed_output_refs(1)[0];
    node.add_block(funding, DataOrigin::Local);

    let transfer = signed_transfer(&sk, &pk, reward_ref, alf(3), alf(1), MINIMAL_GAS);
    node.mempool
        .add(transfer.clone(), ChainIndex::new(0, 0))
        .unwrap();

    // The template drains the mempool into the block; acceptance then
    // removes the tx from the pool.
    let template_txs: Vec<Transaction> = node
        .flow
        .prepare_block_flow(ChainIndex::new(0, 0))
        .unwrap()
        .transactions;
    assert_eq!(template_txs.len(), 1);

    let block = node.mine_block(ChainIndex::new(0, 0), &pk, template_txs);
    node.add_block(block.clone(), DataOrigin::Local);
    assert!(node.has_block(&block));
    assert!(!node.mempool.contains(&transfer.id()));
}
