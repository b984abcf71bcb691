//! Flow handler scenarios: pending buffer behavior and idempotence.

use crate::{keypair, TestNode};
use flow_handler::{DataOrigin, FlowCommand, FlowEvent};
use flow_types::ChainIndex;
use tokio::sync::oneshot;

// ============ Pending Buffer ============

#[test]
fn test_pending_promotion_cycle() {
    let mut node = TestNode::new(1, 16);
    let (_, pk) = keypair(1);

    let parent = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);

    // Build the child without accepting the parent locally: mine on a
    // twin node that has accepted it.
    let mut twin = TestNode::new(1, 16);
    twin.add_block(parent.clone(), DataOrigin::Remote);
    let child = twin.mine_block(ChainIndex::new(0, 0), &pk, vec![]);

    // Child first: parked, buffer 0 -> 1.
    assert_eq!(node.handler.pending_len(), 0);
    node.add_block(child.clone(), DataOrigin::Remote);
    assert_eq!(node.handler.pending_len(), 1);
    assert!(!node.has_block(&child));

    // Parent lands: buffer back to 0, child promoted and accepted.
    node.add_block(parent.clone(), DataOrigin::Remote);
    assert_eq!(node.handler.pending_len(), 0);
    assert!(node.has_block(&parent));
    assert!(node.has_block(&child));
}

#[test]
fn test_pending_overflow_keeps_newest() {
    let mut node = TestNode::new(1, 2);
    let (_, pk) = keypair(1);

    // Three children of three unseen parents: independent missing deps.
    let mut orphans = Vec::new();
    for seed in 0..3u8 {
        let mut twin = TestNode::new(1, 16);
        let parent = twin.mine_block(ChainIndex::new(0, 0), &pk, vec![]);
        twin.add_block(parent, DataOrigin::Remote);
        orphans.push(twin.mine_block(ChainIndex::new(0, 0), &keypair(seed + 10).1, vec![]));
    }

    for orphan in &orphans {
        node.add_block(orphan.clone(), DataOrigin::Remote);
    }
    // Capacity two: the oldest was evicted.
    assert_eq!(node.handler.pending_len(), 2);
}

// ============ Idempotence ============

#[test]
fn test_readd_accepted_block_emits_nothing() {
    let mut node = TestNode::new(1, 16);
    let (_, pk) = keypair(1);
    let block = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);

    node.add_block(block.clone(), DataOrigin::Remote);
    assert!(node.has_block(&block));

    let mut events = node.handle.subscribe();
    node.add_block(block.clone(), DataOrigin::Remote);
    assert!(events.try_recv().is_err());
}

// ============ Event Ordering ============

#[test]
fn test_add_completes_before_event() {
    let mut node = TestNode::new(1, 16);
    let (_, pk) = keypair(1);
    let block = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);

    let mut events = node.handle.subscribe();
    node.add_block(block.clone(), DataOrigin::Remote);

    // By the time the event is observable the block is queryable.
    match events.try_recv().unwrap() {
        FlowEvent::BlockAdded(hash) => {
            assert_eq!(hash, block.hash());
            assert!(node.has_block(&block));
        }
        other => unreachable!("unexpected event {other:?}"),
    }
}

// ============ Queries ============

#[tokio::test]
async fn test_sync_data_roundtrip() {
    let mut node = TestNode::new(1, 16);
    let (_, pk) = keypair(1);

    let genesis = node
        .flow
        .get_block_chain(ChainIndex::new(0, 0))
        .unwrap()
        .genesis_hash();
    let block = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);
    node.add_block(block.clone(), DataOrigin::Remote);

    let (reply_tx, reply_rx) = oneshot::channel();
    node.handler.handle_command(FlowCommand::GetSyncData {
        block_locators: vec![genesis],
        header_locators: vec![genesis],
        reply: reply_tx,
    });
    let data = reply_rx.await.unwrap();
    assert_eq!(data.blocks, vec![block.clone()]);
    assert_eq!(data.headers, vec![block.header]);
}
