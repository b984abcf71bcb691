//! Wire protocol scenarios.

use crate::{keypair, TestNode};
use bytes::BytesMut;
use flow_handler::DataOrigin;
use flow_network::{serviced_message, Message, MessageCodec};
use flow_types::{BrokerInfo, ChainIndex, NetworkId};
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn test_block_survives_the_wire() {
    let mut node = TestNode::new(1, 16);
    let (_, pk) = keypair(1);
    let block = node.mine_block(ChainIndex::new(0, 0), &pk, vec![]);

    // Encode on one side, decode on the other, feed the handler.
    let mut codec = MessageCodec::new(NetworkId::Devnet);
    let mut buf = BytesMut::new();
    codec
        .encode(Message::SendBlocks(vec![block.clone()]), &mut buf)
        .unwrap();
    let decoded = codec.decode(&mut buf).unwrap().unwrap();

    let Message::SendBlocks(blocks) = decoded else {
        unreachable!();
    };
    assert_eq!(blocks, vec![block.clone()]);

    for received in blocks {
        node.add_block(received, DataOrigin::Remote);
    }
    assert!(node.has_block(&block));
}

#[test]
fn test_mismatched_network_magic_fails() {
    let mut sender = MessageCodec::new(NetworkId::Mainnet);
    let mut receiver = MessageCodec::new(NetworkId::Devnet);

    let mut buf = BytesMut::new();
    sender.encode(Message::Pong { nonce: 1 }, &mut buf).unwrap();
    assert!(receiver.decode(&mut buf).is_err());
}

#[test]
fn test_solo_broker_services_everything() {
    let node = TestNode::new(2, 16);
    let (_, pk) = keypair(1);
    let block = node.mine_block(ChainIndex::new(1, 0), &pk, vec![]);
    let message = Message::SendBlocks(vec![block]);
    assert!(serviced_message(&message, &BrokerInfo::solo(), 2));
}
