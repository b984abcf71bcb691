//! # flow-handler
//!
//! The serializing agent that owns the BlockFlow.
//!
//! One task consumes a bounded command channel; it is the sole writer of
//! the flow. Incoming blocks and headers whose dependencies are not yet
//! present are parked in a bounded pending buffer and promoted when their
//! last dependency lands. Progress is published on a broadcast event bus,
//! and a registered miner receives template notifications.

mod handler;
mod pending;

pub use handler::{FlowCommand, FlowHandle, FlowHandler, MinerEvent, SyncData};
pub use pending::{PendingBuffer, PendingItem};

use flow_types::{Block, BlockHeader, Hash};

/// Where an item came from; local origin means our own miner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataOrigin {
    /// Produced by the local miner.
    Local,
    /// Received from a peer.
    Remote,
}

/// A block or a bare header moving through the handler.
#[derive(Debug, Clone)]
pub enum FlowData {
    /// A header without its body.
    Header(Box<BlockHeader>),
    /// A full block.
    Block(Box<Block>),
}

impl FlowData {
    /// The item's hash.
    pub fn hash(&self) -> Hash {
        match self {
            FlowData::Header(header) => header.hash(),
            FlowData::Block(block) => block.hash(),
        }
    }

    /// The item's header.
    pub fn header(&self) -> &BlockHeader {
        match self {
            FlowData::Header(header) => header,
            FlowData::Block(block) => &block.header,
        }
    }
}

/// Events published after each successful mutation.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// A header was accepted.
    HeaderAdded(Hash),
    /// A block was accepted.
    BlockAdded(Hash),
    /// A block was accepted, with its chain position.
    BlockNotify {
        /// The accepted header.
        header: BlockHeader,
        /// Its height on its chain.
        height: u64,
    },
}
