//! # flow-chain
//!
//! The multi-chain DAG state: one append-only chain per ordered pair of
//! shard groups, aggregated by [`BlockFlow`].
//!
//! This crate provides:
//! - [`ChainLike`], the capability set shared by header-only and full
//!   chains
//! - [`HeaderChain`] and [`BlockChain`], the two concrete variants
//! - [`BlockFlow`], resolving cross-chain deps, computing best tips, and
//!   serving as the read model validators consume
//! - [`BlockTemplate`] preparation for miners

mod block_chain;
mod chain;
mod flow;

pub use block_chain::BlockChain;
pub use chain::{ChainLike, HeaderChain};
pub use flow::{genesis_block, BlockFlow, BlockTemplate};
