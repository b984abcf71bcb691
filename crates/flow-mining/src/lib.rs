//! # flow-mining
//!
//! Block assembly and proof-of-work search.
//!
//! The miner registers with the flow handler, rebuilds templates when
//! the flow advances, and grinds nonces until a header both satisfies
//! its target and lands on the template's chain (the chain of a hash is
//! derived from the hash itself, so the search filters for it).

mod coinbase;
mod miner;

pub use coinbase::{build_coinbase, MINING_REWARD};
pub use miner::{try_mine, Miner, MinerConfig};
