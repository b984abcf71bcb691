//! # flow-types
//!
//! Core chain types for the blockflow node.
//!
//! This crate provides:
//! - 256-bit hashes and the `U256` amount/target arithmetic
//! - Shard coordinates (`GroupIndex`, `ChainIndex`) and broker assignment
//! - Transactions, outputs, lockup/unlock scripts
//! - Block headers with cross-chain dependency pointers
//! - The deterministic byte codec used for hashing and the wire
//!
//! Everything here is a pure value type. Interpretation (script execution,
//! validation, chain bookkeeping) lives in the dedicated crates.

mod block;
mod codec;
mod group;
mod hash;
mod merkle;
mod output;
mod script;
mod transaction;
mod u256;
pub mod vm;

pub use block::{Block, BlockDeps, BlockHeader};
pub use codec::{CodecError, CodecResult, Decode, Encode, Reader};
pub use group::{BrokerInfo, ChainIndex, GroupIndex, NetworkId};
pub use hash::{hash_of, Blake2b256, Hash};
pub use merkle::merkle_root;
pub use output::{
    AssetOutput, AssetOutputRef, ContractId, ContractOutput, ContractOutputRef, TokenId, TxOutput,
};
pub use script::{LockupScript, PublicKey, PublicKeyHash, Signature};
pub use transaction::{Transaction, TxInput, UnlockScript, UnsignedTransaction};
pub use u256::U256;

/// Number of decimal sub-units in one ALF.
pub const ONE_ALF: u128 = 1_000_000_000_000_000_000;
