//! # flow-state
//!
//! World state management for the blockflow node.
//!
//! The world state is the committed map of live outputs and contract
//! states under a single Merkle state root. This crate provides:
//! - Immutable [`WorldState`] snapshots with a deterministic state root
//! - Copy-on-write [`CachedWorldState`] views used during validation
//! - A [`StateStorage`] registry resolving roots and block hashes to
//!   snapshots, with atomic commit semantics

mod cached;
mod error;
mod storage;
mod world;

pub use cached::CachedWorldState;
pub use error::{StateError, StateResult};
pub use storage::StateStorage;
pub use world::WorldState;
