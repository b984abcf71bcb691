//! # flow-storage
//!
//! Storage layer for the blockflow node.
//!
//! This crate provides a key-value storage abstraction with support for:
//! - Column families for different data types (headers, blocks, state, ...)
//! - Atomic batch writes
//! - Pluggable engines behind the [`Storage`] trait
//!
//! ## Column Families
//!
//! - `Headers`: block headers indexed by hash
//! - `Blocks`: block bodies indexed by hash
//! - `ChainIndexState`: per-chain height/weight/tip bookkeeping
//! - `StateRoots`: block hash -> world state root
//! - `Metadata`: node metadata

mod batch;
mod error;
mod memory;

pub use batch::{BatchOp, WriteBatch};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDb;

/// Column families for organizing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnFamily {
    /// Block headers indexed by hash.
    Headers,
    /// Block bodies indexed by hash.
    Blocks,
    /// Per-chain bookkeeping (heights, weights, tips).
    ChainIndexState,
    /// Block hash -> world state root.
    StateRoots,
    /// Node metadata and configuration.
    Metadata,
}

impl ColumnFamily {
    /// Get the string name of the column family.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnFamily::Headers => "headers",
            ColumnFamily::Blocks => "blocks",
            ColumnFamily::ChainIndexState => "chain_index_state",
            ColumnFamily::StateRoots => "state_roots",
            ColumnFamily::Metadata => "metadata",
        }
    }

    /// Get all column families.
    pub fn all() -> &'static [ColumnFamily] {
        &[
            ColumnFamily::Headers,
            ColumnFamily::Blocks,
            ColumnFamily::ChainIndexState,
            ColumnFamily::StateRoots,
            ColumnFamily::Metadata,
        ]
    }
}

/// Storage trait for abstracting database operations.
///
/// This allows for easy testing with mock implementations and keeps the
/// engine choice out of the core crates.
pub trait Storage: Send + Sync {
    /// Get a value by key from a column family.
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Put a key-value pair into a column family.
    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Delete a key from a column family.
    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()>;

    /// Check if a key exists in a column family.
    fn contains(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<bool> {
        Ok(self.get(cf, key)?.is_some())
    }

    /// Execute a batch of writes atomically.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Create an iterator over a column family.
    fn iter(
        &self,
        cf: ColumnFamily,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;
}
