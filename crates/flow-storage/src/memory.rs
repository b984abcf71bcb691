//! In-memory storage engine.

use crate::{BatchOp, ColumnFamily, Storage, StorageResult, WriteBatch};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::collections::HashMap;
use tracing::debug;

type Column = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory database keyed by column family.
///
/// The default engine: the core only requires the get/put/delete and
/// atomic-batch contract, so a write-locked map per column suffices. A
/// persistent engine can be slotted in behind the same [`Storage`] trait.
pub struct MemoryDb {
    columns: RwLock<HashMap<ColumnFamily, Column>>,
}

impl MemoryDb {
    /// Create an empty database with all column families present.
    pub fn new() -> Self {
        let mut columns = HashMap::new();
        for cf in ColumnFamily::all() {
            columns.insert(*cf, Column::new());
        }
        debug!(columns = ColumnFamily::all().len(), "Opened in-memory db");
        MemoryDb {
            columns: RwLock::new(columns),
        }
    }

    /// Number of keys in a column family.
    pub fn len(&self, cf: ColumnFamily) -> usize {
        self.columns.read().get(&cf).map_or(0, |c| c.len())
    }

    /// Whether a column family holds no keys.
    pub fn is_empty(&self, cf: ColumnFamily) -> bool {
        self.len(cf) == 0
    }
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage for MemoryDb {
    fn get(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self
            .columns
            .read()
            .get(&cf)
            .and_then(|column| column.get(key).cloned()))
    }

    fn put(&self, cf: ColumnFamily, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.columns
            .write()
            .entry(cf)
            .or_default()
            .insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, cf: ColumnFamily, key: &[u8]) -> StorageResult<()> {
        if let Some(column) = self.columns.write().get_mut(&cf) {
            column.remove(key);
        }
        Ok(())
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        // One write lock across the whole batch keeps it atomic with
        // respect to readers.
        let mut columns = self.columns.write();
        for op in batch.into_ops() {
            match op {
                BatchOp::Put { cf, key, value } => {
                    columns.entry(cf).or_default().insert(key, value);
                }
                BatchOp::Delete { cf, key } => {
                    if let Some(column) = columns.get_mut(&cf) {
                        column.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }

    fn iter(
        &self,
        cf: ColumnFamily,
    ) -> StorageResult<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let snapshot: Vec<(Vec<u8>, Vec<u8>)> = self
            .columns
            .read()
            .get(&cf)
            .map(|column| {
                column
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(Box::new(snapshot.into_iter()))
    }
}
