//! Snapshot registry.

use crate::{StateError, StateResult, WorldState};
use flow_storage::{ColumnFamily, Storage};
use flow_types::Hash;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Registry of committed world state snapshots.
///
/// Snapshots are addressed by state root; blocks bind to the root their
/// acceptance produced. Registration happens under one write lock so a
/// new root and its block binding become visible together or not at all.
pub struct StateStorage {
    storage: Arc<dyn Storage>,
    snapshots: RwLock<HashMap<Hash, Arc<WorldState>>>,
    block_roots: RwLock<HashMap<Hash, Hash>>,
}

impl StateStorage {
    /// Create a registry seeded with the genesis snapshot.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        let genesis = Arc::new(WorldState::genesis());
        let genesis_root = genesis.state_root();
        let mut snapshots = HashMap::new();
        snapshots.insert(genesis_root, genesis);
        StateStorage {
            storage,
            snapshots: RwLock::new(snapshots),
            block_roots: RwLock::new(HashMap::new()),
        }
    }

    /// The root of the empty world state.
    pub fn genesis_root(&self) -> Hash {
        WorldState::genesis().state_root()
    }

    /// Snapshot for a state root.
    pub fn state_at(&self, root: &Hash) -> StateResult<Arc<WorldState>> {
        self.snapshots
            .read()
            .get(root)
            .cloned()
            .ok_or_else(|| StateError::KeyNotFound(format!("state root {root}")))
    }

    /// The state root a block's acceptance produced.
    pub fn root_of_block(&self, block_hash: &Hash) -> StateResult<Hash> {
        if let Some(root) = self.block_roots.read().get(block_hash) {
            return Ok(*root);
        }
        // Fall back to the durable index.
        match self
            .storage
            .get(ColumnFamily::StateRoots, block_hash.as_bytes())?
        {
            Some(bytes) => Hash::from_slice(&bytes)
                .ok_or_else(|| StateError::Serialization("Bad state root length".into())),
            None => Err(StateError::KeyNotFound(format!("block root {block_hash}"))),
        }
    }

    /// Snapshot bound to a block hash.
    pub fn state_of_block(&self, block_hash: &Hash) -> StateResult<Arc<WorldState>> {
        let root = self.root_of_block(block_hash)?;
        self.state_at(&root)
    }

    /// Register a snapshot under its root and bind it to the producing
    /// block. Atomic: both mappings appear together.
    #[instrument(skip(self, state), fields(block = %block_hash, root = %root))]
    pub fn commit(&self, block_hash: Hash, root: Hash, state: WorldState) -> StateResult<()> {
        debug_assert_eq!(state.state_root(), root);
        {
            let mut snapshots = self.snapshots.write();
            let mut block_roots = self.block_roots.write();
            snapshots.entry(root).or_insert_with(|| Arc::new(state));
            block_roots.insert(block_hash, root);
        }
        self.storage.put(
            ColumnFamily::StateRoots,
            block_hash.as_bytes(),
            root.as_bytes(),
        )?;
        debug!("Committed world state");
        Ok(())
    }

    /// Bind a block to an already-registered root (blocks with no state
    /// effect on their source group).
    pub fn bind_block(&self, block_hash: Hash, root: Hash) -> StateResult<()> {
        if !self.snapshots.read().contains_key(&root) {
            return Err(StateError::KeyNotFound(format!("state root {root}")));
        }
        self.block_roots.write().insert(block_hash, root);
        self.storage.put(
            ColumnFamily::StateRoots,
            block_hash.as_bytes(),
            root.as_bytes(),
        )?;
        Ok(())
    }
}
