//! Header chains.

use flow_consensus::{next_target, ConsensusParams, RetargetHeader};
use flow_storage::{ColumnFamily, Storage, StorageError, StorageResult};
use flow_types::{BlockHeader, ChainIndex, Encode, Hash, U256};
use num_bigint::BigUint;
use num_traits::{One, Zero};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// The capability set every per-pair chain exposes.
///
/// Two concrete variants exist: [`HeaderChain`] (headers only) and
/// [`BlockChain`](crate::BlockChain) (headers plus bodies).
pub trait ChainLike: Send + Sync {
    /// Whether a header with this hash is part of the chain.
    fn contains(&self, hash: &Hash) -> StorageResult<bool>;

    /// Parent hash of an accepted header.
    fn parent_hash(&self, hash: &Hash) -> StorageResult<Option<Hash>>;

    /// Height of an accepted header.
    fn height_of(&self, hash: &Hash) -> StorageResult<Option<u64>>;

    /// Height of the heaviest tip.
    fn max_height(&self) -> u64;

    /// The target a child of `parent` must declare (retarget query).
    fn hash_target(&self, parent: &Hash) -> StorageResult<U256>;
}

struct Entry {
    header: BlockHeader,
    height: u64,
    weight: BigUint,
}

struct ChainData {
    entries: HashMap<Hash, Entry>,
    tips: HashSet<Hash>,
    best_tip: Hash,
    max_height: u64,
}

/// Append-only store of headers for one `(from, to)` pair.
///
/// Keyed by hash; tracks parent, height, cumulative work, and the tip
/// set. The heaviest tip (ties broken by lower hash) is the chain's best.
/// Writes go through to storage; the in-memory index serves reads.
pub struct HeaderChain {
    chain_index: ChainIndex,
    params: Arc<ConsensusParams>,
    storage: Arc<dyn Storage>,
    data: RwLock<ChainData>,
}

impl HeaderChain {
    /// Create a chain seeded with its genesis header.
    pub fn new(
        chain_index: ChainIndex,
        genesis: BlockHeader,
        storage: Arc<dyn Storage>,
        params: Arc<ConsensusParams>,
    ) -> StorageResult<Self> {
        let genesis_hash = genesis.hash();
        storage.put(
            ColumnFamily::Headers,
            genesis_hash.as_bytes(),
            &genesis.encode_to_vec(),
        )?;

        let mut entries = HashMap::new();
        entries.insert(
            genesis_hash,
            Entry {
                header: genesis,
                height: 0,
                weight: BigUint::zero(),
            },
        );
        Ok(HeaderChain {
            chain_index,
            params,
            storage,
            data: RwLock::new(ChainData {
                entries,
                tips: [genesis_hash].into_iter().collect(),
                best_tip: genesis_hash,
                max_height: 0,
            }),
        })
    }

    /// This chain's coordinates.
    pub fn chain_index(&self) -> ChainIndex {
        self.chain_index
    }

    /// The genesis-seeded heaviest tip.
    pub fn best_tip(&self) -> Hash {
        self.data.read().best_tip
    }

    /// A stored header.
    pub fn get_header(&self, hash: &Hash) -> StorageResult<Option<BlockHeader>> {
        Ok(self.data.read().entries.get(hash).map(|e| e.header.clone()))
    }

    /// Append a validated header whose parent is present.
    #[instrument(skip(self, header), fields(chain = %self.chain_index, hash = %header.hash()))]
    pub fn add_header(&self, header: BlockHeader) -> StorageResult<()> {
        let hash = header.hash();
        let mut data = self.data.write();
        if data.entries.contains_key(&hash) {
            return Ok(());
        }
        let (parent_height, parent_weight) = {
            let parent = data.entries.get(&header.parent_hash).ok_or_else(|| {
                StorageError::KeyNotFound(format!("parent {}", header.parent_hash))
            })?;
            (parent.height, parent.weight.clone())
        };

        let height = parent_height + 1;
        let weight = parent_weight + work_of(&header.target);

        self.storage.put(
            ColumnFamily::Headers,
            hash.as_bytes(),
            &header.encode_to_vec(),
        )?;

        data.tips.remove(&header.parent_hash);
        data.tips.insert(hash);
        data.max_height = data.max_height.max(height);

        let best_weight = data
            .entries
            .get(&data.best_tip)
            .map(|e| e.weight.clone())
            .unwrap_or_default();
        if weight > best_weight || (weight == best_weight && hash < data.best_tip) {
            data.best_tip = hash;
        }

        data.entries.insert(
            hash,
            Entry {
                header,
                height,
                weight,
            },
        );
        debug!(height, "Header appended");
        Ok(())
    }

    /// Hashes of the best branch strictly after `locator`, oldest first.
    ///
    /// An unknown locator returns the whole best branch (capped), which
    /// lets a fresh peer bootstrap from genesis.
    pub fn hashes_after(&self, locator: &Hash, max: usize) -> Vec<Hash> {
        let data = self.data.read();
        let mut branch = Vec::new();
        let mut cursor = data.best_tip;
        loop {
            if cursor == *locator {
                break;
            }
            let Some(entry) = data.entries.get(&cursor) else {
                break;
            };
            branch.push(cursor);
            if entry.height == 0 {
                break;
            }
            cursor = entry.header.parent_hash;
        }
        branch.reverse();
        branch.truncate(max);
        branch
    }

    /// The retarget window ending at `tip`, oldest first.
    fn retarget_window(&self, tip: &Hash) -> StorageResult<Vec<RetargetHeader>> {
        let data = self.data.read();
        let mut window = Vec::with_capacity(self.params.retarget_window);
        let mut cursor = *tip;
        for _ in 0..self.params.retarget_window {
            let Some(entry) = data.entries.get(&cursor) else {
                return Err(StorageError::KeyNotFound(format!("header {cursor}")));
            };
            window.push(RetargetHeader {
                timestamp_ms: entry.header.timestamp_ms,
                target: entry.header.target.clone(),
            });
            if entry.height == 0 {
                break;
            }
            cursor = entry.header.parent_hash;
        }
        window.reverse();
        Ok(window)
    }
}

impl ChainLike for HeaderChain {
    fn contains(&self, hash: &Hash) -> StorageResult<bool> {
        Ok(self.data.read().entries.contains_key(hash))
    }

    fn parent_hash(&self, hash: &Hash) -> StorageResult<Option<Hash>> {
        Ok(self
            .data
            .read()
            .entries
            .get(hash)
            .map(|e| e.header.parent_hash))
    }

    fn height_of(&self, hash: &Hash) -> StorageResult<Option<u64>> {
        Ok(self.data.read().entries.get(hash).map(|e| e.height))
    }

    fn max_height(&self) -> u64 {
        self.data.read().max_height
    }

    fn hash_target(&self, parent: &Hash) -> StorageResult<U256> {
        let window = self.retarget_window(parent)?;
        Ok(next_target(&self.params, &window))
    }
}

/// Work contributed by one block: `2^256 / (target + 1)`, floored at one.
fn work_of(target: &U256) -> BigUint {
    let numerator = BigUint::one() << 256u32;
    let denominator = target.as_biguint() + BigUint::one();
    (numerator / denominator).max(BigUint::one())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::{BlockDeps, NetworkId};

    fn params() -> Arc<ConsensusParams> {
        Arc::new(ConsensusParams::new(1, NetworkId::Devnet))
    }

    fn genesis() -> BlockHeader {
        BlockHeader {
            parent_hash: Hash::ZERO,
            block_deps: BlockDeps::new(vec![]),
            txs_hash: Hash::ZERO,
            timestamp_ms: 0,
            target: U256::max_value(),
            nonce: 0,
        }
    }

    fn child(parent: &BlockHeader, timestamp_ms: u64, nonce: u64) -> BlockHeader {
        BlockHeader {
            parent_hash: parent.hash(),
            block_deps: BlockDeps::new(vec![]),
            txs_hash: Hash::ZERO,
            timestamp_ms,
            target: U256::max_value(),
            nonce,
        }
    }

    fn chain() -> HeaderChain {
        HeaderChain::new(
            ChainIndex::new(0, 0),
            genesis(),
            Arc::new(flow_storage::MemoryDb::new()),
            params(),
        )
        .unwrap()
    }

    #[test]
    fn test_genesis_is_tip() {
        let c = chain();
        let g = genesis();
        assert!(c.contains(&g.hash()).unwrap());
        assert_eq!(c.best_tip(), g.hash());
        assert_eq!(c.max_height(), 0);
    }

    #[test]
    fn test_append_tracks_height_and_tip() {
        let c = chain();
        let g = genesis();
        let h1 = child(&g, 1000, 1);
        let h2 = child(&h1, 2000, 2);

        c.add_header(h1.clone()).unwrap();
        c.add_header(h2.clone()).unwrap();

        assert_eq!(c.height_of(&h1.hash()).unwrap(), Some(1));
        assert_eq!(c.height_of(&h2.hash()).unwrap(), Some(2));
        assert_eq!(c.parent_hash(&h2.hash()).unwrap(), Some(h1.hash()));
        assert_eq!(c.best_tip(), h2.hash());
        assert_eq!(c.max_height(), 2);
    }

    #[test]
    fn test_missing_parent_is_key_not_found() {
        let c = chain();
        let orphan = BlockHeader {
            parent_hash: Hash::hash(b"unknown"),
            ..child(&genesis(), 1000, 1)
        };
        assert!(matches!(
            c.add_header(orphan),
            Err(StorageError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_readd_is_noop() {
        let c = chain();
        let h1 = child(&genesis(), 1000, 1);
        c.add_header(h1.clone()).unwrap();
        c.add_header(h1.clone()).unwrap();
        assert_eq!(c.max_height(), 1);
    }

    #[test]
    fn test_heavier_fork_wins() {
        let c = chain();
        let g = genesis();
        let a1 = child(&g, 1000, 1);
        let b1 = child(&g, 1000, 2);
        let b2 = child(&b1, 2000, 3);

        c.add_header(a1).unwrap();
        c.add_header(b1).unwrap();
        c.add_header(b2.clone()).unwrap();

        // The longer fork carries more cumulative work.
        assert_eq!(c.best_tip(), b2.hash());
    }

    #[test]
    fn test_hashes_after_locator() {
        let c = chain();
        let g = genesis();
        let h1 = child(&g, 1000, 1);
        let h2 = child(&h1, 2000, 2);
        c.add_header(h1.clone()).unwrap();
        c.add_header(h2.clone()).unwrap();

        assert_eq!(
            c.hashes_after(&g.hash(), 16),
            vec![h1.hash(), h2.hash()]
        );
        assert_eq!(c.hashes_after(&h2.hash(), 16), Vec::<Hash>::new());
        // Unknown locator returns the full best branch.
        assert_eq!(c.hashes_after(&Hash::hash(b"unknown"), 16).len(), 3);
    }

    #[test]
    fn test_hash_target_short_history() {
        let c = chain();
        let g = genesis();
        // Below the retarget window the genesis target carries forward.
        assert_eq!(c.hash_target(&g.hash()).unwrap(), U256::max_value());
    }
}
