//! Full block chains.

use crate::{ChainLike, HeaderChain};
use flow_consensus::ConsensusParams;
use flow_storage::{ColumnFamily, Storage, StorageError, StorageResult};
use flow_types::{Block, ChainIndex, Decode, Encode, Hash, U256};
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// A chain storing headers and bodies.
///
/// Wraps a [`HeaderChain`]: every accepted block's header is accepted,
/// while a header may be known before its body arrives.
pub struct BlockChain {
    headers: HeaderChain,
    storage: Arc<dyn Storage>,
    bodies: RwLock<HashSet<Hash>>,
    genesis_hash: Hash,
}

impl BlockChain {
    /// Create a chain seeded with its genesis block.
    pub fn new(
        chain_index: ChainIndex,
        genesis: Block,
        storage: Arc<dyn Storage>,
        params: Arc<ConsensusParams>,
    ) -> StorageResult<Self> {
        let genesis_hash = genesis.hash();
        let headers = HeaderChain::new(
            chain_index,
            genesis.header.clone(),
            Arc::clone(&storage),
            params,
        )?;
        storage.put(
            ColumnFamily::Blocks,
            genesis_hash.as_bytes(),
            &genesis.encode_to_vec(),
        )?;
        Ok(BlockChain {
            headers,
            storage,
            bodies: RwLock::new([genesis_hash].into_iter().collect()),
            genesis_hash,
        })
    }

    /// This chain's coordinates.
    pub fn chain_index(&self) -> ChainIndex {
        self.headers.chain_index()
    }

    /// The chain's genesis hash.
    pub fn genesis_hash(&self) -> Hash {
        self.genesis_hash
    }

    /// The header-only view of this chain.
    pub fn header_chain(&self) -> &HeaderChain {
        &self.headers
    }

    /// The heaviest tip.
    pub fn best_tip(&self) -> Hash {
        self.headers.best_tip()
    }

    /// Whether a full body is stored for `hash`.
    pub fn contains_block(&self, hash: &Hash) -> StorageResult<bool> {
        Ok(self.bodies.read().contains(hash))
    }

    /// Append a validated block: header plus body.
    #[instrument(skip(self, block), fields(chain = %self.chain_index(), hash = %block.hash()))]
    pub fn add_block(&self, block: &Block) -> StorageResult<()> {
        let hash = block.hash();
        self.headers.add_header(block.header.clone())?;
        self.storage.put(
            ColumnFamily::Blocks,
            hash.as_bytes(),
            &block.encode_to_vec(),
        )?;
        self.bodies.write().insert(hash);
        debug!("Block appended");
        Ok(())
    }

    /// Load a stored block body.
    pub fn get_block(&self, hash: &Hash) -> StorageResult<Option<Block>> {
        if !self.bodies.read().contains(hash) {
            return Ok(None);
        }
        match self.storage.get(ColumnFamily::Blocks, hash.as_bytes())? {
            Some(bytes) => Block::decode_exact(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serde(e.to_string())),
            None => Ok(None),
        }
    }

    /// Full blocks of the best branch strictly after `locator`.
    pub fn blocks_after(&self, locator: &Hash, max: usize) -> StorageResult<Vec<Block>> {
        let mut blocks = Vec::new();
        for hash in self.headers.hashes_after(locator, max) {
            if let Some(block) = self.get_block(&hash)? {
                blocks.push(block);
            }
        }
        Ok(blocks)
    }
}

impl ChainLike for BlockChain {
    fn contains(&self, hash: &Hash) -> StorageResult<bool> {
        self.headers.contains(hash)
    }

    fn parent_hash(&self, hash: &Hash) -> StorageResult<Option<Hash>> {
        self.headers.parent_hash(hash)
    }

    fn height_of(&self, hash: &Hash) -> StorageResult<Option<u64>> {
        self.headers.height_of(hash)
    }

    fn max_height(&self) -> u64 {
        self.headers.max_height()
    }

    fn hash_target(&self, parent: &Hash) -> StorageResult<U256> {
        self.headers.hash_target(parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis_block;
    use flow_storage::MemoryDb;
    use flow_types::{BlockDeps, BlockHeader, NetworkId};

    fn chain() -> BlockChain {
        let params = Arc::new(ConsensusParams::new(1, NetworkId::Devnet));
        let index = ChainIndex::new(0, 0);
        BlockChain::new(
            index,
            genesis_block(index, &params),
            Arc::new(MemoryDb::new()),
            params,
        )
        .unwrap()
    }

    fn child_block(parent: Hash, nonce: u64) -> Block {
        Block {
            header: BlockHeader {
                parent_hash: parent,
                block_deps: BlockDeps::new(vec![]),
                txs_hash: Hash::ZERO,
                timestamp_ms: 1000,
                target: U256::max_value(),
                nonce,
            },
            transactions: vec![],
        }
    }

    #[test]
    fn test_block_roundtrip() {
        let c = chain();
        let block = child_block(c.genesis_hash(), 1);
        c.add_block(&block).unwrap();

        assert!(c.contains_block(&block.hash()).unwrap());
        assert_eq!(c.get_block(&block.hash()).unwrap().unwrap(), block);
        assert_eq!(c.best_tip(), block.hash());
    }

    #[test]
    fn test_header_known_before_body() {
        let c = chain();
        let block = child_block(c.genesis_hash(), 1);
        c.header_chain().add_header(block.header.clone()).unwrap();

        assert!(c.contains(&block.hash()).unwrap());
        assert!(!c.contains_block(&block.hash()).unwrap());
        assert!(c.get_block(&block.hash()).unwrap().is_none());
    }

    #[test]
    fn test_blocks_after() {
        let c = chain();
        let b1 = child_block(c.genesis_hash(), 1);
        c.add_block(&b1).unwrap();
        let b2 = child_block(b1.hash(), 2);
        c.add_block(&b2).unwrap();

        let blocks = c.blocks_after(&c.genesis_hash(), 16).unwrap();
        assert_eq!(blocks, vec![b1, b2]);
    }
}
