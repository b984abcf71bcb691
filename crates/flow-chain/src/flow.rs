//! The BlockFlow aggregate.

use crate::{BlockChain, ChainLike};
use flow_consensus::{ConsensusParams, FlowBlockView, FlowHeaderView};
use flow_mempool::Mempool;
use flow_state::{CachedWorldState, StateError, StateStorage};
use flow_storage::{Storage, StorageError, StorageResult};
use flow_types::{
    Block, BlockDeps, BlockHeader, BrokerInfo, ChainIndex, Hash, Transaction, U256,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Everything a miner needs to assemble and grind a block.
#[derive(Debug, Clone)]
pub struct BlockTemplate {
    /// Chain the block extends.
    pub chain_index: ChainIndex,
    /// Parent tip of that chain.
    pub parent_hash: Hash,
    /// Best tips of every other chain, canonical order.
    pub block_deps: BlockDeps,
    /// Target the block must satisfy.
    pub target: U256,
    /// Height of the block being mined.
    pub height: u64,
    /// Mempool transactions for this chain, arrival order.
    pub transactions: Vec<Transaction>,
}

/// The deterministic genesis block of a chain pair.
///
/// Timestamp zero, zero parent, no deps, nonce = the chain's flat index
/// so every pair gets a distinct hash. Genesis blocks are installed at
/// startup, never validated.
pub fn genesis_block(chain_index: ChainIndex, params: &ConsensusParams) -> Block {
    Block {
        header: BlockHeader {
            parent_hash: Hash::ZERO,
            block_deps: BlockDeps::new(Vec::new()),
            txs_hash: Hash::ZERO,
            timestamp_ms: 0,
            target: params.max_mining_target.clone(),
            nonce: chain_index.flat_index(params.groups) as u64,
        },
        transactions: Vec::new(),
    }
}

/// Aggregate of all per-pair chains this broker services.
///
/// The sole read interface validators consume, and the structure the
/// flow handler mutates. Cross-chain deps resolve here; world states are
/// reached by following a block's `(from, from)` chain entry.
pub struct BlockFlow {
    params: Arc<ConsensusParams>,
    broker: BrokerInfo,
    chains: HashMap<ChainIndex, BlockChain>,
    state_storage: Arc<StateStorage>,
    mempool: Arc<Mempool>,
}

impl BlockFlow {
    /// Build the grid of serviced chains, each seeded with genesis, and
    /// bind every genesis block to the empty world state.
    pub fn new(
        params: Arc<ConsensusParams>,
        broker: BrokerInfo,
        storage: Arc<dyn Storage>,
        state_storage: Arc<StateStorage>,
        mempool: Arc<Mempool>,
    ) -> StorageResult<Self> {
        let mut chains = HashMap::new();
        for from in 0..params.groups {
            for to in 0..params.groups {
                let index = ChainIndex::new(from, to);
                if !index.relates_to(&broker) {
                    continue;
                }
                let genesis = genesis_block(index, &params);
                let genesis_hash = genesis.hash();
                let chain = BlockChain::new(
                    index,
                    genesis,
                    Arc::clone(&storage),
                    Arc::clone(&params),
                )?;
                state_storage
                    .bind_block(genesis_hash, state_storage.genesis_root())
                    .map_err(|e| StorageError::Other(e.to_string()))?;
                chains.insert(index, chain);
            }
        }
        info!(chains = chains.len(), groups = params.groups, "BlockFlow ready");
        Ok(BlockFlow {
            params,
            broker,
            chains,
            state_storage,
            mempool,
        })
    }

    /// Consensus parameters in force.
    pub fn params(&self) -> &Arc<ConsensusParams> {
        &self.params
    }

    /// This node's broker assignment.
    pub fn broker(&self) -> BrokerInfo {
        self.broker
    }

    /// The chain a header belongs to.
    pub fn get_header_chain(&self, header: &BlockHeader) -> Option<&BlockChain> {
        self.chains.get(&header.chain_index(self.params.groups))
    }

    /// The chain at the given coordinates.
    pub fn get_block_chain(&self, chain_index: ChainIndex) -> Option<&BlockChain> {
        self.chains.get(&chain_index)
    }

    /// All serviced chains.
    pub fn chains(&self) -> impl Iterator<Item = &BlockChain> {
        self.chains.values()
    }

    /// Whether any chain holds this header.
    pub fn contains_header(&self, hash: &Hash) -> StorageResult<bool> {
        for chain in self.chains.values() {
            if chain.contains(hash)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether any chain holds this full block.
    pub fn contains_block(&self, hash: &Hash) -> StorageResult<bool> {
        for chain in self.chains.values() {
            if chain.contains_block(hash)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Insert a validated header.
    #[instrument(skip(self, header), fields(hash = %header.hash()))]
    pub fn add_header(&self, header: &BlockHeader) -> StorageResult<()> {
        let chain = self
            .get_header_chain(header)
            .ok_or_else(|| StorageError::KeyNotFound("chain not serviced".into()))?;
        chain.header_chain().add_header(header.clone())
    }

    /// Insert a validated block and commit the world state its
    /// validation produced.
    #[instrument(skip(self, block, world), fields(hash = %block.hash()))]
    pub fn add_block(&self, block: &Block, world: CachedWorldState) -> StorageResult<()> {
        let chain = self
            .get_block_chain(block.chain_index(self.params.groups))
            .ok_or_else(|| StorageError::KeyNotFound("chain not serviced".into()))?;
        chain.add_block(block)?;
        let (root, state) = world.persist();
        self.state_storage
            .commit(block.hash(), root, state)
            .map_err(|e| StorageError::Other(e.to_string()))?;
        debug!(root = %root, "Block inserted into flow");
        Ok(())
    }

    /// Best tips of every chain except `own`, canonical row-major order.
    pub fn best_deps(&self, own: ChainIndex) -> BlockDeps {
        let mut deps = Vec::with_capacity(BlockDeps::expected_len(self.params.groups));
        for from in 0..self.params.groups {
            for to in 0..self.params.groups {
                let index = ChainIndex::new(from, to);
                if index == own {
                    continue;
                }
                let tip = self
                    .chains
                    .get(&index)
                    .map(BlockChain::best_tip)
                    .unwrap_or(Hash::ZERO);
                deps.push(tip);
            }
        }
        BlockDeps::new(deps)
    }

    /// Bundle a mining template for one chain: best deps, retargeted
    /// target, and the chain's mempool transactions.
    #[instrument(skip(self), fields(chain = %chain_index))]
    pub fn prepare_block_flow(&self, chain_index: ChainIndex) -> StorageResult<BlockTemplate> {
        let chain = self
            .get_block_chain(chain_index)
            .ok_or_else(|| StorageError::KeyNotFound("chain not serviced".into()))?;
        let parent_hash = chain.best_tip();
        let target = chain.hash_target(&parent_hash)?;
        let height = chain
            .height_of(&parent_hash)?
            .map(|h| h + 1)
            .unwrap_or(1);
        let transactions = self
            .mempool
            .collect(chain_index, flow_mempool::DEFAULT_COLLECT_LIMIT);

        Ok(BlockTemplate {
            chain_index,
            parent_hash,
            block_deps: self.best_deps(chain_index),
            target,
            height,
            transactions,
        })
    }

    /// Best-tip locators for every serviced chain (sync info).
    pub fn sync_locators(&self) -> Vec<(ChainIndex, Hash)> {
        let mut locators: Vec<(ChainIndex, Hash)> = self
            .chains
            .values()
            .map(|chain| (chain.chain_index(), chain.best_tip()))
            .collect();
        locators.sort_by_key(|(index, _)| index.flat_index(self.params.groups));
        locators
    }

    /// Blocks of the best branches strictly after the locators.
    pub fn blocks_after(&self, locators: &[Hash], max_per_chain: usize) -> StorageResult<Vec<Block>> {
        let mut blocks = Vec::new();
        for chain in self.chains.values() {
            for locator in locators {
                if chain.contains(locator)? {
                    blocks.extend(chain.blocks_after(locator, max_per_chain)?);
                    break;
                }
            }
        }
        Ok(blocks)
    }

    /// Headers of the best branches strictly after the locators.
    pub fn headers_after(
        &self,
        locators: &[Hash],
        max_per_chain: usize,
    ) -> StorageResult<Vec<BlockHeader>> {
        let mut headers = Vec::new();
        for chain in self.chains.values() {
            for locator in locators {
                if chain.contains(locator)? {
                    for hash in chain.header_chain().hashes_after(locator, max_per_chain) {
                        if let Some(header) = chain.header_chain().get_header(&hash)? {
                            headers.push(header);
                        }
                    }
                    break;
                }
            }
        }
        Ok(headers)
    }

    /// The world state a block validates against (the trie reached by
    /// folding the block's deps onto the persisted base).
    pub fn get_trie(&self, block: &Block) -> Result<CachedWorldState, StateError> {
        let groups = self.params.groups;
        let own = block.chain_index(groups);
        let source = block
            .header
            .chain_hash_of(own.intra_of_from(), groups)
            .ok_or_else(|| StateError::KeyNotFound("intra-group dep".into()))?;
        let state = self.state_storage.state_of_block(&source)?;
        Ok(state.cached())
    }
}

impl FlowHeaderView for BlockFlow {
    fn contains_hash(&self, hash: &Hash) -> StorageResult<bool> {
        self.contains_header(hash)
    }

    fn expected_target(&self, header: &BlockHeader) -> StorageResult<U256> {
        let chain = self
            .get_header_chain(header)
            .ok_or_else(|| StorageError::KeyNotFound("chain not serviced".into()))?;
        chain.hash_target(&header.parent_hash)
    }
}

impl FlowBlockView for BlockFlow {
    fn validation_state(&self, block: &Block) -> Result<CachedWorldState, StateError> {
        self.get_trie(block)
    }
}
