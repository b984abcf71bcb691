//! Blocks and headers.

use crate::{
    ChainIndex, CodecError, CodecResult, Decode, Encode, Hash, Reader, Transaction, U256,
};

/// Cross-chain dependency pointers of a header.
///
/// One entry per chain of the DAG other than the block's own chain, in
/// row-major order (`from * G + to`, own chain skipped). Together with the
/// parent hash every chain of the grid is referenced exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDeps(Vec<Hash>);

impl BlockDeps {
    /// Expected number of entries for a `G`-group DAG.
    pub fn expected_len(groups: u32) -> usize {
        (groups * groups - 1) as usize
    }

    /// Wrap an ordered dep list.
    pub fn new(deps: Vec<Hash>) -> Self {
        BlockDeps(deps)
    }

    /// The raw dep hashes, canonical order.
    pub fn hashes(&self) -> &[Hash] {
        &self.0
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the dep list is empty (single-group DAG).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The dep slot for `target`, given the block's own chain.
    ///
    /// Returns `None` for the own chain: that reference is the parent.
    pub fn dep_position(own: ChainIndex, target: ChainIndex, groups: u32) -> Option<usize> {
        let own_flat = own.flat_index(groups);
        let target_flat = target.flat_index(groups);
        if target_flat == own_flat {
            return None;
        }
        if target_flat < own_flat {
            Some(target_flat as usize)
        } else {
            Some((target_flat - 1) as usize)
        }
    }
}

impl Encode for BlockDeps {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.0.encode(buf);
    }
}

impl Decode for BlockDeps {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(BlockDeps(Vec::<Hash>::decode(reader)?))
    }
}

/// A block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    /// Previous block of the same chain.
    pub parent_hash: Hash,
    /// One tip per other chain of the DAG.
    pub block_deps: BlockDeps,
    /// Merkle root of the block's transactions.
    pub txs_hash: Hash,
    /// Milliseconds since epoch.
    pub timestamp_ms: u64,
    /// Proof-of-work target; valid iff `hash <= target` as 256-bit
    /// big-endian integers.
    pub target: U256,
    /// Mining nonce.
    pub nonce: u64,
}

impl BlockHeader {
    /// The header hash (also the block hash).
    pub fn hash(&self) -> Hash {
        crate::hash_of(self)
    }

    /// The chain this header belongs to, derived from its hash.
    pub fn chain_index(&self, groups: u32) -> ChainIndex {
        ChainIndex::from_hash(&self.hash(), groups)
    }

    /// The reference this header holds for `target`: the parent for the
    /// own chain, the dep slot otherwise.
    ///
    /// `None` when the dep list is too short for the grid.
    pub fn chain_hash_of(&self, target: ChainIndex, groups: u32) -> Option<Hash> {
        let own = self.chain_index(groups);
        match BlockDeps::dep_position(own, target, groups) {
            None => Some(self.parent_hash),
            Some(pos) => self.block_deps.hashes().get(pos).copied(),
        }
    }

    /// Parent plus all deps: every hash that must exist locally before
    /// this header may be accepted.
    pub fn dependencies(&self) -> impl Iterator<Item = Hash> + '_ {
        std::iter::once(self.parent_hash).chain(self.block_deps.hashes().iter().copied())
    }

    /// Whether this header satisfies its own proof-of-work target.
    pub fn satisfies_work(&self) -> bool {
        U256::from_be_bytes(self.hash().as_bytes()) <= self.target
    }
}

impl Encode for BlockHeader {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.parent_hash.encode(buf);
        self.block_deps.encode(buf);
        self.txs_hash.encode(buf);
        self.timestamp_ms.encode(buf);
        self.target.encode(buf);
        self.nonce.encode(buf);
    }
}

impl Decode for BlockHeader {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(BlockHeader {
            parent_hash: Hash::decode(reader)?,
            block_deps: BlockDeps::decode(reader)?,
            txs_hash: Hash::decode(reader)?,
            timestamp_ms: reader.get_u64()?,
            target: U256::decode(reader)?,
            nonce: reader.get_u64()?,
        })
    }
}

/// A block: header plus ordered transactions, coinbase first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// The header.
    pub header: BlockHeader,
    /// The transactions; `transactions[0]` is the coinbase.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// The block hash (the header hash).
    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    /// The chain this block belongs to.
    pub fn chain_index(&self, groups: u32) -> ChainIndex {
        self.header.chain_index(groups)
    }

    /// The coinbase transaction, if the block is non-empty.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// The non-coinbase transactions.
    pub fn non_coinbase(&self) -> &[Transaction] {
        if self.transactions.is_empty() {
            &[]
        } else {
            &self.transactions[1..]
        }
    }

    /// Merkle root over the transaction ids.
    pub fn compute_txs_hash(transactions: &[Transaction]) -> Hash {
        let ids: Vec<Hash> = transactions.iter().map(Transaction::id).collect();
        crate::merkle_root(&ids)
    }
}

impl Encode for Block {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.header.encode(buf);
        self.transactions.encode(buf);
    }
}

impl Decode for Block {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let header = BlockHeader::decode(reader)?;
        let transactions = Vec::<Transaction>::decode(reader)?;
        if transactions.len() > u32::MAX as usize {
            return Err(CodecError::Invalid("Transaction list too long".into()));
        }
        Ok(Block {
            header,
            transactions,
        })
    }
}
