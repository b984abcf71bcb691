//! Read traits over the DAG.
//!
//! Validators never touch chain internals; they see the flow through
//! these capabilities, which the chain crate implements. Tests implement
//! them with maps.

use flow_state::{CachedWorldState, StateError};
use flow_storage::StorageResult;
use flow_types::{Block, BlockHeader, Hash, U256};

/// What header validation needs from the flow.
pub trait FlowHeaderView {
    /// Whether a header with this hash is accepted anywhere in the flow.
    fn contains_hash(&self, hash: &Hash) -> StorageResult<bool>;

    /// The target the retarget algorithm expects for this header,
    /// derived from its parent's chain history.
    fn expected_target(&self, header: &BlockHeader) -> StorageResult<U256>;
}

/// What block validation needs on top of header validation.
pub trait FlowBlockView: FlowHeaderView {
    /// The scratch world state a block validates against, obtained by
    /// following the block's deps.
    fn validation_state(&self, block: &Block) -> Result<CachedWorldState, StateError>;
}
