//! Node harness for integration tests.

use flow_chain::BlockFlow;
use flow_consensus::ConsensusParams;
use flow_handler::{DataOrigin, FlowCommand, FlowHandle, FlowHandler};
use flow_mempool::Mempool;
use flow_mining::{build_coinbase, try_mine, MINING_REWARD};
use flow_state::StateStorage;
use flow_storage::{MemoryDb, Storage};
use flow_types::{
    Block, BrokerInfo, ChainIndex, LockupScript, NetworkId, PublicKey, Transaction, U256,
};
use std::sync::Arc;

/// A wired single-broker node driven synchronously.
///
/// The handler is held directly (not spawned) so tests can feed commands
/// one at a time and observe the flow between steps.
pub struct TestNode {
    /// Consensus parameters in force.
    pub params: Arc<ConsensusParams>,
    /// The DAG state.
    pub flow: Arc<BlockFlow>,
    /// The shared mempool.
    pub mempool: Arc<Mempool>,
    /// The handler under test.
    pub handler: FlowHandler,
    /// Client handle (event subscriptions, async drivers).
    pub handle: FlowHandle,
}

impl TestNode {
    /// A devnet node with `groups` shards and the given pending cap.
    pub fn new(groups: u32, status_size_limit: usize) -> Self {
        let params = Arc::new(ConsensusParams::new(groups, NetworkId::Devnet));
        let storage: Arc<dyn Storage> = Arc::new(MemoryDb::new());
        let mempool = Arc::new(Mempool::with_defaults());
        let flow = Arc::new(
            BlockFlow::new(
                Arc::clone(&params),
                BrokerInfo::solo(),
                Arc::clone(&storage),
                Arc::new(StateStorage::new(storage)),
                Arc::clone(&mempool),
            )
            .expect("flow construction"),
        );
        let (handler, handle) =
            FlowHandler::new(Arc::clone(&flow), Arc::clone(&mempool), status_size_limit);
        TestNode {
            params,
            flow,
            mempool,
            handler,
            handle,
        }
    }

    /// Mine a block on `chain_index` carrying `txs` after the coinbase.
    /// Devnet's easy target makes the grind fast; the search also lands
    /// the hash on the requested chain.
    pub fn mine_block(
        &self,
        chain_index: ChainIndex,
        reward_key: &PublicKey,
        txs: Vec<Transaction>,
    ) -> Block {
        let template = self
            .flow
            .prepare_block_flow(chain_index)
            .expect("template for serviced chain");
        let coinbase = build_coinbase(
            NetworkId::Devnet,
            LockupScript::p2pkh(reward_key),
            U256::from_u128(MINING_REWARD),
        );
        let mut transactions = vec![coinbase];
        transactions.extend(txs);
        try_mine(&template, transactions, &self.params, 0, 1 << 22)
            .expect("devnet target is minable")
    }

    /// Feed a block through the handler.
    pub fn add_block(&mut self, block: Block, origin: DataOrigin) {
        self.handler.handle_command(FlowCommand::AddBlock { block, origin });
    }

    /// Whether the flow accepted this block.
    pub fn has_block(&self, block: &Block) -> bool {
        self.flow.contains_block(&block.hash()).unwrap_or(false)
    }
}
