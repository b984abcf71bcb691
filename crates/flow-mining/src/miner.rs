//! The miner task.

use crate::build_coinbase;
use flow_chain::BlockTemplate;
use flow_consensus::ConsensusParams;
use flow_handler::{DataOrigin, FlowCommand, FlowHandle, MinerEvent};
use flow_types::{
    Block, BlockHeader, ChainIndex, LockupScript, Transaction, U256,
};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Nonce attempts per template before yielding back to the event loop.
const NONCE_BATCH: u64 = 1 << 16;

/// Miner configuration.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Lockup receiving block rewards.
    pub reward_lockup: LockupScript,
    /// Chains this miner works.
    pub chains: Vec<ChainIndex>,
}

/// Grind nonces over a template.
///
/// A candidate wins when its hash satisfies the target *and* maps to the
/// template's chain index. Returns `None` when the attempt budget runs
/// out; callers retry with the nonce offset advanced.
pub fn try_mine(
    template: &BlockTemplate,
    transactions: Vec<Transaction>,
    params: &ConsensusParams,
    nonce_start: u64,
    attempts: u64,
) -> Option<Block> {
    let txs_hash = Block::compute_txs_hash(&transactions);
    let timestamp_ms = unix_now_ms();
    for nonce in nonce_start..nonce_start.saturating_add(attempts) {
        let header = BlockHeader {
            parent_hash: template.parent_hash,
            block_deps: template.block_deps.clone(),
            txs_hash,
            timestamp_ms,
            target: template.target.clone(),
            nonce,
        };
        let hash = header.hash();
        if U256::from_be_bytes(hash.as_bytes()) > template.target {
            continue;
        }
        if ChainIndex::from_hash(&hash, params.groups) != template.chain_index {
            continue;
        }
        return Some(Block {
            header,
            transactions,
        });
    }
    None
}

/// CPU miner registered with the flow handler.
///
/// Receives `UpdateTemplate` and `MinedBlockAdded` notifications; either
/// one invalidates cached work, so the miner re-templates its chains and
/// resumes the search.
pub struct Miner {
    config: MinerConfig,
    params: Arc<ConsensusParams>,
    handle: FlowHandle,
}

impl Miner {
    /// Create a miner submitting through `handle`.
    pub fn new(config: MinerConfig, params: Arc<ConsensusParams>, handle: FlowHandle) -> Self {
        Miner {
            config,
            params,
            handle,
        }
    }

    /// Register and mine until the handler goes away.
    pub async fn run(self) {
        let (miner_tx, mut miner_rx) = mpsc::channel(16);
        if !self
            .handle
            .send(FlowCommand::Register { miner: miner_tx })
            .await
        {
            warn!("Flow handler unavailable, miner exiting");
            return;
        }
        info!(chains = self.config.chains.len(), "Miner registered");

        self.mine_all_chains().await;
        while let Some(event) = miner_rx.recv().await {
            match event {
                MinerEvent::UpdateTemplate => self.mine_all_chains().await,
                MinerEvent::MinedBlockAdded(chain_index) => {
                    debug!(chain = %chain_index, "Own block accepted");
                    self.mine_chain(chain_index).await;
                }
            }
        }
    }

    async fn mine_all_chains(&self) {
        for chain_index in self.config.chains.clone() {
            self.mine_chain(chain_index).await;
        }
    }

    async fn mine_chain(&self, chain_index: ChainIndex) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let sent = self
            .handle
            .send(FlowCommand::PrepareBlockFlow {
                chain_index,
                reply: reply_tx,
            })
            .await;
        if !sent {
            return;
        }
        let Ok(Some(template)) = reply_rx.await else {
            warn!(chain = %chain_index, "No template for chain");
            return;
        };

        let coinbase = build_coinbase(
            self.params.network_id,
            self.config.reward_lockup.clone(),
            U256::from_u128(crate::MINING_REWARD),
        );
        let mut transactions = vec![coinbase];
        transactions.extend(template.transactions.iter().cloned());

        let mut nonce_start = 0u64;
        loop {
            match try_mine(&template, transactions.clone(), &self.params, nonce_start, NONCE_BATCH)
            {
                Some(block) => {
                    debug!(chain = %chain_index, hash = %block.hash(), "Solution found");
                    let _ = self
                        .handle
                        .send(FlowCommand::AddBlock {
                            block,
                            origin: DataOrigin::Local,
                        })
                        .await;
                    return;
                }
                None => {
                    nonce_start = nonce_start.saturating_add(NONCE_BATCH);
                    if nonce_start >= NONCE_BATCH * 16 {
                        // Stale odds rise with every failed batch; wait
                        // for the next template instead of spinning.
                        debug!(chain = %chain_index, "Giving up until next template");
                        return;
                    }
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
