//! Node assembly.

use crate::config::NodeConfig;
use crate::network::NetworkService;
use anyhow::{Context, Result};
use flow_chain::BlockFlow;
use flow_handler::{FlowHandle, FlowHandler};
use flow_mempool::Mempool;
use flow_mining::{Miner, MinerConfig};
use flow_state::StateStorage;
use flow_storage::{MemoryDb, Storage};
use flow_types::{ChainIndex, Hash, LockupScript};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The assembled node: storage, flow, handler task, network service,
/// and the optional miner.
pub struct Node {
    config: NodeConfig,
    handle: FlowHandle,
}

impl Node {
    /// Wire every component and spawn the background tasks.
    pub fn start(config: NodeConfig) -> Result<Node> {
        let params = Arc::new(config.consensus_params()?);
        let broker = config.broker_info;

        let storage: Arc<dyn Storage> = Arc::new(MemoryDb::new());
        let state_storage = Arc::new(StateStorage::new(Arc::clone(&storage)));
        let mempool = Arc::new(Mempool::with_defaults());
        let flow = Arc::new(
            BlockFlow::new(
                Arc::clone(&params),
                broker,
                storage,
                state_storage,
                Arc::clone(&mempool),
            )
            .context("building block flow")?,
        );

        let (handler, handle) =
            FlowHandler::new(Arc::clone(&flow), mempool, config.status_size_limit);
        tokio::spawn(handler.run());

        let node_id = Hash::hash(config.network.bind_address.as_bytes());
        let network = NetworkService::new(
            node_id,
            config.network_id,
            broker,
            params.groups,
            Duration::from_secs(config.ping_frequency_secs),
            handle.clone(),
        );
        let bind_address = config.network.bind_address.clone();
        tokio::spawn({
            let network = network.clone();
            async move {
                if let Err(e) = network.listen(bind_address).await {
                    tracing::error!(error = %e, "P2P listener failed");
                }
            }
        });
        for peer in config.network.known_peers.clone() {
            tokio::spawn(network.clone().connect(peer));
        }

        if config.mining.enabled {
            let reward_key_hash = config
                .mining
                .reward_key_hash
                .as_deref()
                .and_then(|s| hex::decode(s).ok())
                .and_then(|bytes| Hash::from_slice(&bytes))
                .unwrap_or_else(|| Hash::hash(node_id.as_bytes()));
            let chains: Vec<ChainIndex> = flow
                .chains()
                .map(|chain| chain.chain_index())
                .collect();
            let miner = Miner::new(
                MinerConfig {
                    reward_lockup: LockupScript::P2pkh {
                        pub_key_hash: reward_key_hash,
                    },
                    chains,
                },
                params,
                handle.clone(),
            );
            tokio::spawn(miner.run());
            info!("Miner started");
        }

        info!(
            groups = config.groups,
            broker_id = broker.broker_id,
            broker_num = broker.broker_num,
            network = ?config.network_id,
            "Node started"
        );
        Ok(Node { config, handle })
    }

    /// The node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Client handle to the flow handler.
    pub fn handle(&self) -> &FlowHandle {
        &self.handle
    }
}
