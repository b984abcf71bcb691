//! The flow handler agent.

use crate::{DataOrigin, FlowData, FlowEvent, PendingBuffer};
use flow_chain::{BlockFlow, BlockTemplate, ChainLike};
use flow_consensus::{BlockValidator, HeaderValidator, ValidationError};
use flow_mempool::Mempool;
use flow_types::{Block, BlockHeader, ChainIndex, Hash};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

/// Capacity of the command channel.
const COMMAND_CHANNEL_SIZE: usize = 256;

/// Capacity of the event bus.
const EVENT_CHANNEL_SIZE: usize = 1024;

/// Cap on blocks/headers served per chain for one locator request.
const SYNC_BATCH_SIZE: usize = 128;

/// Sync data bundle answering a `GetSyncData` request.
#[derive(Debug, Clone, Default)]
pub struct SyncData {
    /// Blocks after the block locators.
    pub blocks: Vec<Block>,
    /// Headers after the header locators.
    pub headers: Vec<BlockHeader>,
}

/// Notifications delivered to the registered miner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MinerEvent {
    /// The flow advanced; mining templates are stale.
    UpdateTemplate,
    /// A locally mined block was accepted on this chain.
    MinedBlockAdded(ChainIndex),
}

/// Commands accepted by the handler.
#[derive(Debug)]
pub enum FlowCommand {
    /// Incorporate a header.
    AddHeader {
        /// The header.
        header: BlockHeader,
        /// Its origin.
        origin: DataOrigin,
    },
    /// Incorporate a block.
    AddBlock {
        /// The block.
        block: Block,
        /// Its origin.
        origin: DataOrigin,
    },
    /// Blocks after the locators, for a requesting peer.
    GetBlocks {
        /// Per-chain locators.
        locators: Vec<Hash>,
        /// Reply channel.
        reply: oneshot::Sender<Vec<Block>>,
    },
    /// Headers after the locators, for a requesting peer.
    GetHeaders {
        /// Per-chain locators.
        locators: Vec<Hash>,
        /// Reply channel.
        reply: oneshot::Sender<Vec<BlockHeader>>,
    },
    /// Best-tip locators of every serviced chain.
    GetSyncInfo {
        /// Reply channel.
        reply: oneshot::Sender<Vec<(ChainIndex, Hash)>>,
    },
    /// Blocks and headers after the given locator sets.
    GetSyncData {
        /// Locators for full blocks.
        block_locators: Vec<Hash>,
        /// Locators for bare headers.
        header_locators: Vec<Hash>,
        /// Reply channel.
        reply: oneshot::Sender<SyncData>,
    },
    /// Prepare a mining template for one chain.
    PrepareBlockFlow {
        /// Chain to template.
        chain_index: ChainIndex,
        /// Reply channel; `None` when the chain is not serviced.
        reply: oneshot::Sender<Option<BlockTemplate>>,
    },
    /// Register the miner for template notifications.
    Register {
        /// Miner notification channel.
        miner: mpsc::Sender<MinerEvent>,
    },
    /// Drop the registered miner.
    UnRegister,
    /// Toggle sync mode (relaxes the historical-timestamp check).
    SetSyncing(bool),
}

/// Cloneable client half of the handler.
#[derive(Clone)]
pub struct FlowHandle {
    commands: mpsc::Sender<FlowCommand>,
    events: broadcast::Sender<FlowEvent>,
}

impl FlowHandle {
    /// Send a command to the handler.
    pub async fn send(&self, command: FlowCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Subscribe to the event bus.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }
}

/// Single-writer agent owning the BlockFlow.
///
/// Consumes commands one at a time; validation runs synchronously inside
/// the task, so additions to the flow are totally ordered by arrival and
/// an add completes before its event is published.
pub struct FlowHandler {
    flow: Arc<BlockFlow>,
    header_validator: HeaderValidator,
    block_validator: BlockValidator,
    mempool: Arc<Mempool>,
    pending: PendingBuffer,
    events: broadcast::Sender<FlowEvent>,
    miner: Option<mpsc::Sender<MinerEvent>>,
    syncing: bool,
    commands: mpsc::Receiver<FlowCommand>,
}

impl FlowHandler {
    /// Build the handler and its client handle.
    pub fn new(
        flow: Arc<BlockFlow>,
        mempool: Arc<Mempool>,
        status_size_limit: usize,
    ) -> (Self, FlowHandle) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        let params = Arc::clone(flow.params());
        let broker = flow.broker();
        let handler = FlowHandler {
            header_validator: HeaderValidator::new(Arc::clone(&params), broker),
            block_validator: BlockValidator::new(params, broker),
            flow,
            mempool,
            pending: PendingBuffer::new(status_size_limit),
            events: event_tx.clone(),
            miner: None,
            syncing: false,
            commands: command_rx,
        };
        let handle = FlowHandle {
            commands: command_tx,
            events: event_tx,
        };
        (handler, handle)
    }

    /// Number of parked items.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consume commands until every handle is dropped.
    pub async fn run(mut self) {
        info!("Flow handler started");
        while let Some(command) = self.commands.recv().await {
            self.handle_command(command);
        }
        info!("Flow handler stopped");
    }

    /// Process one command. Public so tests can drive the handler
    /// without spawning the task.
    pub fn handle_command(&mut self, command: FlowCommand) {
        match command {
            FlowCommand::AddHeader { header, origin } => {
                self.handle_add(FlowData::Header(Box::new(header)), origin);
            }
            FlowCommand::AddBlock { block, origin } => {
                self.handle_add(FlowData::Block(Box::new(block)), origin);
            }
            FlowCommand::GetBlocks { locators, reply } => {
                let blocks = self
                    .flow
                    .blocks_after(&locators, SYNC_BATCH_SIZE)
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "GetBlocks lookup failed");
                        Vec::new()
                    });
                let _ = reply.send(blocks);
            }
            FlowCommand::GetHeaders { locators, reply } => {
                let headers = self
                    .flow
                    .headers_after(&locators, SYNC_BATCH_SIZE)
                    .unwrap_or_else(|e| {
                        warn!(error = %e, "GetHeaders lookup failed");
                        Vec::new()
                    });
                let _ = reply.send(headers);
            }
            FlowCommand::GetSyncInfo { reply } => {
                let _ = reply.send(self.flow.sync_locators());
            }
            FlowCommand::GetSyncData {
                block_locators,
                header_locators,
                reply,
            } => {
                let data = SyncData {
                    blocks: self
                        .flow
                        .blocks_after(&block_locators, SYNC_BATCH_SIZE)
                        .unwrap_or_default(),
                    headers: self
                        .flow
                        .headers_after(&header_locators, SYNC_BATCH_SIZE)
                        .unwrap_or_default(),
                };
                let _ = reply.send(data);
            }
            FlowCommand::PrepareBlockFlow { chain_index, reply } => {
                let template = self.flow.prepare_block_flow(chain_index).ok();
                let _ = reply.send(template);
            }
            FlowCommand::Register { miner } => {
                debug!("Miner registered");
                self.miner = Some(miner);
            }
            FlowCommand::UnRegister => {
                debug!("Miner unregistered");
                self.miner = None;
            }
            FlowCommand::SetSyncing(syncing) => {
                self.syncing = syncing;
            }
        }
    }

    /// The add path: ignore known items, park incomplete ones, validate
    /// and insert the rest, then promote whatever the insertion unblocks.
    #[instrument(skip(self, data), fields(hash = %data.hash()))]
    fn handle_add(&mut self, data: FlowData, origin: DataOrigin) {
        if self.already_known(&data) {
            debug!("Ignoring known item");
            return;
        }

        let missing = self.missing_deps(data.header());
        if !missing.is_empty() {
            debug!(missing = missing.len(), "Parking item with missing deps");
            self.pending.add(data, origin, missing);
            return;
        }

        let mut queue = std::collections::VecDeque::from([(data, origin)]);
        while let Some((data, origin)) = queue.pop_front() {
            let hash = data.hash();
            if !self.insert_one(data, origin) {
                continue;
            }
            // Anything parked on this hash may now be complete; promote
            // in counter order.
            for item in self.pending.resolve(&hash) {
                queue.push_back((item.data, item.origin));
            }
        }
    }

    fn already_known(&self, data: &FlowData) -> bool {
        let hash = data.hash();
        if self.pending.contains(&hash) {
            return true;
        }
        let known = match data {
            FlowData::Header(_) => self.flow.contains_header(&hash),
            FlowData::Block(_) => self.flow.contains_block(&hash),
        };
        known.unwrap_or(false)
    }

    fn missing_deps(&self, header: &BlockHeader) -> HashSet<Hash> {
        header
            .dependencies()
            .filter(|dep| !dep.is_zero())
            .filter(|dep| !self.flow.contains_header(dep).unwrap_or(false))
            .collect()
    }

    /// Validate and insert one item; `true` when the flow advanced.
    fn insert_one(&mut self, data: FlowData, origin: DataOrigin) -> bool {
        let now_ms = unix_now_ms();
        match data {
            FlowData::Header(header) => {
                match self
                    .header_validator
                    .validate(&header, self.flow.as_ref(), now_ms, self.syncing)
                {
                    Ok(()) => {}
                    Err(ValidationError::Invalid(status)) => {
                        warn!(%status, "Header rejected");
                        return false;
                    }
                    Err(ValidationError::Io(e)) => {
                        warn!(error = %e, "Header validation I/O failure");
                        return false;
                    }
                }
                if let Err(e) = self.flow.add_header(&header) {
                    warn!(error = %e, "Header insertion failed");
                    return false;
                }
                let _ = self.events.send(FlowEvent::HeaderAdded(header.hash()));
                true
            }
            FlowData::Block(block) => {
                let world = match self.block_validator.validate(
                    &block,
                    self.flow.as_ref(),
                    now_ms,
                    self.syncing,
                ) {
                    Ok(world) => world,
                    Err(ValidationError::Invalid(status)) => {
                        warn!(%status, "Block rejected");
                        return false;
                    }
                    Err(ValidationError::Io(e)) => {
                        warn!(error = %e, "Block validation I/O failure");
                        return false;
                    }
                };
                if let Err(e) = self.flow.add_block(&block, world) {
                    warn!(error = %e, "Block insertion failed");
                    return false;
                }
                self.after_block_added(&block, origin);
                true
            }
        }
    }

    fn after_block_added(&mut self, block: &Block, origin: DataOrigin) {
        let hash = block.hash();
        for tx in block.non_coinbase() {
            // Fine if the tx never hit our mempool.
            let _ = self.mempool.remove(&tx.id());
        }

        let height = self
            .flow
            .get_block_chain(block.chain_index(self.flow.params().groups))
            .and_then(|chain| chain.height_of(&hash).ok().flatten())
            .unwrap_or_default();

        let _ = self.events.send(FlowEvent::BlockAdded(hash));
        let _ = self.events.send(FlowEvent::BlockNotify {
            header: block.header.clone(),
            height,
        });

        if let Some(miner) = &self.miner {
            let event = match origin {
                DataOrigin::Local => {
                    MinerEvent::MinedBlockAdded(block.chain_index(self.flow.params().groups))
                }
                DataOrigin::Remote => MinerEvent::UpdateTemplate,
            };
            if miner.try_send(event).is_err() {
                debug!("Miner channel full or closed");
            }
        }
        debug!(height, "Block added to flow");
    }
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
