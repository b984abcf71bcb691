//! Transaction pool implementation.

use crate::{MempoolError, MempoolResult, DEFAULT_MAX_TXS_PER_CHAIN};
use dashmap::DashMap;
use flow_types::{ChainIndex, Encode, Hash, Transaction};
use parking_lot::RwLock;
use std::collections::VecDeque;
use tracing::{debug, instrument};

/// Mempool configuration.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum pooled transactions per chain index.
    pub max_txs_per_chain: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        MempoolConfig {
            max_txs_per_chain: DEFAULT_MAX_TXS_PER_CHAIN,
        }
    }
}

/// One pooled transaction with its bookkeeping.
#[derive(Debug, Clone)]
struct PooledTx {
    tx: Transaction,
    chain_index: ChainIndex,
}

/// Transaction mempool, bucketed by chain index.
///
/// Concurrency-safe through its own interface; the flow handler and the
/// network layer call in from different tasks.
pub struct Mempool {
    config: MempoolConfig,
    /// Transactions by id.
    transactions: DashMap<Hash, PooledTx>,
    /// Input ref encoding -> spending tx id, for double-spend detection.
    input_to_tx: DashMap<Vec<u8>, Hash>,
    /// Arrival order per chain index, oldest first.
    arrival: RwLock<Vec<(ChainIndex, VecDeque<Hash>)>>,
}

impl Mempool {
    /// Create a mempool with the given configuration.
    pub fn new(config: MempoolConfig) -> Self {
        Mempool {
            config,
            transactions: DashMap::new(),
            input_to_tx: DashMap::new(),
            arrival: RwLock::new(Vec::new()),
        }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(MempoolConfig::default())
    }

    /// Number of pooled transactions across all chains.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Whether a transaction is pooled.
    pub fn contains(&self, tx_id: &Hash) -> bool {
        self.transactions.contains_key(tx_id)
    }

    /// Add a transaction under its chain index.
    #[instrument(skip(self, tx), fields(tx_id = %tx.id(), chain = %chain_index))]
    pub fn add(&self, tx: Transaction, chain_index: ChainIndex) -> MempoolResult<()> {
        let tx_id = tx.id();
        if self.transactions.contains_key(&tx_id) {
            return Err(MempoolError::AlreadyExists(tx_id.to_string()));
        }

        for input in &tx.unsigned.inputs {
            let key = input.output_ref.encode_to_vec();
            if self.input_to_tx.contains_key(&key) {
                return Err(MempoolError::DoubleSpend(input.output_ref.key.to_string()));
            }
        }

        // Evict oldest if the chain bucket is full.
        let evict = {
            let mut arrival = self.arrival.write();
            let queue = Self::queue_mut(&mut arrival, chain_index);
            let evict = if queue.len() >= self.config.max_txs_per_chain {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(tx_id);
            evict
        };
        if let Some(old_id) = evict {
            self.remove_entry(&old_id);
        }

        for input in &tx.unsigned.inputs {
            self.input_to_tx
                .insert(input.output_ref.encode_to_vec(), tx_id);
        }
        self.transactions.insert(tx_id, PooledTx { tx, chain_index });

        debug!(pooled = self.transactions.len(), "Transaction pooled");
        Ok(())
    }

    /// Remove a transaction by id.
    #[instrument(skip(self), fields(tx_id = %tx_id))]
    pub fn remove(&self, tx_id: &Hash) -> MempoolResult<Transaction> {
        let pooled = self
            .remove_entry(tx_id)
            .ok_or_else(|| MempoolError::NotFound(tx_id.to_string()))?;

        let mut arrival = self.arrival.write();
        if let Some((_, queue)) = arrival
            .iter_mut()
            .find(|(index, _)| *index == pooled.chain_index)
        {
            queue.retain(|id| id != tx_id);
        }
        Ok(pooled.tx)
    }

    /// Collect up to `max` transactions for a chain, oldest first.
    pub fn collect(&self, chain_index: ChainIndex, max: usize) -> Vec<Transaction> {
        let arrival = self.arrival.read();
        let Some((_, queue)) = arrival.iter().find(|(index, _)| *index == chain_index) else {
            return Vec::new();
        };
        queue
            .iter()
            .take(max)
            .filter_map(|id| self.transactions.get(id).map(|p| p.tx.clone()))
            .collect()
    }

    fn remove_entry(&self, tx_id: &Hash) -> Option<PooledTx> {
        let (_, pooled) = self.transactions.remove(tx_id)?;
        for input in &pooled.tx.unsigned.inputs {
            self.input_to_tx.remove(&input.output_ref.encode_to_vec());
        }
        Some(pooled)
    }

    fn queue_mut(
        arrival: &mut Vec<(ChainIndex, VecDeque<Hash>)>,
        chain_index: ChainIndex,
    ) -> &mut VecDeque<Hash> {
        if let Some(pos) = arrival.iter().position(|(index, _)| *index == chain_index) {
            return &mut arrival[pos].1;
        }
        arrival.push((chain_index, VecDeque::new()));
        &mut arrival.last_mut().expect("just pushed").1
    }
}
