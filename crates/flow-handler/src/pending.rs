//! The pending buffer.

use crate::{DataOrigin, FlowData};
use flow_types::Hash;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// A parked item and its unresolved dependencies.
#[derive(Debug)]
pub struct PendingItem {
    /// The parked block or header.
    pub data: FlowData,
    /// Where it came from.
    pub origin: DataOrigin,
    missing: HashSet<Hash>,
}

/// Bounded table of blocks and headers awaiting dependencies.
///
/// Items are keyed by a monotonically increasing counter. The buffer owns
/// the parked items and indexes them by missing hash; on overflow the
/// entry with the lowest counter is dropped, favoring recent arrivals.
pub struct PendingBuffer {
    capacity: usize,
    next_counter: u64,
    items: BTreeMap<u64, PendingItem>,
    by_dep: HashMap<Hash, HashSet<u64>>,
    hashes: HashSet<Hash>,
}

impl PendingBuffer {
    /// Create a buffer capped at `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        PendingBuffer {
            capacity: capacity.max(1),
            next_counter: 0,
            items: BTreeMap::new(),
            by_dep: HashMap::new(),
            hashes: HashSet::new(),
        }
    }

    /// Number of parked items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether an item with this hash is parked.
    pub fn contains(&self, hash: &Hash) -> bool {
        self.hashes.contains(hash)
    }

    /// The counter that will be assigned next.
    pub fn next_counter(&self) -> u64 {
        self.next_counter
    }

    /// Park an item under a fresh counter. Evicts the oldest entry when
    /// full. Returns the assigned counter.
    pub fn add(&mut self, data: FlowData, origin: DataOrigin, missing: HashSet<Hash>) -> u64 {
        if self.items.len() >= self.capacity {
            if let Some((oldest, _)) = self.items.first_key_value() {
                let oldest = *oldest;
                self.remove(oldest);
                debug!(counter = oldest, "Pending buffer full, evicted oldest");
            }
        }

        let counter = self.next_counter;
        self.next_counter += 1;

        for dep in &missing {
            self.by_dep.entry(*dep).or_default().insert(counter);
        }
        self.hashes.insert(data.hash());
        self.items.insert(
            counter,
            PendingItem {
                data,
                origin,
                missing,
            },
        );
        counter
    }

    /// Strike `added` from every parked item's missing set; items whose
    /// set drains are removed and returned in counter order.
    pub fn resolve(&mut self, added: &Hash) -> Vec<PendingItem> {
        let Some(waiters) = self.by_dep.remove(added) else {
            return Vec::new();
        };
        let mut ready_counters = Vec::new();
        for counter in waiters {
            if let Some(item) = self.items.get_mut(&counter) {
                item.missing.remove(added);
                if item.missing.is_empty() {
                    ready_counters.push(counter);
                }
            }
        }
        ready_counters.sort_unstable();

        let mut ready = Vec::with_capacity(ready_counters.len());
        for counter in ready_counters {
            if let Some(item) = self.remove(counter) {
                ready.push(item);
            }
        }
        ready
    }

    fn remove(&mut self, counter: u64) -> Option<PendingItem> {
        let item = self.items.remove(&counter)?;
        for dep in &item.missing {
            if let Some(waiters) = self.by_dep.get_mut(dep) {
                waiters.remove(&counter);
                if waiters.is_empty() {
                    self.by_dep.remove(dep);
                }
            }
        }
        self.hashes.remove(&item.data.hash());
        Some(item)
    }
}
