//! Shard coordinates.
//!
//! The DAG is a grid of `G * G` chains, one per ordered pair of shard
//! groups. Hashes, addresses, and brokers all resolve to coordinates in
//! this grid deterministically.

use crate::{CodecError, CodecResult, Decode, Encode, Hash, Reader};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Network the node participates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// Main network.
    Mainnet,
    /// Public test network.
    #[default]
    Testnet,
    /// Local development network.
    Devnet,
}

impl NetworkId {
    /// Single-byte wire id.
    pub fn id(&self) -> u8 {
        match self {
            NetworkId::Mainnet => 0,
            NetworkId::Testnet => 1,
            NetworkId::Devnet => 2,
        }
    }

    /// Parse the wire id.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(NetworkId::Mainnet),
            1 => Some(NetworkId::Testnet),
            2 => Some(NetworkId::Devnet),
            _ => None,
        }
    }
}

impl Encode for NetworkId {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.id());
    }
}

impl Decode for NetworkId {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let id = reader.get_u8()?;
        NetworkId::from_id(id).ok_or_else(|| CodecError::Invalid(format!("Bad network id: {id}")))
    }
}

/// A shard group, an integer in `[0, G)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupIndex(u32);

impl GroupIndex {
    /// Construct without bounds checking; callers pass values already
    /// reduced modulo the group count.
    pub fn new(value: u32) -> Self {
        GroupIndex(value)
    }

    /// The raw group number.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Group an output-ref hint points at.
    pub fn from_hint(hint: u32, groups: u32) -> Self {
        GroupIndex(hint % groups)
    }
}

impl fmt::Display for GroupIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coordinates of one chain in the DAG: an ordered pair of groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChainIndex {
    /// Source group.
    pub from: GroupIndex,
    /// Destination group.
    pub to: GroupIndex,
}

impl ChainIndex {
    /// Build a chain index from raw group numbers.
    pub fn new(from: u32, to: u32) -> Self {
        ChainIndex {
            from: GroupIndex::new(from),
            to: GroupIndex::new(to),
        }
    }

    /// The chain a hash belongs to: the last two big-endian bytes of the
    /// hash modulo `G * G`, split row-major.
    pub fn from_hash(hash: &Hash, groups: u32) -> Self {
        let bytes = hash.as_bytes();
        let raw = u16::from_be_bytes([bytes[30], bytes[31]]) as u32;
        Self::from_flat(raw % (groups * groups), groups)
    }

    /// Row-major position of this chain in the grid.
    pub fn flat_index(&self, groups: u32) -> u32 {
        self.from.value() * groups + self.to.value()
    }

    /// Inverse of [`flat_index`](Self::flat_index).
    pub fn from_flat(flat: u32, groups: u32) -> Self {
        ChainIndex::new(flat / groups, flat % groups)
    }

    /// Whether source and destination group coincide. Only intra-group
    /// transactions may carry tx scripts and touch contracts.
    pub fn is_intra_group(&self) -> bool {
        self.from == self.to
    }

    /// The intra-group chain of this chain's source group.
    pub fn intra_of_from(&self) -> ChainIndex {
        ChainIndex {
            from: self.from,
            to: self.from,
        }
    }

    /// Whether a broker with the given assignment services this chain.
    pub fn relates_to(&self, broker: &BrokerInfo) -> bool {
        broker.contains_group(self.from) || broker.contains_group(self.to)
    }
}

impl fmt::Display for ChainIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.from, self.to)
    }
}

/// Which groups this node serves.
///
/// Groups are partitioned round-robin over `broker_num` brokers; broker
/// `i` owns every group `g` with `g % broker_num == i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerInfo {
    /// This broker's id in `[0, broker_num)`.
    pub broker_id: u32,
    /// Total number of brokers in the clique.
    pub broker_num: u32,
}

impl BrokerInfo {
    /// Build a broker assignment.
    pub fn new(broker_id: u32, broker_num: u32) -> Self {
        BrokerInfo {
            broker_id,
            broker_num,
        }
    }

    /// A solo broker serving everything.
    pub fn solo() -> Self {
        BrokerInfo::new(0, 1)
    }

    /// Whether this broker owns `group`.
    pub fn contains_group(&self, group: GroupIndex) -> bool {
        group.value() % self.broker_num == self.broker_id
    }

    /// The groups this broker owns, in ascending order.
    pub fn groups(&self, total_groups: u32) -> Vec<GroupIndex> {
        (0..total_groups)
            .filter(|g| g % self.broker_num == self.broker_id)
            .map(GroupIndex::new)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_index_roundtrip() {
        let groups = 4;
        for flat in 0..groups * groups {
            let index = ChainIndex::from_flat(flat, groups);
            assert_eq!(index.flat_index(groups), flat);
        }
    }

    #[test]
    fn test_from_hash_is_stable() {
        let hash = Hash::hash(b"some block");
        let a = ChainIndex::from_hash(&hash, 4);
        let b = ChainIndex::from_hash(&hash, 4);
        assert_eq!(a, b);
        assert!(a.from.value() < 4 && a.to.value() < 4);
    }

    #[test]
    fn test_single_group_degenerates() {
        let hash = Hash::hash(b"whatever");
        assert_eq!(ChainIndex::from_hash(&hash, 1), ChainIndex::new(0, 0));
    }

    #[test]
    fn test_intra_group() {
        assert!(ChainIndex::new(2, 2).is_intra_group());
        assert!(!ChainIndex::new(1, 2).is_intra_group());
        assert_eq!(ChainIndex::new(1, 2).intra_of_from(), ChainIndex::new(1, 1));
    }

    #[test]
    fn test_broker_partition_covers_all_groups() {
        let total = 4;
        let brokers = [BrokerInfo::new(0, 2), BrokerInfo::new(1, 2)];
        for g in 0..total {
            let owners = brokers
                .iter()
                .filter(|b| b.contains_group(GroupIndex::new(g)))
                .count();
            assert_eq!(owners, 1);
        }
    }

    #[test]
    fn test_solo_broker_relates_to_everything() {
        let broker = BrokerInfo::solo();
        for from in 0..3 {
            for to in 0..3 {
                assert!(ChainIndex::new(from, to).relates_to(&broker));
            }
        }
    }

    #[test]
    fn test_network_id_roundtrip() {
        for id in [NetworkId::Mainnet, NetworkId::Testnet, NetworkId::Devnet] {
            assert_eq!(NetworkId::from_id(id.id()), Some(id));
        }
        assert_eq!(NetworkId::from_id(9), None);
    }
}
