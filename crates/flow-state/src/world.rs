//! Immutable world state snapshots.

use crate::CachedWorldState;
use flow_types::{
    AssetOutput, AssetOutputRef, Blake2b256, ContractId, ContractOutput, ContractOutputRef,
    Encode, Hash,
};
use blake2::Digest;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A committed world state snapshot.
///
/// Three logical maps participate in one state root: asset outputs,
/// contract outputs, and contract state. Snapshots are immutable; all
/// mutation happens on a [`CachedWorldState`] view and becomes visible
/// only through an explicit persist.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    pub(crate) assets: BTreeMap<AssetOutputRef, AssetOutput>,
    pub(crate) contract_outputs: BTreeMap<ContractOutputRef, ContractOutput>,
    pub(crate) contract_states: BTreeMap<ContractId, Vec<u8>>,
}

impl WorldState {
    /// The empty (genesis) world state.
    pub fn genesis() -> Self {
        Self::default()
    }

    /// Look up an asset output.
    pub fn get_asset(&self, output_ref: &AssetOutputRef) -> Option<&AssetOutput> {
        self.assets.get(output_ref)
    }

    /// Look up a contract output.
    pub fn get_contract_output(&self, output_ref: &ContractOutputRef) -> Option<&ContractOutput> {
        self.contract_outputs.get(output_ref)
    }

    /// Look up contract state bytes.
    pub fn get_contract_state(&self, contract_id: &ContractId) -> Option<&[u8]> {
        self.contract_states.get(contract_id).map(Vec::as_slice)
    }

    /// Whether an asset output exists.
    pub fn contains_asset(&self, output_ref: &AssetOutputRef) -> bool {
        self.assets.contains_key(output_ref)
    }

    /// Number of live asset outputs.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// The Merkle commitment over all three maps.
    ///
    /// Each map is folded in key order into one digest; the three digests
    /// are then combined pairwise. Deterministic because the maps are
    /// sorted and the value encoding is canonical.
    pub fn state_root(&self) -> Hash {
        let assets = Self::fold_map(self.assets.iter());
        let contracts = Self::fold_map(self.contract_outputs.iter());
        let states = Self::fold_bytes_map(self.contract_states.iter());
        Hash::combine(&Hash::combine(&assets, &contracts), &states)
    }

    fn fold_map<'a, K: Encode + 'a, V: Encode + 'a>(
        entries: impl Iterator<Item = (&'a K, &'a V)>,
    ) -> Hash {
        let mut hasher = Blake2b256::new();
        for (key, value) in entries {
            hasher.update(key.encode_to_vec());
            hasher.update(value.encode_to_vec());
        }
        Hash::from_slice(&hasher.finalize()).expect("digest is 32 bytes")
    }

    fn fold_bytes_map<'a, K: Encode + 'a>(
        entries: impl Iterator<Item = (&'a K, &'a Vec<u8>)>,
    ) -> Hash {
        let mut hasher = Blake2b256::new();
        for (key, value) in entries {
            hasher.update(key.encode_to_vec());
            hasher.update(&(value.len() as u32).to_be_bytes());
            hasher.update(value);
        }
        Hash::from_slice(&hasher.finalize()).expect("digest is 32 bytes")
    }

    /// Open a copy-on-write view over this snapshot.
    pub fn cached(self: &Arc<Self>) -> CachedWorldState {
        CachedWorldState::new(Arc::clone(self))
    }
}
