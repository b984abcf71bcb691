//! Copy-on-write world state views.

use crate::{StateError, StateResult, WorldState};
use flow_types::{
    AssetOutput, AssetOutputRef, ContractId, ContractOutput, ContractOutputRef, Hash, Transaction,
    TxOutput,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A scratch view over a committed snapshot.
///
/// Reads fall through to the base snapshot; writes stay in the overlay
/// until [`persist`](Self::persist). Discarding the view discards every
/// mutation, which is what makes failed validation side-effect free.
#[derive(Debug)]
pub struct CachedWorldState {
    base: Arc<WorldState>,
    // `None` marks a deletion shadowing the base entry.
    assets: HashMap<AssetOutputRef, Option<AssetOutput>>,
    contract_outputs: HashMap<ContractOutputRef, Option<ContractOutput>>,
    contract_states: HashMap<ContractId, Option<Vec<u8>>>,
}

impl CachedWorldState {
    pub(crate) fn new(base: Arc<WorldState>) -> Self {
        CachedWorldState {
            base,
            assets: HashMap::new(),
            contract_outputs: HashMap::new(),
            contract_states: HashMap::new(),
        }
    }

    /// Look up an asset output through the overlay.
    pub fn get_asset(&self, output_ref: &AssetOutputRef) -> Option<AssetOutput> {
        match self.assets.get(output_ref) {
            Some(entry) => entry.clone(),
            None => self.base.get_asset(output_ref).cloned(),
        }
    }

    /// Whether an asset output exists through the overlay.
    pub fn contains_asset(&self, output_ref: &AssetOutputRef) -> bool {
        match self.assets.get(output_ref) {
            Some(entry) => entry.is_some(),
            None => self.base.contains_asset(output_ref),
        }
    }

    /// Add an asset output.
    pub fn add_asset(&mut self, output_ref: AssetOutputRef, output: AssetOutput) {
        self.assets.insert(output_ref, Some(output));
    }

    /// Remove an asset output; `KeyNotFound` if it does not exist.
    pub fn remove_asset(&mut self, output_ref: &AssetOutputRef) -> StateResult<()> {
        if !self.contains_asset(output_ref) {
            return Err(StateError::KeyNotFound(format!("asset {}", output_ref.key)));
        }
        self.assets.insert(*output_ref, None);
        Ok(())
    }

    /// Look up a contract output through the overlay.
    pub fn get_contract_output(&self, output_ref: &ContractOutputRef) -> Option<ContractOutput> {
        match self.contract_outputs.get(output_ref) {
            Some(entry) => entry.clone(),
            None => self.base.get_contract_output(output_ref).cloned(),
        }
    }

    /// Add a contract output.
    pub fn add_contract_output(&mut self, output_ref: ContractOutputRef, output: ContractOutput) {
        self.contract_outputs.insert(output_ref, Some(output));
    }

    /// Remove a contract output; `KeyNotFound` if it does not exist.
    pub fn remove_contract_output(&mut self, output_ref: &ContractOutputRef) -> StateResult<()> {
        let exists = match self.contract_outputs.get(output_ref) {
            Some(entry) => entry.is_some(),
            None => self.base.get_contract_output(output_ref).is_some(),
        };
        if !exists {
            return Err(StateError::KeyNotFound(format!(
                "contract output {}",
                output_ref.key
            )));
        }
        self.contract_outputs.insert(*output_ref, None);
        Ok(())
    }

    /// Look up contract state bytes through the overlay.
    pub fn get_contract_state(&self, contract_id: &ContractId) -> Option<Vec<u8>> {
        match self.contract_states.get(contract_id) {
            Some(entry) => entry.clone(),
            None => self.base.get_contract_state(contract_id).map(<[u8]>::to_vec),
        }
    }

    /// Set contract state bytes.
    pub fn set_contract_state(&mut self, contract_id: ContractId, state: Vec<u8>) {
        self.contract_states.insert(contract_id, Some(state));
    }

    /// Resolve the outputs a transaction consumes, in the exact order
    /// `inputs ++ contract_inputs`.
    ///
    /// A missing reference yields `KeyNotFound`; the tx layer surfaces it
    /// as a non-existent input.
    pub fn get_pre_outputs(&self, tx: &Transaction) -> StateResult<Vec<TxOutput>> {
        let mut outputs = Vec::with_capacity(tx.unsigned.inputs.len() + tx.contract_inputs.len());
        for input in &tx.unsigned.inputs {
            let output = self.get_asset(&input.output_ref).ok_or_else(|| {
                StateError::KeyNotFound(format!("asset {}", input.output_ref.key))
            })?;
            outputs.push(TxOutput::Asset(output));
        }
        for contract_ref in &tx.contract_inputs {
            let output = self.get_contract_output(contract_ref).ok_or_else(|| {
                StateError::KeyNotFound(format!("contract output {}", contract_ref.key))
            })?;
            outputs.push(TxOutput::Contract(output));
        }
        Ok(outputs)
    }

    /// Merge the overlay into a fresh snapshot and return it with its
    /// root. The caller registers the snapshot; until then nothing is
    /// visible outside this view.
    pub fn persist(self) -> (Hash, WorldState) {
        let mut next = (*self.base).clone();
        for (output_ref, entry) in self.assets {
            match entry {
                Some(output) => {
                    next.assets.insert(output_ref, output);
                }
                None => {
                    next.assets.remove(&output_ref);
                }
            }
        }
        for (output_ref, entry) in self.contract_outputs {
            match entry {
                Some(output) => {
                    next.contract_outputs.insert(output_ref, output);
                }
                None => {
                    next.contract_outputs.remove(&output_ref);
                }
            }
        }
        for (contract_id, entry) in self.contract_states {
            match entry {
                Some(state) => {
                    next.contract_states.insert(contract_id, state);
                }
                None => {
                    next.contract_states.remove(&contract_id);
                }
            }
        }
        let root = next.state_root();
        debug!(root = %root, assets = next.asset_count(), "Persisted world state");
        (root, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_types::{LockupScript, NetworkId, PublicKey, TxInput, U256, UnlockScript};

    fn asset(amount: u64) -> AssetOutput {
        AssetOutput::new(
            U256::from_u64(amount),
            LockupScript::P2pkh {
                pub_key_hash: Hash::hash(b"holder"),
            },
        )
    }

    fn asset_ref(tag: u8) -> AssetOutputRef {
        AssetOutputRef {
            hint: tag as u32,
            key: Hash::hash(&[tag]),
        }
    }

    fn base_with_asset(tag: u8, amount: u64) -> Arc<WorldState> {
        let mut state = WorldState::genesis();
        state.assets.insert(asset_ref(tag), asset(amount));
        Arc::new(state)
    }

    #[test]
    fn test_reads_fall_through() {
        let base = base_with_asset(1, 100);
        let cached = base.cached();
        assert!(cached.contains_asset(&asset_ref(1)));
        assert_eq!(
            cached.get_asset(&asset_ref(1)).unwrap().amount,
            U256::from_u64(100)
        );
    }

    #[test]
    fn test_mutations_stay_in_overlay() {
        let base = base_with_asset(1, 100);
        let mut cached = base.cached();
        cached.remove_asset(&asset_ref(1)).unwrap();
        cached.add_asset(asset_ref(2), asset(50));

        assert!(!cached.contains_asset(&asset_ref(1)));
        assert!(cached.contains_asset(&asset_ref(2)));
        // Base snapshot unchanged.
        assert!(base.contains_asset(&asset_ref(1)));
        assert!(!base.contains_asset(&asset_ref(2)));
    }

    #[test]
    fn test_remove_missing_is_key_not_found() {
        let base = Arc::new(WorldState::genesis());
        let mut cached = base.cached();
        assert!(matches!(
            cached.remove_asset(&asset_ref(9)),
            Err(StateError::KeyNotFound(_))
        ));
    }

    #[test]
    fn test_persist_merges_overlay() {
        let base = base_with_asset(1, 100);
        let mut cached = base.cached();
        cached.remove_asset(&asset_ref(1)).unwrap();
        cached.add_asset(asset_ref(2), asset(70));

        let (root, next) = cached.persist();
        assert_eq!(root, next.state_root());
        assert!(!next.contains_asset(&asset_ref(1)));
        assert!(next.contains_asset(&asset_ref(2)));
    }

    #[test]
    fn test_pre_outputs_order_and_missing() {
        let base = base_with_asset(1, 100);
        let cached = base.cached();

        let input = |tag: u8| TxInput {
            output_ref: asset_ref(tag),
            unlock_script: UnlockScript::P2pkh(PublicKey::from_bytes([0u8; 32])),
        };
        let mk_tx = |inputs: Vec<TxInput>| Transaction {
            unsigned: flow_types::UnsignedTransaction {
                network_id: NetworkId::Devnet,
                script_opt: None,
                gas_amount: 0,
                gas_price: U256::zero(),
                inputs,
                fixed_outputs: vec![],
            },
            input_signatures: vec![],
            contract_inputs: vec![],
            generated_outputs: vec![],
        };

        let ok = cached.get_pre_outputs(&mk_tx(vec![input(1)])).unwrap();
        assert_eq!(ok.len(), 1);

        let missing = cached.get_pre_outputs(&mk_tx(vec![input(1), input(9)]));
        assert!(matches!(missing, Err(StateError::KeyNotFound(_))));
    }
}
