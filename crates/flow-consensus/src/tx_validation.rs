//! Transaction validation.
//!
//! Two pipelines run in order, first failure short-circuiting:
//! - **stateless**: structural checks needing no world state
//! - **stateful**: pre-output resolution, balances, script execution,
//!   witness verification, and gas accounting
//!
//! The stateful pipeline charges a deterministic amount of gas; for the
//! canonical 1-input 2-output P2PKH transfer the consumed total is
//! exactly `txBaseGas + txInputBaseGas + 2*txOutputBaseGas +
//! p2pkUnlockGas`.

use crate::error::invalid;
use crate::{ConsensusParams, InvalidTxStatus, ValidationError};
use flow_state::{CachedWorldState, StateError};
use flow_types::{
    ChainIndex, Encode, LockupScript, NetworkId, TokenId, Transaction, TxOutput, U256,
    UnlockScript,
};
use flow_vm::{execute_stateful, execute_stateless, GasBox, Val, VmError};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Result alias for transaction checks.
type TxResult<T = ()> = Result<T, ValidationError<InvalidTxStatus>>;

/// Block-side facts a transaction validates against.
#[derive(Debug, Clone)]
pub struct BlockEnv {
    /// Network of the enclosing block.
    pub network_id: NetworkId,
    /// Timestamp of the enclosing header, milliseconds.
    pub header_timestamp_ms: u64,
    /// Target of the enclosing header.
    pub target: U256,
}

/// The transaction validation pipeline.
pub struct TxValidator {
    params: Arc<ConsensusParams>,
}

impl TxValidator {
    /// Build a validator over the node's consensus parameters.
    pub fn new(params: Arc<ConsensusParams>) -> Self {
        TxValidator { params }
    }

    /// Run both pipelines for a block transaction; returns gas used.
    #[instrument(skip(self, tx, world, env), fields(tx_id = %tx.id(), chain = %chain_index))]
    pub fn validate(
        &self,
        tx: &Transaction,
        chain_index: ChainIndex,
        world: &mut CachedWorldState,
        env: &BlockEnv,
    ) -> TxResult<u64> {
        self.validate_stateless(tx, chain_index)?;
        let gas_used = self.validate_stateful(tx, chain_index, world, env)?;
        debug!(gas_used, "Transaction valid");
        Ok(gas_used)
    }

    /// Structural checks, in pipeline order.
    pub fn validate_stateless(&self, tx: &Transaction, chain_index: ChainIndex) -> TxResult {
        self.check_network_id(tx)?;
        self.check_input_num(tx, chain_index)?;
        self.check_output_num(tx, chain_index)?;
        self.check_gas_bound(tx)?;
        self.check_output_stats(tx)?;
        self.check_group_indices(tx, chain_index)?;
        self.check_unique_inputs(tx, chain_index)?;
        Ok(())
    }

    /// World-state checks, in pipeline order; returns gas used.
    pub fn validate_stateful(
        &self,
        tx: &Transaction,
        chain_index: ChainIndex,
        world: &mut CachedWorldState,
        env: &BlockEnv,
    ) -> TxResult<u64> {
        let pre_outputs = match world.get_pre_outputs(tx) {
            Ok(outputs) => outputs,
            Err(StateError::KeyNotFound(_)) => return invalid(InvalidTxStatus::NonExistInput),
            Err(StateError::Storage(e)) => return Err(ValidationError::Io(e)),
            Err(StateError::Serialization(e)) => {
                return Err(ValidationError::Io(flow_storage::StorageError::Serde(e)))
            }
        };

        let mut gas = GasBox::new(tx.unsigned.gas_amount);
        let intrinsic = self.params.tx_base_gas
            + self.params.tx_input_base_gas * tx.unsigned.inputs.len() as u64
            + self.params.tx_output_base_gas * tx.output_count() as u64;
        if gas.use_gas(intrinsic).is_err() {
            return invalid(InvalidTxStatus::InvalidStartGas);
        }

        self.check_lock_time(&pre_outputs, env)?;
        self.check_alf_balance(tx, &pre_outputs)?;
        // The script runs before the token check so the check sees the
        // VM's actual issuance registry.
        let issued_tokens = self.check_tx_script(tx, chain_index, world, &mut gas)?;
        self.check_token_balance(tx, &pre_outputs, &issued_tokens)?;
        self.check_gas_and_witnesses(tx, &pre_outputs, &mut gas)?;

        Ok(gas.used())
    }

    fn check_network_id(&self, tx: &Transaction) -> TxResult {
        if tx.unsigned.network_id != self.params.network_id {
            return invalid(InvalidTxStatus::InvalidNetworkId);
        }
        Ok(())
    }

    fn check_input_num(&self, tx: &Transaction, chain_index: ChainIndex) -> TxResult {
        if tx.unsigned.inputs.is_empty() {
            return invalid(InvalidTxStatus::NoInputs);
        }
        if tx.unsigned.inputs.len() > self.params.max_tx_input_num {
            return invalid(InvalidTxStatus::TooManyInputs);
        }
        if !tx.contract_inputs.is_empty() && !chain_index.is_intra_group() {
            return invalid(InvalidTxStatus::ContractInputForInterGroupTx);
        }
        Ok(())
    }

    fn check_output_num(&self, tx: &Transaction, chain_index: ChainIndex) -> TxResult {
        if tx.output_count() == 0 {
            return invalid(InvalidTxStatus::NoOutputs);
        }
        if tx.output_count() > self.params.max_tx_output_num {
            return invalid(InvalidTxStatus::TooManyOutputs);
        }
        if !tx.generated_outputs.is_empty() && !chain_index.is_intra_group() {
            return invalid(InvalidTxStatus::GeneratedOutputForInterGroupTx);
        }
        Ok(())
    }

    fn check_gas_bound(&self, tx: &Transaction) -> TxResult {
        let gas = tx.unsigned.gas_amount;
        if gas < self.params.minimal_gas || gas > self.params.max_gas_per_tx {
            return invalid(InvalidTxStatus::InvalidStartGas);
        }
        let price = &tx.unsigned.gas_price;
        if price.is_zero() || *price >= self.params.max_alf_value {
            return invalid(InvalidTxStatus::InvalidGasPrice);
        }
        Ok(())
    }

    fn check_output_stats(&self, tx: &Transaction) -> TxResult {
        let mut total = U256::zero();
        for output in tx.all_outputs() {
            if output.amount().is_zero() {
                return invalid(InvalidTxStatus::InvalidOutputStats);
            }
            if output.tokens().len() > self.params.max_token_per_utxo {
                return invalid(InvalidTxStatus::InvalidOutputStats);
            }
            for (_, amount) in output.tokens() {
                if amount.is_zero() {
                    return invalid(InvalidTxStatus::InvalidOutputStats);
                }
            }
            if let TxOutput::Asset(asset) = &output {
                if asset.additional_data.len() > self.params.max_output_data_size {
                    return invalid(InvalidTxStatus::OutputDataSizeExceeded);
                }
            }
            total = match total.checked_add(output.amount()) {
                Some(sum) => sum,
                None => return invalid(InvalidTxStatus::InvalidOutputStats),
            };
        }
        Ok(())
    }

    fn check_group_indices(&self, tx: &Transaction, chain_index: ChainIndex) -> TxResult {
        let groups = self.params.groups;
        for input in &tx.unsigned.inputs {
            if input.output_ref.group_index(groups) != chain_index.from {
                return invalid(InvalidTxStatus::InvalidInputGroupIndex);
            }
        }

        let mut touches_to = false;
        for output in &tx.unsigned.fixed_outputs {
            let group = output.group_index(groups);
            if chain_index.is_intra_group() {
                if group != chain_index.from {
                    return invalid(InvalidTxStatus::InvalidOutputGroupIndex);
                }
            } else {
                if group != chain_index.from && group != chain_index.to {
                    return invalid(InvalidTxStatus::InvalidOutputGroupIndex);
                }
                if group == chain_index.to {
                    touches_to = true;
                }
            }
        }
        if !chain_index.is_intra_group() && !touches_to {
            return invalid(InvalidTxStatus::InvalidOutputGroupIndex);
        }
        Ok(())
    }

    fn check_unique_inputs(&self, tx: &Transaction, chain_index: ChainIndex) -> TxResult {
        let mut seen = HashSet::new();
        for input in &tx.unsigned.inputs {
            if !seen.insert(input.output_ref.encode_to_vec()) {
                return invalid(InvalidTxStatus::TxDoubleSpending);
            }
        }
        if chain_index.is_intra_group() {
            for contract_ref in &tx.contract_inputs {
                if !seen.insert(contract_ref.encode_to_vec()) {
                    return invalid(InvalidTxStatus::TxDoubleSpending);
                }
            }
        }
        Ok(())
    }

    fn check_lock_time(&self, pre_outputs: &[TxOutput], env: &BlockEnv) -> TxResult {
        for output in pre_outputs {
            if let TxOutput::Asset(asset) = output {
                if asset.lock_time_ms > 0 && env.header_timestamp_ms < asset.lock_time_ms {
                    return invalid(InvalidTxStatus::TimeLockedTx);
                }
            }
        }
        Ok(())
    }

    fn check_alf_balance(&self, tx: &Transaction, pre_outputs: &[TxOutput]) -> TxResult {
        let mut input_sum = U256::zero();
        for output in pre_outputs {
            input_sum = match input_sum.checked_add(output.amount()) {
                Some(sum) => sum,
                None => return invalid(InvalidTxStatus::BalanceOverFlow),
            };
        }

        let mut output_sum = U256::zero();
        for output in tx.all_outputs() {
            output_sum = match output_sum.checked_add(output.amount()) {
                Some(sum) => sum,
                None => return invalid(InvalidTxStatus::BalanceOverFlow),
            };
        }
        let Some(fee) = tx.unsigned.gas_fee() else {
            return invalid(InvalidTxStatus::BalanceOverFlow);
        };
        let Some(output_total) = output_sum.checked_add(&fee) else {
            return invalid(InvalidTxStatus::BalanceOverFlow);
        };

        if input_sum != output_total {
            return invalid(InvalidTxStatus::InvalidAlfBalance);
        }
        Ok(())
    }

    /// Per-token equality against the script's issuance registry: for
    /// every token seen on either side, outputs must carry exactly the
    /// inputs plus whatever the script actually minted. Burning is not
    /// permitted, and a minted amount must be fully placed in outputs.
    fn check_token_balance(
        &self,
        tx: &Transaction,
        pre_outputs: &[TxOutput],
        issued_tokens: &[(TokenId, U256)],
    ) -> TxResult {
        let input_tokens = Self::sum_tokens(pre_outputs.iter().cloned())?;
        let output_tokens = Self::sum_tokens(tx.all_outputs())?;

        let mut issued: BTreeMap<TokenId, U256> = BTreeMap::new();
        for (token_id, amount) in issued_tokens {
            let entry = issued.entry(*token_id).or_insert_with(U256::zero);
            *entry = match entry.checked_add(amount) {
                Some(sum) => sum,
                None => return invalid(InvalidTxStatus::BalanceOverFlow),
            };
        }

        let token_ids: BTreeSet<TokenId> = input_tokens
            .keys()
            .chain(output_tokens.keys())
            .chain(issued.keys())
            .copied()
            .collect();
        for token_id in token_ids {
            let input_amount = input_tokens.get(&token_id).cloned().unwrap_or_else(U256::zero);
            let issued_amount = issued.get(&token_id).cloned().unwrap_or_else(U256::zero);
            let Some(expected) = input_amount.checked_add(&issued_amount) else {
                return invalid(InvalidTxStatus::BalanceOverFlow);
            };
            let output_amount = output_tokens.get(&token_id).cloned().unwrap_or_else(U256::zero);
            if output_amount != expected {
                return invalid(InvalidTxStatus::InvalidTokenBalance);
            }
        }
        Ok(())
    }

    fn sum_tokens(
        outputs: impl Iterator<Item = TxOutput>,
    ) -> TxResult<BTreeMap<TokenId, U256>> {
        let mut sums: BTreeMap<TokenId, U256> = BTreeMap::new();
        for output in outputs {
            for (token_id, amount) in output.tokens() {
                let entry = sums.entry(*token_id).or_insert_with(U256::zero);
                *entry = match entry.checked_add(amount) {
                    Some(sum) => sum,
                    None => return invalid(InvalidTxStatus::BalanceOverFlow),
                };
            }
        }
        Ok(sums)
    }

    /// Re-execute the tx script and return the tokens it minted.
    fn check_tx_script(
        &self,
        tx: &Transaction,
        _chain_index: ChainIndex,
        world: &mut CachedWorldState,
        gas: &mut GasBox,
    ) -> TxResult<Vec<(TokenId, U256)>> {
        let Some(script) = &tx.unsigned.script_opt else {
            // Generated outputs are VM products; without a script there
            // is nothing that could have produced them.
            if !tx.generated_outputs.is_empty() {
                return invalid(InvalidTxStatus::InvalidOutputStats);
            }
            return Ok(Vec::new());
        };

        let outcome = execute_stateful(script, Vec::new(), tx.id(), world, gas)
            .map_err(|e| ValidationError::Invalid(InvalidTxStatus::TxScriptExeFailed(e)))?;

        // The broadcast transaction carries the script's products; they
        // must match re-execution exactly.
        if outcome.generated_outputs != tx.generated_outputs {
            return invalid(InvalidTxStatus::TxScriptExeFailed(VmError::AssertionFailed));
        }
        Ok(outcome.issued_tokens)
    }

    fn check_gas_and_witnesses(
        &self,
        tx: &Transaction,
        pre_outputs: &[TxOutput],
        gas: &mut GasBox,
    ) -> TxResult {
        let tx_id = tx.id();
        let mut seen_pairs: HashSet<(Vec<u8>, Vec<u8>)> = HashSet::new();
        let mut next_signature = 0usize;

        for (input, pre_output) in tx.unsigned.inputs.iter().zip(pre_outputs) {
            let Some(asset) = pre_output.as_asset() else {
                return invalid(InvalidTxStatus::NonExistInput);
            };
            let lockup = &asset.lockup_script;

            let pair = (
                lockup.encode_to_vec(),
                input.unlock_script.encode_to_vec(),
            );
            // One witness per distinct unlock condition: repeats of the
            // same (lockup, unlock) pair reuse the verified signature.
            if !seen_pairs.insert(pair) {
                continue;
            }

            match (lockup, &input.unlock_script) {
                (LockupScript::P2pkh { pub_key_hash }, UnlockScript::P2pkh(key)) => {
                    if gas.use_gas(self.params.p2pk_unlock_gas).is_err() {
                        return invalid(InvalidTxStatus::InvalidStartGas);
                    }
                    if key.hash() != *pub_key_hash {
                        return invalid(InvalidTxStatus::InvalidPublicKeyHash);
                    }
                    let signature = match tx.input_signatures.get(next_signature) {
                        Some(sig) => sig,
                        None => return invalid(InvalidTxStatus::NotEnoughSignature),
                    };
                    next_signature += 1;
                    if !key.verify(tx_id.as_bytes(), signature) {
                        return invalid(InvalidTxStatus::InvalidSignature);
                    }
                }
                (
                    LockupScript::P2mpkh { pub_key_hashes, m },
                    UnlockScript::P2mpkh(revealed),
                ) => {
                    if revealed.len() != *m as usize {
                        return invalid(InvalidTxStatus::InvalidNumberOfPublicKey);
                    }
                    let mut last_index: Option<u32> = None;
                    for (key, index) in revealed {
                        if let Some(prev) = last_index {
                            if *index <= prev {
                                return invalid(InvalidTxStatus::InvalidP2mpkhUnlockScript);
                            }
                        }
                        last_index = Some(*index);
                        let Some(expected) = pub_key_hashes.get(*index as usize) else {
                            return invalid(InvalidTxStatus::InvalidP2mpkhUnlockScript);
                        };
                        if gas.use_gas(self.params.p2pk_unlock_gas).is_err() {
                            return invalid(InvalidTxStatus::InvalidStartGas);
                        }
                        if key.hash() != *expected {
                            return invalid(InvalidTxStatus::InvalidPublicKeyHash);
                        }
                        let signature = match tx.input_signatures.get(next_signature) {
                            Some(sig) => sig,
                            None => return invalid(InvalidTxStatus::NotEnoughSignature),
                        };
                        next_signature += 1;
                        if !key.verify(tx_id.as_bytes(), signature) {
                            return invalid(InvalidTxStatus::InvalidSignature);
                        }
                    }
                }
                (LockupScript::P2sh { script_hash }, UnlockScript::P2sh { script, args }) => {
                    if script.hash() != *script_hash {
                        return invalid(InvalidTxStatus::InvalidScriptHash);
                    }
                    let size = script.bytes_size();
                    let charge = self.params.p2sh_call_gas
                        + self.params.gas_per_script_byte * size as u64
                        + flow_vm::hash_gas(size);
                    if gas.use_gas(charge).is_err() {
                        return invalid(InvalidTxStatus::InvalidStartGas);
                    }
                    let vals = args.iter().map(|a| Val::Bytes(a.clone())).collect();
                    execute_stateless(script, vals, tx_id, gas).map_err(|e| {
                        ValidationError::Invalid(InvalidTxStatus::UnlockScriptExeFailed(e))
                    })?;
                }
                _ => return invalid(InvalidTxStatus::InvalidUnlockScriptType),
            }
        }

        if next_signature < tx.input_signatures.len() {
            return invalid(InvalidTxStatus::TooManySignatures);
        }
        Ok(())
    }
}
