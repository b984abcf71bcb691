//! Block validation.

use crate::error::invalid;
use crate::{
    BlockEnv, ConsensusParams, FlowBlockView, InvalidBlockStatus, InvalidTxStatus, TxValidator,
    ValidationError, HeaderValidator,
};
use flow_state::{CachedWorldState, StateError};
use flow_storage::StorageError;
use flow_types::{
    AssetOutputRef, Block, BrokerInfo, ContractOutputRef, Encode, Hash, Transaction, TxOutput,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Result alias for block checks.
type BlockResult<T = ()> = Result<T, ValidationError<InvalidBlockStatus>>;

/// The block validation pipeline.
///
/// Wraps header validation and runs the per-transaction pipeline against
/// the world state obtained from the block's deps. On success the caller
/// receives the mutated scratch view, ready to persist.
pub struct BlockValidator {
    params: Arc<ConsensusParams>,
    header_validator: HeaderValidator,
    tx_validator: TxValidator,
}

impl BlockValidator {
    /// Build a validator for this broker.
    pub fn new(params: Arc<ConsensusParams>, broker: BrokerInfo) -> Self {
        BlockValidator {
            header_validator: HeaderValidator::new(Arc::clone(&params), broker),
            tx_validator: TxValidator::new(Arc::clone(&params)),
            params,
        }
    }

    /// Run the full pipeline. Returns the scratch world state with the
    /// block's effects applied.
    #[instrument(skip(self, block, view), fields(hash = %block.hash()))]
    pub fn validate<V: FlowBlockView>(
        &self,
        block: &Block,
        view: &V,
        now_ms: u64,
        is_syncing: bool,
    ) -> BlockResult<CachedWorldState> {
        self.header_validator
            .validate(&block.header, view, now_ms, is_syncing)
            .map_err(|e| match e {
                ValidationError::Invalid(status) => {
                    ValidationError::Invalid(InvalidBlockStatus::Header(status))
                }
                ValidationError::Io(io) => ValidationError::Io(io),
            })?;

        self.validate_non_empty(block)?;
        self.validate_coinbase(block)?;
        self.validate_merkle_root(block)?;
        let world = self.validate_transactions(block, view)?;
        debug!(txs = block.transactions.len(), "Block valid");
        Ok(world)
    }

    fn validate_non_empty(&self, block: &Block) -> BlockResult {
        if block.transactions.is_empty() {
            return invalid(InvalidBlockStatus::EmptyTransactionList);
        }
        Ok(())
    }

    fn validate_coinbase(&self, block: &Block) -> BlockResult {
        let Some(coinbase) = block.coinbase() else {
            return invalid(InvalidBlockStatus::EmptyTransactionList);
        };
        if !coinbase.is_coinbase_shaped() {
            return invalid(InvalidBlockStatus::InvalidCoinbase);
        }
        Ok(())
    }

    fn validate_merkle_root(&self, block: &Block) -> BlockResult {
        if block.header.txs_hash != Block::compute_txs_hash(&block.transactions) {
            return invalid(InvalidBlockStatus::InvalidMerkleRoot);
        }
        Ok(())
    }

    fn validate_transactions<V: FlowBlockView>(
        &self,
        block: &Block,
        view: &V,
    ) -> BlockResult<CachedWorldState> {
        let mut world = view.validation_state(block).map_err(map_state_error)?;
        let chain_index = block.chain_index(self.params.groups);
        let env = BlockEnv {
            network_id: self.params.network_id,
            header_timestamp_ms: block.header.timestamp_ms,
            target: block.header.target.clone(),
        };

        let mut spent: HashSet<Vec<u8>> = HashSet::new();
        for tx in block.non_coinbase() {
            // Cross-transaction double spends are a block-level offence;
            // within-tx duplicates stay `TxDoubleSpending` below.
            for input in &tx.unsigned.inputs {
                if spent.contains(&input.output_ref.encode_to_vec()) {
                    return invalid(InvalidBlockStatus::DoubleSpent);
                }
            }

            self.tx_validator
                .validate(tx, chain_index, &mut world, &env)
                .map_err(|e| match e {
                    ValidationError::Invalid(InvalidTxStatus::NonExistInput) => {
                        ValidationError::Invalid(InvalidBlockStatus::InvalidCoins)
                    }
                    ValidationError::Invalid(status) => {
                        ValidationError::Invalid(InvalidBlockStatus::InvalidTx(status))
                    }
                    ValidationError::Io(io) => ValidationError::Io(io),
                })?;

            for input in &tx.unsigned.inputs {
                spent.insert(input.output_ref.encode_to_vec());
            }
            apply_tx_to_world(tx, &mut world, self.params.groups).map_err(map_state_error)?;
        }

        if let Some(coinbase) = block.coinbase() {
            apply_tx_to_world(coinbase, &mut world, self.params.groups)
                .map_err(map_state_error)?;
        }
        Ok(world)
    }
}

/// Fold one validated transaction into the scratch world: inputs spent,
/// outputs created at their canonical references.
pub fn apply_tx_to_world(
    tx: &Transaction,
    world: &mut CachedWorldState,
    groups: u32,
) -> Result<(), StateError> {
    for input in &tx.unsigned.inputs {
        world.remove_asset(&input.output_ref)?;
    }
    for contract_ref in &tx.contract_inputs {
        world.remove_contract_output(contract_ref)?;
    }

    let tx_id = tx.id();
    let fixed = tx.unsigned.fixed_outputs.len() as u32;
    for (i, output) in tx.unsigned.fixed_outputs.iter().enumerate() {
        let output_ref = AssetOutputRef::create(&tx_id, i as u32, output, groups);
        world.add_asset(output_ref, output.clone());
    }
    for (i, output) in tx.generated_outputs.iter().enumerate() {
        let index = fixed + i as u32;
        match output {
            TxOutput::Asset(asset) => {
                let output_ref = AssetOutputRef::create(&tx_id, index, asset, groups);
                world.add_asset(output_ref, asset.clone());
            }
            TxOutput::Contract(contract) => {
                let mut buf = Vec::with_capacity(36);
                tx_id.encode(&mut buf);
                index.encode(&mut buf);
                let id_bytes = contract.contract_id.as_bytes();
                let hint = u32::from_be_bytes([id_bytes[0], id_bytes[1], id_bytes[2], id_bytes[3]]);
                let output_ref = ContractOutputRef {
                    hint,
                    key: Hash::hash(&buf),
                };
                world.add_contract_output(output_ref, contract.clone());
            }
        }
    }
    Ok(())
}

fn map_state_error(e: StateError) -> ValidationError<InvalidBlockStatus> {
    match e {
        StateError::KeyNotFound(what) => ValidationError::Io(StorageError::KeyNotFound(what)),
        StateError::Storage(io) => ValidationError::Io(io),
        StateError::Serialization(what) => ValidationError::Io(StorageError::Serde(what)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use flow_state::WorldState;
    use flow_storage::StorageResult;
    use flow_types::{
        AssetOutput, BlockDeps, BlockHeader, LockupScript, NetworkId, PublicKey, Signature,
        TxInput, U256, UnlockScript, UnsignedTransaction,
    };
    use std::sync::Arc as StdArc;

    const NOW: u64 = 1_700_000_000_000;

    struct TestView {
        known: HashSet<Hash>,
        base: StdArc<WorldState>,
    }

    impl crate::FlowHeaderView for TestView {
        fn contains_hash(&self, hash: &Hash) -> StorageResult<bool> {
            Ok(self.known.contains(hash))
        }

        fn expected_target(&self, _header: &BlockHeader) -> StorageResult<U256> {
            Ok(U256::max_value())
        }
    }

    impl FlowBlockView for TestView {
        fn validation_state(&self, _block: &Block) -> Result<CachedWorldState, StateError> {
            Ok(self.base.cached())
        }
    }

    fn keypair(seed: u8) -> (SigningKey, PublicKey) {
        let sk = SigningKey::from_bytes(&[seed; 32]);
        let pk = PublicKey::from_bytes(sk.verifying_key().to_bytes());
        (sk, pk)
    }

    fn alf(n: u64) -> U256 {
        U256::from_u128(n as u128 * flow_types::ONE_ALF)
    }

    struct Chain {
        validator: BlockValidator,
        view: TestView,
        parent: Hash,
        sk: SigningKey,
        pk: PublicKey,
        utxo_refs: Vec<AssetOutputRef>,
    }

    /// Single-group chain with two spendable 2-ALF UTXOs.
    fn chain() -> Chain {
        let (sk, pk) = keypair(1);
        let refs = vec![
            AssetOutputRef {
                hint: 0,
                key: Hash::hash(b"utxo-1"),
            },
            AssetOutputRef {
                hint: 0,
                key: Hash::hash(b"utxo-2"),
            },
        ];
        let mut cached = StdArc::new(WorldState::genesis()).cached();
        for r in &refs {
            cached.add_asset(*r, AssetOutput::new(alf(2), LockupScript::p2pkh(&pk)));
        }
        let (_, world) = cached.persist();

        let parent = Hash::hash(b"parent");
        Chain {
            validator: BlockValidator::new(
                StdArc::new(ConsensusParams::new(1, NetworkId::Devnet)),
                BrokerInfo::solo(),
            ),
            view: TestView {
                known: [parent].into_iter().collect(),
                base: StdArc::new(world),
            },
            parent,
            sk,
            pk,
            utxo_refs: refs,
        }
    }

    fn spend_tx(c: &Chain, utxo: AssetOutputRef) -> Transaction {
        let p = ConsensusParams::new(1, NetworkId::Devnet);
        let fee = U256::from_u64(p.minimal_gas)
            .checked_mul(&U256::from_u64(100))
            .unwrap();
        let change = alf(2).checked_sub(&fee).unwrap();
        let unsigned = UnsignedTransaction {
            network_id: NetworkId::Devnet,
            script_opt: None,
            gas_amount: p.minimal_gas,
            gas_price: U256::from_u64(100),
            inputs: vec![TxInput {
                output_ref: utxo,
                unlock_script: UnlockScript::P2pkh(c.pk),
            }],
            fixed_outputs: vec![AssetOutput::new(change, LockupScript::p2pkh(&c.pk))],
        };
        let signature = Signature::from_bytes(c.sk.sign(unsigned.hash().as_bytes()).to_bytes());
        Transaction::new(unsigned, vec![signature])
    }

    fn block_with(c: &Chain, txs: Vec<Transaction>) -> Block {
        let coinbase = Transaction::coinbase(
            NetworkId::Devnet,
            AssetOutput::new(alf(1), LockupScript::p2pkh(&c.pk)),
        );
        let mut transactions = vec![coinbase];
        transactions.extend(txs);
        let header = BlockHeader {
            parent_hash: c.parent,
            block_deps: BlockDeps::new(vec![]),
            txs_hash: Block::compute_txs_hash(&transactions),
            timestamp_ms: NOW,
            target: U256::max_value(),
            nonce: 0,
        };
        Block {
            header,
            transactions,
        }
    }

    #[test]
    fn test_valid_block_passes_and_updates_world() {
        let c = chain();
        let tx = spend_tx(&c, c.utxo_refs[0]);
        let block = block_with(&c, vec![tx.clone()]);
        let world = c.validator.validate(&block, &c.view, NOW, false).unwrap();

        // Spent input gone, change output present.
        assert!(!world.contains_asset(&c.utxo_refs[0]));
        let change_ref = tx.fixed_output_refs(1)[0];
        assert!(world.contains_asset(&change_ref));
    }

    #[test]
    fn test_empty_transaction_list_rejected() {
        let c = chain();
        let mut block = block_with(&c, vec![]);
        block.transactions.clear();
        block.header.txs_hash = Block::compute_txs_hash(&block.transactions);
        let err = c.validator.validate(&block, &c.view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidBlockStatus::EmptyTransactionList)
        );
    }

    #[test]
    fn test_bad_coinbase_rejected() {
        let c = chain();
        // First transaction is a regular spend, not a coinbase.
        let tx = spend_tx(&c, c.utxo_refs[0]);
        let mut block = block_with(&c, vec![]);
        block.transactions[0] = tx;
        block.header.txs_hash = Block::compute_txs_hash(&block.transactions);
        let err = c.validator.validate(&block, &c.view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidBlockStatus::InvalidCoinbase)
        );
    }

    #[test]
    fn test_wrong_merkle_root_rejected() {
        let c = chain();
        let mut block = block_with(&c, vec![spend_tx(&c, c.utxo_refs[0])]);
        block.header.txs_hash = Hash::hash(b"wrong");
        let err = c.validator.validate(&block, &c.view, NOW, false).unwrap_err();
        assert_eq!(
            err.invalid_status(),
            Some(&InvalidBlockStatus::InvalidMerkleRoot)
        );
    }

    #[test]
    fn test_double_spend_across_txs_rejected() {
        let c = chain();
        let tx_a = spend_tx(&c, c.utxo_refs[0]);
        let mut tx_b = spend_tx(&c, c.utxo_refs[0]);
        // Distinct tx id, same input ref; rebalance for the extra gas unit.
        tx_b.unsigned.gas_amount += 1;
        tx_b.unsigned.fixed_outputs[0].amount = tx_b.unsigned.fixed_outputs[0]
            .amount
            .checked_sub(&U256::from_u64(100))
            .unwrap();
        let sig = Signature::from_bytes(c.sk.sign(tx_b.unsigned.hash().as_bytes()).to_bytes());
        tx_b.input_signatures = vec![sig];

        let block = block_with(&c, vec![tx_a, tx_b]);
        let err = c.validator.validate(&block, &c.view, NOW, false).unwrap_err();
        assert_eq!(err.invalid_status(), Some(&InvalidBlockStatus::DoubleSpent));
    }

    #[test]
    fn test_unknown_coins_rejected() {
        let c = chain();
        let ghost = AssetOutputRef {
            hint: 0,
            key: Hash::hash(b"ghost"),
        };
        let tx = spend_tx(&c, ghost);
        let block = block_with(&c, vec![tx]);
        let err = c.validator.validate(&block, &c.view, NOW, false).unwrap_err();
        assert_eq!(err.invalid_status(), Some(&InvalidBlockStatus::InvalidCoins));
    }

    #[test]
    fn test_intra_block_spend_chain() {
        let c = chain();
        let tx_a = spend_tx(&c, c.utxo_refs[0]);
        // Spend tx_a's change inside the same block.
        let change_ref = tx_a.fixed_output_refs(1)[0];
        let change_amount = tx_a.unsigned.fixed_outputs[0].amount.clone();

        let p = ConsensusParams::new(1, NetworkId::Devnet);
        let fee = U256::from_u64(p.minimal_gas)
            .checked_mul(&U256::from_u64(100))
            .unwrap();
        let unsigned = UnsignedTransaction {
            network_id: NetworkId::Devnet,
            script_opt: None,
            gas_amount: p.minimal_gas,
            gas_price: U256::from_u64(100),
            inputs: vec![TxInput {
                output_ref: change_ref,
                unlock_script: UnlockScript::P2pkh(c.pk),
            }],
            fixed_outputs: vec![AssetOutput::new(
                change_amount.checked_sub(&fee).unwrap(),
                LockupScript::p2pkh(&c.pk),
            )],
        };
        let sig = Signature::from_bytes(c.sk.sign(unsigned.hash().as_bytes()).to_bytes());
        let tx_b = Transaction::new(unsigned, vec![sig]);

        let block = block_with(&c, vec![tx_a, tx_b]);
        assert!(c.validator.validate(&block, &c.view, NOW, false).is_ok());
    }
}
