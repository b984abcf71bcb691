//! Transactions.

use crate::codec::{put_len, put_var_bytes};
use crate::vm::Script;
use crate::{
    AssetOutput, AssetOutputRef, CodecError, CodecResult, ContractOutputRef, Decode, Encode, Hash,
    NetworkId, PublicKey, Reader, Signature, TxOutput, U256,
};

/// Witness unlocking one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnlockScript {
    /// Reveal the key hashing to the lockup's `pub_key_hash`.
    P2pkh(PublicKey),
    /// Reveal `m` keys with their positions in the lockup key list,
    /// strictly increasing.
    P2mpkh(Vec<(PublicKey, u32)>),
    /// Reveal the script hashing to the lockup's `script_hash`, plus its
    /// arguments.
    P2sh {
        /// The script whose hash the lockup commits to.
        script: Script,
        /// Arguments pushed before execution.
        args: Vec<Vec<u8>>,
    },
}

impl Encode for UnlockScript {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            UnlockScript::P2pkh(key) => {
                buf.push(0);
                key.encode(buf);
            }
            UnlockScript::P2mpkh(keys) => {
                buf.push(1);
                put_len(buf, keys.len());
                for (key, index) in keys {
                    key.encode(buf);
                    index.encode(buf);
                }
            }
            UnlockScript::P2sh { script, args } => {
                buf.push(2);
                script.encode(buf);
                put_len(buf, args.len());
                for arg in args {
                    put_var_bytes(buf, arg);
                }
            }
        }
    }
}

impl Decode for UnlockScript {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        match reader.get_u8()? {
            0 => Ok(UnlockScript::P2pkh(PublicKey::decode(reader)?)),
            1 => {
                let len = reader.get_len()?;
                let mut keys = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    let key = PublicKey::decode(reader)?;
                    let index = reader.get_u32()?;
                    keys.push((key, index));
                }
                Ok(UnlockScript::P2mpkh(keys))
            }
            2 => {
                let script = Script::decode(reader)?;
                let len = reader.get_len()?;
                let mut args = Vec::with_capacity(len.min(64));
                for _ in 0..len {
                    args.push(reader.get_var_bytes()?);
                }
                Ok(UnlockScript::P2sh { script, args })
            }
            tag => Err(CodecError::Invalid(format!("Bad unlock tag: {tag}"))),
        }
    }
}

/// One transaction input: the output being spent plus its witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// The output being consumed.
    pub output_ref: AssetOutputRef,
    /// The unlocking witness.
    pub unlock_script: UnlockScript,
}

impl Encode for TxInput {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.output_ref.encode(buf);
        self.unlock_script.encode(buf);
    }
}

impl Decode for TxInput {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(TxInput {
            output_ref: AssetOutputRef::decode(reader)?,
            unlock_script: UnlockScript::decode(reader)?,
        })
    }
}

/// The signed-over portion of a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    /// Network this transaction is valid on.
    pub network_id: NetworkId,
    /// Optional tx script, executed with the stateful VM.
    pub script_opt: Option<Script>,
    /// Gas budget.
    pub gas_amount: u64,
    /// Price per gas unit, in ALF sub-units.
    pub gas_price: U256,
    /// Asset inputs.
    pub inputs: Vec<TxInput>,
    /// Outputs fixed at signing time.
    pub fixed_outputs: Vec<AssetOutput>,
}

impl UnsignedTransaction {
    /// The transaction id: hash of the canonical encoding.
    pub fn hash(&self) -> Hash {
        crate::hash_of(self)
    }

    /// Total gas fee, `gas_amount * gas_price`; `None` on overflow.
    pub fn gas_fee(&self) -> Option<U256> {
        U256::from_u64(self.gas_amount).checked_mul(&self.gas_price)
    }
}

impl Encode for UnsignedTransaction {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.network_id.encode(buf);
        self.script_opt.encode(buf);
        self.gas_amount.encode(buf);
        self.gas_price.encode(buf);
        self.inputs.encode(buf);
        self.fixed_outputs.encode(buf);
    }
}

impl Decode for UnsignedTransaction {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(UnsignedTransaction {
            network_id: NetworkId::decode(reader)?,
            script_opt: Option::<Script>::decode(reader)?,
            gas_amount: reader.get_u64()?,
            gas_price: U256::decode(reader)?,
            inputs: Vec::<TxInput>::decode(reader)?,
            fixed_outputs: Vec::<AssetOutput>::decode(reader)?,
        })
    }
}

/// A full transaction: the unsigned part plus witnesses and VM products.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Signed-over content.
    pub unsigned: UnsignedTransaction,
    /// Signatures, one per distinct `(lockup, unlock)` pair.
    pub input_signatures: Vec<Signature>,
    /// Contract outputs consumed by the tx script.
    pub contract_inputs: Vec<ContractOutputRef>,
    /// Outputs produced by the tx script.
    pub generated_outputs: Vec<TxOutput>,
}

impl Transaction {
    /// Wrap an unsigned transaction with its signatures.
    pub fn new(unsigned: UnsignedTransaction, input_signatures: Vec<Signature>) -> Self {
        Transaction {
            unsigned,
            input_signatures,
            contract_inputs: Vec::new(),
            generated_outputs: Vec::new(),
        }
    }

    /// Build a coinbase: no inputs, one output, the zero signature.
    pub fn coinbase(network_id: NetworkId, output: AssetOutput) -> Self {
        let unsigned = UnsignedTransaction {
            network_id,
            script_opt: None,
            gas_amount: 0,
            gas_price: U256::zero(),
            inputs: Vec::new(),
            fixed_outputs: vec![output],
        };
        Transaction {
            unsigned,
            input_signatures: vec![Signature::zero()],
            contract_inputs: Vec::new(),
            generated_outputs: Vec::new(),
        }
    }

    /// The transaction id.
    pub fn id(&self) -> Hash {
        self.unsigned.hash()
    }

    /// Whether this transaction has coinbase shape.
    pub fn is_coinbase_shaped(&self) -> bool {
        self.unsigned.inputs.is_empty()
            && self.unsigned.fixed_outputs.len() == 1
            && self.generated_outputs.is_empty()
            && self.contract_inputs.is_empty()
            && self.input_signatures.len() == 1
            && self.input_signatures[0].is_zero()
    }

    /// Total output count, fixed plus generated.
    pub fn output_count(&self) -> usize {
        self.unsigned.fixed_outputs.len() + self.generated_outputs.len()
    }

    /// All outputs in canonical order: fixed first, then generated.
    pub fn all_outputs(&self) -> impl Iterator<Item = TxOutput> + '_ {
        self.unsigned
            .fixed_outputs
            .iter()
            .cloned()
            .map(TxOutput::Asset)
            .chain(self.generated_outputs.iter().cloned())
    }

    /// References of the asset outputs this transaction creates.
    pub fn fixed_output_refs(&self, groups: u32) -> Vec<AssetOutputRef> {
        let id = self.id();
        self.unsigned
            .fixed_outputs
            .iter()
            .enumerate()
            .map(|(i, output)| AssetOutputRef::create(&id, i as u32, output, groups))
            .collect()
    }
}

impl Encode for Transaction {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.unsigned.encode(buf);
        self.input_signatures.encode(buf);
        self.contract_inputs.encode(buf);
        self.generated_outputs.encode(buf);
    }
}

impl Decode for Transaction {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(Transaction {
            unsigned: UnsignedTransaction::decode(reader)?,
            input_signatures: Vec::<Signature>::decode(reader)?,
            contract_inputs: Vec::<ContractOutputRef>::decode(reader)?,
            generated_outputs: Vec::<TxOutput>::decode(reader)?,
        })
    }
}
