//! Transaction outputs and the references that identify them.

use crate::codec::put_var_bytes;
use crate::{
    CodecError, CodecResult, Decode, Encode, GroupIndex, Hash, LockupScript, Reader, U256,
};

/// Identifier of a token kind.
pub type TokenId = Hash;

/// Identifier of a contract.
pub type ContractId = Hash;

/// An asset output: plain value plus optional token sub-balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetOutput {
    /// ALF amount carried by the output.
    pub amount: U256,
    /// Spending condition.
    pub lockup_script: LockupScript,
    /// Milliseconds since epoch before which the output cannot be spent;
    /// zero means unlocked.
    pub lock_time_ms: u64,
    /// Token sub-balances.
    pub tokens: Vec<(TokenId, U256)>,
    /// Opaque payload.
    pub additional_data: Vec<u8>,
}

impl AssetOutput {
    /// A plain unlocked transfer output.
    pub fn new(amount: U256, lockup_script: LockupScript) -> Self {
        AssetOutput {
            amount,
            lockup_script,
            lock_time_ms: 0,
            tokens: Vec::new(),
            additional_data: Vec::new(),
        }
    }

    /// The group this output belongs to.
    pub fn group_index(&self, groups: u32) -> GroupIndex {
        self.lockup_script.group_index(groups)
    }
}

impl Encode for AssetOutput {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.amount.encode(buf);
        self.lockup_script.encode(buf);
        self.lock_time_ms.encode(buf);
        crate::codec::put_len(buf, self.tokens.len());
        for (id, amount) in &self.tokens {
            id.encode(buf);
            amount.encode(buf);
        }
        put_var_bytes(buf, &self.additional_data);
    }
}

impl Decode for AssetOutput {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let amount = U256::decode(reader)?;
        let lockup_script = LockupScript::decode(reader)?;
        let lock_time_ms = reader.get_u64()?;
        let token_count = reader.get_len()?;
        let mut tokens = Vec::with_capacity(token_count.min(64));
        for _ in 0..token_count {
            let id = Hash::decode(reader)?;
            let amount = U256::decode(reader)?;
            tokens.push((id, amount));
        }
        let additional_data = reader.get_var_bytes()?;
        Ok(AssetOutput {
            amount,
            lockup_script,
            lock_time_ms,
            tokens,
            additional_data,
        })
    }
}

/// A contract output: value held by on-chain code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractOutput {
    /// ALF amount held by the contract.
    pub amount: U256,
    /// Contract this output belongs to.
    pub contract_id: ContractId,
    /// Token sub-balances.
    pub tokens: Vec<(TokenId, U256)>,
}

impl Encode for ContractOutput {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.amount.encode(buf);
        self.contract_id.encode(buf);
        crate::codec::put_len(buf, self.tokens.len());
        for (id, amount) in &self.tokens {
            id.encode(buf);
            amount.encode(buf);
        }
    }
}

impl Decode for ContractOutput {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let amount = U256::decode(reader)?;
        let contract_id = Hash::decode(reader)?;
        let token_count = reader.get_len()?;
        let mut tokens = Vec::with_capacity(token_count.min(64));
        for _ in 0..token_count {
            let id = Hash::decode(reader)?;
            let amount = U256::decode(reader)?;
            tokens.push((id, amount));
        }
        Ok(ContractOutput {
            amount,
            contract_id,
            tokens,
        })
    }
}

/// Either kind of output, as produced by transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutput {
    /// Asset output.
    Asset(AssetOutput),
    /// Contract output.
    Contract(ContractOutput),
}

impl TxOutput {
    /// ALF amount of the output.
    pub fn amount(&self) -> &U256 {
        match self {
            TxOutput::Asset(o) => &o.amount,
            TxOutput::Contract(o) => &o.amount,
        }
    }

    /// Token sub-balances of the output.
    pub fn tokens(&self) -> &[(TokenId, U256)] {
        match self {
            TxOutput::Asset(o) => &o.tokens,
            TxOutput::Contract(o) => &o.tokens,
        }
    }

    /// The asset output, if this is one.
    pub fn as_asset(&self) -> Option<&AssetOutput> {
        match self {
            TxOutput::Asset(o) => Some(o),
            TxOutput::Contract(_) => None,
        }
    }
}

impl Encode for TxOutput {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            TxOutput::Asset(o) => {
                buf.push(0);
                o.encode(buf);
            }
            TxOutput::Contract(o) => {
                buf.push(1);
                o.encode(buf);
            }
        }
    }
}

impl Decode for TxOutput {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        match reader.get_u8()? {
            0 => Ok(TxOutput::Asset(AssetOutput::decode(reader)?)),
            1 => Ok(TxOutput::Contract(ContractOutput::decode(reader)?)),
            tag => Err(CodecError::Invalid(format!("Bad output tag: {tag}"))),
        }
    }
}

/// Reference to an asset output.
///
/// The hint encodes the owning group; the key is the UTXO identifier
/// derived from the producing transaction and output position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetOutputRef {
    /// Group-encoding hint.
    pub hint: u32,
    /// UTXO key.
    pub key: Hash,
}

impl AssetOutputRef {
    /// Build the reference for output `index` of transaction `tx_id`.
    pub fn create(tx_id: &Hash, index: u32, output: &AssetOutput, groups: u32) -> Self {
        let mut buf = Vec::with_capacity(36);
        tx_id.encode(&mut buf);
        index.encode(&mut buf);
        let key = Hash::hash(&buf);
        let raw = output.lockup_script.script_hint();
        // Align the hint so `hint % groups` lands on the output's group.
        let group = output.group_index(groups).value();
        let base = raw - raw % groups;
        let hint = base
            .checked_add(group)
            .unwrap_or_else(|| base - groups + group);
        AssetOutputRef { hint, key }
    }

    /// The group this reference points into.
    pub fn group_index(&self, groups: u32) -> GroupIndex {
        GroupIndex::from_hint(self.hint, groups)
    }
}

impl Encode for AssetOutputRef {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.hint.encode(buf);
        self.key.encode(buf);
    }
}

impl Decode for AssetOutputRef {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let hint = reader.get_u32()?;
        let key = Hash::decode(reader)?;
        Ok(AssetOutputRef { hint, key })
    }
}

/// Reference to a contract output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractOutputRef {
    /// Group-encoding hint.
    pub hint: u32,
    /// Output key.
    pub key: Hash,
}

impl Encode for ContractOutputRef {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.hint.encode(buf);
        self.key.encode(buf);
    }
}

impl Decode for ContractOutputRef {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        let hint = reader.get_u32()?;
        let key = Hash::decode(reader)?;
        Ok(ContractOutputRef { hint, key })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_lockup() -> LockupScript {
        LockupScript::P2pkh {
            pub_key_hash: Hash::hash(b"key"),
        }
    }

    #[test]
    fn test_asset_output_roundtrip() {
        let output = AssetOutput {
            amount: U256::from_u64(42),
            lockup_script: sample_lockup(),
            lock_time_ms: 1234,
            tokens: vec![(Hash::hash(b"token"), U256::from_u64(7))],
            additional_data: vec![1, 2, 3],
        };
        let bytes = output.encode_to_vec();
        assert_eq!(AssetOutput::decode_exact(&bytes).unwrap(), output);
    }

    #[test]
    fn test_tx_output_tags() {
        let asset = TxOutput::Asset(AssetOutput::new(U256::one(), sample_lockup()));
        let contract = TxOutput::Contract(ContractOutput {
            amount: U256::one(),
            contract_id: Hash::hash(b"contract"),
            tokens: Vec::new(),
        });
        for output in [asset, contract] {
            let bytes = output.encode_to_vec();
            assert_eq!(TxOutput::decode_exact(&bytes).unwrap(), output);
        }
    }

    #[test]
    fn test_output_ref_group_matches_lockup() {
        let groups = 4;
        let output = AssetOutput::new(U256::one(), sample_lockup());
        let r = AssetOutputRef::create(&Hash::hash(b"tx"), 0, &output, groups);
        assert_eq!(r.group_index(groups), output.group_index(groups));
    }

    #[test]
    fn test_output_ref_distinct_per_index() {
        let groups = 2;
        let output = AssetOutput::new(U256::one(), sample_lockup());
        let tx = Hash::hash(b"tx");
        let a = AssetOutputRef::create(&tx, 0, &output, groups);
        let b = AssetOutputRef::create(&tx, 1, &output, groups);
        assert_ne!(a.key, b.key);
    }
}
