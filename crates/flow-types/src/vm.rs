//! Script value types: instructions and method bodies.
//!
//! Only the data model lives here; the interpreter is `flow-vm`. Keeping
//! the two apart mirrors the split between chain types and evaluator and
//! lets transactions embed scripts without dragging in execution state.

use crate::codec::put_var_bytes;
use crate::{CodecError, CodecResult, Decode, Encode, Hash, Reader, U256};

/// One VM instruction.
///
/// The stateless dialect is everything except the token/output
/// instructions; those require a stateful context and are rejected by the
/// stateless interpreter with a type error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instr {
    /// Push `true`.
    TrueConst,
    /// Push `false`.
    FalseConst,
    /// Push a constant `U256`.
    U256Const(U256),
    /// Push constant bytes.
    BytesConst(Vec<u8>),
    /// Drop the top of the operand stack.
    Pop,
    /// Duplicate the top of the operand stack.
    Dup,
    /// Swap the two topmost operands.
    Swap,
    /// Checked addition of the two topmost `U256` operands.
    U256Add,
    /// Checked subtraction (`second - top`).
    U256Sub,
    /// Equality of the two topmost `U256` operands.
    U256Eq,
    /// Equality of the two topmost byte operands.
    BytesEq,
    /// Blake2b-256 of the top byte operand.
    Blake2b,
    /// Logical AND of the two topmost booleans.
    BoolAnd,
    /// Logical OR of the two topmost booleans.
    BoolOr,
    /// Negation of the top boolean.
    BoolNot,
    /// Fail with `AssertionFailed` unless the top operand is `true`.
    Assert,
    /// Pop signature bytes then key bytes; verify over the tx id.
    VerifySignature,
    /// Push a frame for the given method.
    CallMethod(u8),
    /// Finish the current frame.
    Return,
    /// Stateful: pop an amount, mint a fresh token id, push it.
    IssueToken,
    /// Stateful: pop an amount then lockup bytes, emit an asset output.
    GenerateOutput,
    /// Stateful: pop token amount, token id, alf amount, then lockup
    /// bytes; emit an asset output carrying the token.
    GenerateTokenOutput,
}

impl Instr {
    fn tag(&self) -> u8 {
        match self {
            Instr::TrueConst => 0,
            Instr::FalseConst => 1,
            Instr::U256Const(_) => 2,
            Instr::BytesConst(_) => 3,
            Instr::Pop => 4,
            Instr::Dup => 5,
            Instr::Swap => 6,
            Instr::U256Add => 7,
            Instr::U256Sub => 8,
            Instr::U256Eq => 9,
            Instr::BytesEq => 10,
            Instr::Blake2b => 11,
            Instr::BoolAnd => 12,
            Instr::BoolOr => 13,
            Instr::BoolNot => 14,
            Instr::Assert => 15,
            Instr::VerifySignature => 16,
            Instr::CallMethod(_) => 17,
            Instr::Return => 18,
            Instr::IssueToken => 19,
            Instr::GenerateOutput => 20,
            Instr::GenerateTokenOutput => 21,
        }
    }

    /// Whether this instruction needs the stateful context.
    pub fn is_stateful(&self) -> bool {
        matches!(
            self,
            Instr::IssueToken | Instr::GenerateOutput | Instr::GenerateTokenOutput
        )
    }
}

impl Encode for Instr {
    fn encode(&self, buf: &mut Vec<u8>) {
        buf.push(self.tag());
        match self {
            Instr::U256Const(v) => v.encode(buf),
            Instr::BytesConst(b) => put_var_bytes(buf, b),
            Instr::CallMethod(m) => buf.push(*m),
            _ => {}
        }
    }
}

impl Decode for Instr {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        match reader.get_u8()? {
            0 => Ok(Instr::TrueConst),
            1 => Ok(Instr::FalseConst),
            2 => Ok(Instr::U256Const(U256::decode(reader)?)),
            3 => Ok(Instr::BytesConst(reader.get_var_bytes()?)),
            4 => Ok(Instr::Pop),
            5 => Ok(Instr::Dup),
            6 => Ok(Instr::Swap),
            7 => Ok(Instr::U256Add),
            8 => Ok(Instr::U256Sub),
            9 => Ok(Instr::U256Eq),
            10 => Ok(Instr::BytesEq),
            11 => Ok(Instr::Blake2b),
            12 => Ok(Instr::BoolAnd),
            13 => Ok(Instr::BoolOr),
            14 => Ok(Instr::BoolNot),
            15 => Ok(Instr::Assert),
            16 => Ok(Instr::VerifySignature),
            17 => Ok(Instr::CallMethod(reader.get_u8()?)),
            18 => Ok(Instr::Return),
            19 => Ok(Instr::IssueToken),
            20 => Ok(Instr::GenerateOutput),
            21 => Ok(Instr::GenerateTokenOutput),
            tag => Err(CodecError::Invalid(format!("Bad instruction tag: {tag}"))),
        }
    }
}

/// A script: a list of method bodies, method 0 being the entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Script {
    /// Method bodies.
    pub methods: Vec<Vec<Instr>>,
}

impl Script {
    /// A single-method script.
    pub fn from_instrs(instrs: Vec<Instr>) -> Self {
        Script {
            methods: vec![instrs],
        }
    }

    /// Blake2b-256 of the canonical script bytes (P2SH identity).
    pub fn hash(&self) -> Hash {
        Hash::hash(&self.encode_to_vec())
    }

    /// Size of the canonical script bytes, the unit P2SH gas is charged in.
    pub fn bytes_size(&self) -> usize {
        self.encode_to_vec().len()
    }

    /// Whether any instruction needs the stateful context.
    pub fn is_stateful(&self) -> bool {
        self.methods
            .iter()
            .any(|m| m.iter().any(Instr::is_stateful))
    }
}

impl Encode for Script {
    fn encode(&self, buf: &mut Vec<u8>) {
        self.methods.encode(buf);
    }
}

impl Decode for Script {
    fn decode(reader: &mut Reader<'_>) -> CodecResult<Self> {
        Ok(Script {
            methods: Vec::<Vec<Instr>>::decode(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_roundtrip() {
        let script = Script {
            methods: vec![
                vec![
                    Instr::BytesConst(vec![1, 2, 3]),
                    Instr::Blake2b,
                    Instr::CallMethod(1),
                    Instr::Return,
                ],
                vec![Instr::TrueConst, Instr::Assert, Instr::Return],
            ],
        };
        let bytes = script.encode_to_vec();
        assert_eq!(Script::decode_exact(&bytes).unwrap(), script);
    }

    #[test]
    fn test_script_hash_tracks_content() {
        let a = Script::from_instrs(vec![Instr::TrueConst, Instr::Assert]);
        let b = Script::from_instrs(vec![Instr::FalseConst, Instr::Assert]);
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.hash());
    }

    #[test]
    fn test_statefulness_detection() {
        let stateless = Script::from_instrs(vec![Instr::TrueConst, Instr::Assert]);
        let stateful = Script::from_instrs(vec![Instr::U256Const(U256::one()), Instr::IssueToken]);
        assert!(!stateless.is_stateful());
        assert!(stateful.is_stateful());
    }
}
