//! The execute loop.

use crate::{
    hash_gas, Context, GasBox, StatefulOutcome, VmError, FRAME_STACK_MAX_SIZE, GAS_PER_INSTR,
    GAS_SIGNATURE, OPERAND_STACK_MAX_SIZE,
};
use flow_state::CachedWorldState;
use flow_types::vm::{Instr, Script};
use flow_types::{
    AssetOutput, Decode, Hash, LockupScript, PublicKey, Signature, TxOutput, U256,
};
use tracing::trace;

/// A runtime value on the operand stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Val {
    /// Boolean.
    Bool(bool),
    /// 256-bit integer.
    U256(U256),
    /// Byte string.
    Bytes(Vec<u8>),
}

/// One entry of the frame stack: a method and its program counter.
#[derive(Debug, Clone, Copy)]
struct Frame {
    method: usize,
    pc: usize,
}

/// Interpreter state for one script execution.
///
/// Holds the bounded frame stack, the operand stack, and the gas box.
/// The loop inspects the top frame: complete frames pop, otherwise the
/// frame advances by one instruction. Every step charges gas.
pub struct Runtime<'a, 'w> {
    ctx: &'a mut Context<'w>,
    gas: &'a mut GasBox,
    frames: Vec<Frame>,
    operands: Vec<Val>,
}

impl<'a, 'w> Runtime<'a, 'w> {
    /// Create a runtime over a context and gas box.
    pub fn new(ctx: &'a mut Context<'w>, gas: &'a mut GasBox) -> Self {
        Runtime {
            ctx,
            gas,
            frames: Vec::new(),
            operands: Vec::new(),
        }
    }

    /// Run `script` from its entry method with `args` preloaded on the
    /// operand stack (first arg deepest).
    pub fn execute(&mut self, script: &Script, args: Vec<Val>) -> Result<(), VmError> {
        for arg in args {
            self.push(arg)?;
        }
        self.push_frame(0, script)?;

        while let Some(frame) = self.frames.last().copied() {
            let method = script
                .methods
                .get(frame.method)
                .ok_or(VmError::InvalidMethodIndex)?;
            if frame.pc >= method.len() {
                self.frames.pop();
                continue;
            }
            let instr = &method[frame.pc];
            self.frames
                .last_mut()
                .expect("frame checked above")
                .pc += 1;
            self.step(instr, script)?;
        }
        Ok(())
    }

    fn push_frame(&mut self, method: usize, script: &Script) -> Result<(), VmError> {
        if self.frames.len() >= FRAME_STACK_MAX_SIZE {
            return Err(VmError::StackOverflow);
        }
        if method >= script.methods.len() {
            return Err(VmError::InvalidMethodIndex);
        }
        self.frames.push(Frame { method, pc: 0 });
        Ok(())
    }

    fn push(&mut self, val: Val) -> Result<(), VmError> {
        if self.operands.len() >= OPERAND_STACK_MAX_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.operands.push(val);
        Ok(())
    }

    fn pop(&mut self) -> Result<Val, VmError> {
        self.operands.pop().ok_or(VmError::StackUnderflow)
    }

    fn pop_bool(&mut self) -> Result<bool, VmError> {
        match self.pop()? {
            Val::Bool(b) => Ok(b),
            _ => Err(VmError::TypeMismatch),
        }
    }

    fn pop_u256(&mut self) -> Result<U256, VmError> {
        match self.pop()? {
            Val::U256(v) => Ok(v),
            _ => Err(VmError::TypeMismatch),
        }
    }

    fn pop_bytes(&mut self) -> Result<Vec<u8>, VmError> {
        match self.pop()? {
            Val::Bytes(b) => Ok(b),
            _ => Err(VmError::TypeMismatch),
        }
    }

    fn step(&mut self, instr: &Instr, script: &Script) -> Result<(), VmError> {
        self.gas.use_gas(GAS_PER_INSTR)?;
        if instr.is_stateful() && matches!(self.ctx, Context::Stateless { .. }) {
            return Err(VmError::TypeMismatch);
        }
        trace!(?instr, depth = self.frames.len(), "VM step");

        match instr {
            Instr::TrueConst => self.push(Val::Bool(true)),
            Instr::FalseConst => self.push(Val::Bool(false)),
            Instr::U256Const(v) => self.push(Val::U256(v.clone())),
            Instr::BytesConst(b) => self.push(Val::Bytes(b.clone())),
            Instr::Pop => self.pop().map(|_| ()),
            Instr::Dup => {
                let top = self.operands.last().cloned().ok_or(VmError::StackUnderflow)?;
                self.push(top)
            }
            Instr::Swap => {
                let a = self.pop()?;
                let b = self.pop()?;
                self.push(a)?;
                self.push(b)
            }
            Instr::U256Add => {
                let b = self.pop_u256()?;
                let a = self.pop_u256()?;
                let sum = a.checked_add(&b).ok_or(VmError::AssertionFailed)?;
                self.push(Val::U256(sum))
            }
            Instr::U256Sub => {
                let b = self.pop_u256()?;
                let a = self.pop_u256()?;
                let diff = a.checked_sub(&b).ok_or(VmError::AssertionFailed)?;
                self.push(Val::U256(diff))
            }
            Instr::U256Eq => {
                let b = self.pop_u256()?;
                let a = self.pop_u256()?;
                self.push(Val::Bool(a == b))
            }
            Instr::BytesEq => {
                let b = self.pop_bytes()?;
                let a = self.pop_bytes()?;
                self.push(Val::Bool(a == b))
            }
            Instr::Blake2b => {
                let bytes = self.pop_bytes()?;
                self.gas.use_gas(hash_gas(bytes.len()))?;
                self.push(Val::Bytes(Hash::hash(&bytes).as_bytes().to_vec()))
            }
            Instr::BoolAnd => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.push(Val::Bool(a && b))
            }
            Instr::BoolOr => {
                let b = self.pop_bool()?;
                let a = self.pop_bool()?;
                self.push(Val::Bool(a || b))
            }
            Instr::BoolNot => {
                let a = self.pop_bool()?;
                self.push(Val::Bool(!a))
            }
            Instr::Assert => {
                if self.pop_bool()? {
                    Ok(())
                } else {
                    Err(VmError::AssertionFailed)
                }
            }
            Instr::VerifySignature => {
                self.gas.use_gas(GAS_SIGNATURE)?;
                let sig_bytes = self.pop_bytes()?;
                let key_bytes = self.pop_bytes()?;
                let key: [u8; 32] = key_bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| VmError::TypeMismatch)?;
                let sig: [u8; 64] = sig_bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| VmError::TypeMismatch)?;
                let key = PublicKey::from_bytes(key);
                let sig = Signature::from_bytes(sig);
                if key.verify(self.ctx.tx_id().as_bytes(), &sig) {
                    Ok(())
                } else {
                    Err(VmError::InvalidSignature)
                }
            }
            Instr::CallMethod(m) => self.push_frame(*m as usize, script),
            Instr::Return => {
                self.frames.pop();
                Ok(())
            }
            Instr::IssueToken => {
                let amount = self.pop_u256()?;
                let token_id = self.ctx.issue_token(amount).ok_or(VmError::TypeMismatch)?;
                self.push(Val::Bytes(token_id.as_bytes().to_vec()))
            }
            Instr::GenerateOutput => {
                let amount = self.pop_u256()?;
                let lockup_bytes = self.pop_bytes()?;
                let lockup = LockupScript::decode_exact(&lockup_bytes)
                    .map_err(|_| VmError::TypeMismatch)?;
                let output = TxOutput::Asset(AssetOutput::new(amount, lockup));
                self.ctx.generate_output(output);
                Ok(())
            }
            Instr::GenerateTokenOutput => {
                let token_amount = self.pop_u256()?;
                let token_id_bytes = self.pop_bytes()?;
                let amount = self.pop_u256()?;
                let lockup_bytes = self.pop_bytes()?;
                let token_id =
                    Hash::from_slice(&token_id_bytes).ok_or(VmError::TypeMismatch)?;
                let lockup = LockupScript::decode_exact(&lockup_bytes)
                    .map_err(|_| VmError::TypeMismatch)?;
                let mut output = AssetOutput::new(amount, lockup);
                output.tokens.push((token_id, token_amount));
                self.ctx.generate_output(TxOutput::Asset(output));
                Ok(())
            }
        }
    }
}

/// Run an unlock script in a stateless context.
///
/// Success is completing without error; assertions inside the script
/// encode the spending condition.
pub fn execute_stateless(
    script: &Script,
    args: Vec<Val>,
    tx_id: Hash,
    gas: &mut GasBox,
) -> Result<(), VmError> {
    let mut ctx = Context::stateless(tx_id);
    Runtime::new(&mut ctx, gas).execute(script, args)
}

/// Run a tx script in a stateful context over a scratch world view,
/// returning the accumulated effects.
pub fn execute_stateful(
    script: &Script,
    args: Vec<Val>,
    tx_id: Hash,
    world: &mut CachedWorldState,
    gas: &mut GasBox,
) -> Result<StatefulOutcome, VmError> {
    let mut ctx = Context::stateful(tx_id, world);
    Runtime::new(&mut ctx, gas).execute(script, args)?;
    Ok(ctx.into_outcome().expect("context is stateful"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flow_state::WorldState;
    use flow_types::Encode;
    use std::sync::Arc;

    fn run_stateless(instrs: Vec<Instr>, args: Vec<Val>, gas_amount: u64) -> Result<u64, VmError> {
        let mut gas = GasBox::new(gas_amount);
        execute_stateless(
            &Script::from_instrs(instrs),
            args,
            Hash::hash(b"tx"),
            &mut gas,
        )?;
        Ok(gas.used())
    }

    // ============ Execute Loop Tests ============

    #[test]
    fn test_empty_script_succeeds() {
        assert!(run_stateless(vec![], vec![], 100).is_ok());
    }

    #[test]
    fn test_assert_true_passes_assert_false_fails() {
        assert!(run_stateless(vec![Instr::TrueConst, Instr::Assert], vec![], 100).is_ok());
        assert_eq!(
            run_stateless(vec![Instr::FalseConst, Instr::Assert], vec![], 100),
            Err(VmError::AssertionFailed)
        );
    }

    #[test]
    fn test_gas_is_charged_per_instruction() {
        let used = run_stateless(vec![Instr::TrueConst, Instr::Assert], vec![], 100).unwrap();
        assert_eq!(used, 2 * GAS_PER_INSTR);
    }

    #[test]
    fn test_out_of_gas() {
        assert_eq!(
            run_stateless(vec![Instr::TrueConst, Instr::Assert], vec![], 3),
            Err(VmError::OutOfGas)
        );
    }

    #[test]
    fn test_determinism() {
        let instrs = vec![
            Instr::BytesConst(vec![1, 2, 3]),
            Instr::Blake2b,
            Instr::BytesConst(Hash::hash(&[1, 2, 3]).as_bytes().to_vec()),
            Instr::BytesEq,
            Instr::Assert,
        ];
        let a = run_stateless(instrs.clone(), vec![], 10_000).unwrap();
        let b = run_stateless(instrs, vec![], 10_000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_stack_underflow() {
        assert_eq!(
            run_stateless(vec![Instr::Pop], vec![], 100),
            Err(VmError::StackUnderflow)
        );
    }

    #[test]
    fn test_type_mismatch() {
        assert_eq!(
            run_stateless(vec![Instr::TrueConst, Instr::Blake2b], vec![], 1000),
            Err(VmError::TypeMismatch)
        );
    }

    #[test]
    fn test_method_calls_and_frame_bound() {
        // Method 0 calls method 1 which asserts true.
        let script = Script {
            methods: vec![
                vec![Instr::CallMethod(1)],
                vec![Instr::TrueConst, Instr::Assert, Instr::Return],
            ],
        };
        let mut gas = GasBox::new(1000);
        assert!(execute_stateless(&script, vec![], Hash::hash(b"tx"), &mut gas).is_ok());

        // Unbounded recursion hits the frame bound, not the gas first.
        let recursive = Script {
            methods: vec![vec![Instr::CallMethod(0)]],
        };
        let mut gas = GasBox::new(u64::MAX);
        assert_eq!(
            execute_stateless(&recursive, vec![], Hash::hash(b"tx"), &mut gas),
            Err(VmError::StackOverflow)
        );
    }

    #[test]
    fn test_bad_method_index() {
        assert_eq!(
            run_stateless(vec![Instr::CallMethod(7)], vec![], 100),
            Err(VmError::InvalidMethodIndex)
        );
    }

    // ============ Dialect Tests ============

    #[test]
    fn test_stateful_instr_rejected_in_stateless_context() {
        assert_eq!(
            run_stateless(
                vec![Instr::U256Const(U256::one()), Instr::IssueToken],
                vec![],
                1000
            ),
            Err(VmError::TypeMismatch)
        );
    }

    #[test]
    fn test_issue_token_and_generate_output() {
        let base = Arc::new(WorldState::genesis());
        let mut world = base.cached();
        let lockup = LockupScript::P2pkh {
            pub_key_hash: Hash::hash(b"payee"),
        };
        let script = Script::from_instrs(vec![
            // Mint 500 units of a fresh token.
            Instr::U256Const(U256::from_u64(500)),
            Instr::IssueToken,
            // Wrap it in an output holding 1 ALF sub-unit.
            Instr::U256Const(U256::one()),
            Instr::Swap,
            Instr::U256Const(U256::from_u64(500)),
            Instr::GenerateTokenOutput,
        ]);
        // Operand order for GenerateTokenOutput: lockup, amount, token id,
        // token amount (top). Preload the lockup as an arg.
        let args = vec![Val::Bytes(lockup.encode_to_vec())];

        let mut gas = GasBox::new(10_000);
        let outcome =
            execute_stateful(&script, args, Hash::hash(b"tx"), &mut world, &mut gas).unwrap();
        assert_eq!(outcome.issued_tokens.len(), 1);
        assert_eq!(outcome.generated_outputs.len(), 1);
        let (token_id, amount) = &outcome.issued_tokens[0];
        assert_eq!(amount, &U256::from_u64(500));
        assert_eq!(outcome.generated_outputs[0].tokens()[0].0, *token_id);
    }
}
