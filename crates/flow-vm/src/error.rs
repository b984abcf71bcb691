//! VM failure modes.

use thiserror::Error;

/// Errors halting script execution.
///
/// Deterministic: for fixed script, fields, args, and world state the same
/// error (or success) and the same gas consumption occur on every node.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The gas box ran dry.
    #[error("Out of gas")]
    OutOfGas,

    /// Frame or operand stack exceeded its bound.
    #[error("Stack overflow")]
    StackOverflow,

    /// An operand pop found an empty stack.
    #[error("Stack underflow")]
    StackUnderflow,

    /// An `Assert` saw a non-true operand.
    #[error("Assertion failed")]
    AssertionFailed,

    /// An operand had the wrong type, a value failed to decode, or a
    /// stateful instruction ran in a stateless context.
    #[error("Type mismatch")]
    TypeMismatch,

    /// A call targeted a method the script does not have.
    #[error("Invalid method index")]
    InvalidMethodIndex,

    /// A `VerifySignature` did not verify.
    #[error("Invalid signature")]
    InvalidSignature,
}
