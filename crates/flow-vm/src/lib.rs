//! # flow-vm
//!
//! Gas-metered frame-stack interpreter for unlock scripts and tx scripts.
//!
//! Two dialects share one execute loop:
//! - **stateless**: read-only, used for P2SH unlock scripts
//! - **stateful**: read/write world access, used for tx scripts
//!
//! Execution is synchronous, deterministic, and bounded by gas; it never
//! suspends. Failures halt with a specific [`VmError`] and leave no side
//! effects visible outside the scratch world state view.

mod context;
mod error;
mod gas;
mod runtime;

pub use context::{Context, StatefulOutcome};
pub use error::VmError;
pub use gas::GasBox;
pub use runtime::{execute_stateful, execute_stateless, Runtime, Val};

/// Maximum frame stack depth.
pub const FRAME_STACK_MAX_SIZE: usize = 1024;

/// Maximum operand stack depth.
pub const OPERAND_STACK_MAX_SIZE: usize = 1024;

/// Gas charged for every executed instruction.
pub const GAS_PER_INSTR: u64 = 2;

/// Base gas for a hash instruction.
pub const GAS_HASH_BASE: u64 = 30;

/// Gas per 64-byte word hashed.
pub const GAS_HASH_PER_WORD: u64 = 120;

/// Gas for one signature verification.
pub const GAS_SIGNATURE: u64 = 2000;

/// Gas for hashing `len` bytes.
pub fn hash_gas(len: usize) -> u64 {
    GAS_HASH_BASE + GAS_HASH_PER_WORD * (len as u64).div_ceil(64)
}
