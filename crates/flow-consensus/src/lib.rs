//! # flow-consensus
//!
//! Consensus rules for the blockflow node.
//!
//! This crate provides:
//! - The consensus parameter set and gas schedule
//! - Per-chain difficulty retargeting
//! - The transaction validation pipeline (stateless and stateful)
//! - Header and block validation
//! - The `Invalid*` status taxonomies and the two-level validation result
//!
//! Validators consume the DAG exclusively through the read traits in
//! [`view`]; the chain crate implements them.

mod block_validation;
mod error;
mod header_validation;
mod retarget;
mod tx_validation;
mod view;

pub use block_validation::{apply_tx_to_world, BlockValidator};
pub use error::{
    InvalidBlockStatus, InvalidHeaderStatus, InvalidTxStatus, ValidationError,
};
pub use header_validation::HeaderValidator;
pub use retarget::{next_target, RetargetHeader};
pub use tx_validation::{BlockEnv, TxValidator};
pub use view::{FlowBlockView, FlowHeaderView};

use flow_types::{NetworkId, U256};

/// Consensus parameter defaults.
pub mod params {
    /// Base gas charged for any transaction.
    pub const TX_BASE_GAS: u64 = 1000;

    /// Gas charged per input.
    pub const TX_INPUT_BASE_GAS: u64 = 2000;

    /// Gas charged per output, fixed and generated alike.
    pub const TX_OUTPUT_BASE_GAS: u64 = 4500;

    /// Gas charged for verifying one P2PKH unlock.
    pub const P2PK_UNLOCK_GAS: u64 = 2060;

    /// Flat call overhead charged for a P2SH unlock execution.
    pub const P2SH_CALL_GAS: u64 = 200;

    /// Gas charged per byte of P2SH script.
    pub const GAS_PER_SCRIPT_BYTE: u64 = 1;

    /// Minimum gas budget a transaction must carry.
    pub const MINIMAL_GAS: u64 = 20_000;

    /// Maximum gas budget a transaction may carry.
    pub const MAX_GAS_PER_TX: u64 = 625_000;

    /// Maximum number of inputs per transaction.
    pub const MAX_TX_INPUT_NUM: usize = 256;

    /// Maximum number of outputs per transaction (fixed plus generated).
    pub const MAX_TX_OUTPUT_NUM: usize = 256;

    /// Maximum number of token sub-balances per output.
    pub const MAX_TOKEN_PER_UTXO: usize = 4;

    /// Maximum size of an output's additional data, in bytes.
    pub const MAX_OUTPUT_DATA_SIZE: usize = 256;

    /// Target block spacing per chain, in milliseconds.
    pub const BLOCK_TARGET_SPACING_MS: u64 = 64_000;

    /// Number of recent headers feeding the retarget.
    pub const RETARGET_WINDOW: usize = 17;

    /// Retarget clamp: the span ratio stays within [1/N, N].
    pub const RETARGET_CLAMP: u64 = 8;

    /// Allowed timestamp skew, one hour in milliseconds.
    pub const TIMESTAMP_SKEW_MS: u64 = 60 * 60 * 1000;
}

/// The full consensus parameter set a node runs with.
#[derive(Debug, Clone)]
pub struct ConsensusParams {
    /// Shard count G.
    pub groups: u32,
    /// Network this node validates for.
    pub network_id: NetworkId,
    /// Easiest permitted mining target.
    pub max_mining_target: U256,
    /// Base gas charged for any transaction.
    pub tx_base_gas: u64,
    /// Gas charged per input.
    pub tx_input_base_gas: u64,
    /// Gas charged per output.
    pub tx_output_base_gas: u64,
    /// Gas for one P2PKH unlock.
    pub p2pk_unlock_gas: u64,
    /// Flat P2SH call overhead.
    pub p2sh_call_gas: u64,
    /// Gas per P2SH script byte.
    pub gas_per_script_byte: u64,
    /// Minimum tx gas budget.
    pub minimal_gas: u64,
    /// Maximum tx gas budget.
    pub max_gas_per_tx: u64,
    /// Maximum inputs per tx.
    pub max_tx_input_num: usize,
    /// Maximum outputs per tx.
    pub max_tx_output_num: usize,
    /// Maximum tokens per output.
    pub max_token_per_utxo: usize,
    /// Maximum output data size.
    pub max_output_data_size: usize,
    /// Maximum representable ALF amount (1 billion ALF).
    pub max_alf_value: U256,
    /// Target block spacing in milliseconds.
    pub block_target_spacing_ms: u64,
    /// Retarget window length.
    pub retarget_window: usize,
    /// Retarget clamp factor.
    pub retarget_clamp: u64,
    /// Allowed timestamp skew in milliseconds.
    pub timestamp_skew_ms: u64,
}

impl ConsensusParams {
    /// Defaults for a `groups`-shard network.
    pub fn new(groups: u32, network_id: NetworkId) -> Self {
        ConsensusParams {
            groups,
            network_id,
            max_mining_target: U256::max_value(),
            tx_base_gas: params::TX_BASE_GAS,
            tx_input_base_gas: params::TX_INPUT_BASE_GAS,
            tx_output_base_gas: params::TX_OUTPUT_BASE_GAS,
            p2pk_unlock_gas: params::P2PK_UNLOCK_GAS,
            p2sh_call_gas: params::P2SH_CALL_GAS,
            gas_per_script_byte: params::GAS_PER_SCRIPT_BYTE,
            minimal_gas: params::MINIMAL_GAS,
            max_gas_per_tx: params::MAX_GAS_PER_TX,
            max_tx_input_num: params::MAX_TX_INPUT_NUM,
            max_tx_output_num: params::MAX_TX_OUTPUT_NUM,
            max_token_per_utxo: params::MAX_TOKEN_PER_UTXO,
            max_output_data_size: params::MAX_OUTPUT_DATA_SIZE,
            max_alf_value: U256::from_u128(1_000_000_000)
                .checked_mul(&U256::from_u128(flow_types::ONE_ALF))
                .expect("fits in 256 bits"),
            block_target_spacing_ms: params::BLOCK_TARGET_SPACING_MS,
            retarget_window: params::RETARGET_WINDOW,
            retarget_clamp: params::RETARGET_CLAMP,
            timestamp_skew_ms: params::TIMESTAMP_SKEW_MS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_gas_identity() {
        // The canonical 1-input 2-output P2PKH transfer must cost 14060.
        let p = ConsensusParams::new(2, NetworkId::Devnet);
        let expected =
            p.tx_base_gas + p.tx_input_base_gas + 2 * p.tx_output_base_gas + p.p2pk_unlock_gas;
        assert_eq!(expected, 14060);
    }

    #[test]
    fn test_minimal_gas_covers_base_costs() {
        let p = ConsensusParams::new(2, NetworkId::Devnet);
        let base = p.tx_base_gas
            + p.max_tx_input_num as u64 / 64 * p.tx_input_base_gas
            + 2 * p.tx_output_base_gas;
        assert!(p.minimal_gas >= base);
    }
}
