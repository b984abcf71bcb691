//! Coinbase assembly.

use flow_types::{AssetOutput, LockupScript, NetworkId, Transaction, U256};

/// Flat block reward in ALF sub-units.
pub const MINING_REWARD: u128 = 3 * flow_types::ONE_ALF;

/// Build the coinbase for a block: zero inputs, a single reward output
/// to the miner's lockup, the zero signature.
pub fn build_coinbase(
    network_id: NetworkId,
    lockup: LockupScript,
    reward: U256,
) -> Transaction {
    Transaction::coinbase(network_id, AssetOutput::new(reward, lockup))
}
