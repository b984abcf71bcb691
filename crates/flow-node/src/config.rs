//! Node configuration.

use anyhow::{Context, Result};
use flow_consensus::{params, ConsensusParams};
use flow_types::{BrokerInfo, NetworkId, U256};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Shard count G.
    #[serde(default = "default_groups")]
    pub groups: u32,
    /// Which (from, to) pairs this node serves.
    #[serde(default = "default_broker_info")]
    pub broker_info: BrokerInfo,
    /// Network to validate for.
    #[serde(default)]
    pub network_id: NetworkId,
    /// Easiest permitted mining target, hex encoded.
    #[serde(default = "default_max_mining_target")]
    pub max_mining_target: String,
    /// Ping frequency in seconds.
    #[serde(default = "default_ping_frequency_secs")]
    pub ping_frequency_secs: u64,
    /// Pending buffer cap.
    #[serde(default = "default_status_size_limit")]
    pub status_size_limit: usize,
    /// Gas schedule.
    #[serde(default)]
    pub gas: GasSchedule,
    /// Transaction and output caps.
    #[serde(default)]
    pub caps: TxCaps,
    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,
    /// Mining configuration.
    #[serde(default)]
    pub mining: MiningConfig,
}

fn default_groups() -> u32 {
    2
}

fn default_broker_info() -> BrokerInfo {
    BrokerInfo::solo()
}

fn default_max_mining_target() -> String {
    "ff".repeat(32)
}

fn default_ping_frequency_secs() -> u64 {
    30
}

fn default_status_size_limit() -> usize {
    512
}

/// Gas schedule options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasSchedule {
    /// Base gas charged for any transaction.
    pub tx_base_gas: u64,
    /// Gas charged per input.
    pub tx_input_base_gas: u64,
    /// Gas charged per output.
    pub tx_output_base_gas: u64,
    /// Gas for one P2PKH unlock.
    pub p2pk_unlock_gas: u64,
    /// Minimum tx gas budget.
    pub minimal_gas: u64,
    /// Maximum tx gas budget.
    pub max_gas_per_tx: u64,
}

impl Default for GasSchedule {
    fn default() -> Self {
        GasSchedule {
            tx_base_gas: params::TX_BASE_GAS,
            tx_input_base_gas: params::TX_INPUT_BASE_GAS,
            tx_output_base_gas: params::TX_OUTPUT_BASE_GAS,
            p2pk_unlock_gas: params::P2PK_UNLOCK_GAS,
            minimal_gas: params::MINIMAL_GAS,
            max_gas_per_tx: params::MAX_GAS_PER_TX,
        }
    }
}

/// Transaction and output caps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxCaps {
    /// Maximum inputs per tx.
    pub max_tx_input_num: usize,
    /// Maximum outputs per tx.
    pub max_tx_output_num: usize,
    /// Maximum tokens per output.
    pub max_token_per_utxo: usize,
    /// Maximum output data size in bytes.
    pub max_output_data_size: usize,
}

impl Default for TxCaps {
    fn default() -> Self {
        TxCaps {
            max_tx_input_num: params::MAX_TX_INPUT_NUM,
            max_tx_output_num: params::MAX_TX_OUTPUT_NUM,
            max_token_per_utxo: params::MAX_TOKEN_PER_UTXO,
            max_output_data_size: params::MAX_OUTPUT_DATA_SIZE,
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// P2P bind address.
    pub bind_address: String,
    /// Peers to connect to at startup.
    pub known_peers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            bind_address: "0.0.0.0:9973".to_string(),
            known_peers: Vec::new(),
        }
    }
}

/// Mining configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MiningConfig {
    /// Enable the CPU miner.
    pub enabled: bool,
    /// Reward key hash, hex encoded; a throwaway hash when unset.
    pub reward_key_hash: Option<String>,
}

impl NodeConfig {
    /// Load a TOML config file; missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(toml::from_str("").expect("defaults always deserialize"));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    /// Resolve the consensus parameter set this config describes.
    pub fn consensus_params(&self) -> Result<ConsensusParams> {
        let target_bytes = hex::decode(&self.max_mining_target)
            .context("max_mining_target is not valid hex")?;
        let max_mining_target = U256::from_be_slice(&target_bytes)
            .context("max_mining_target wider than 256 bits")?;

        let mut p = ConsensusParams::new(self.groups, self.network_id);
        p.max_mining_target = max_mining_target;
        p.tx_base_gas = self.gas.tx_base_gas;
        p.tx_input_base_gas = self.gas.tx_input_base_gas;
        p.tx_output_base_gas = self.gas.tx_output_base_gas;
        p.p2pk_unlock_gas = self.gas.p2pk_unlock_gas;
        p.minimal_gas = self.gas.minimal_gas;
        p.max_gas_per_tx = self.gas.max_gas_per_tx;
        p.max_tx_input_num = self.caps.max_tx_input_num;
        p.max_tx_output_num = self.caps.max_tx_output_num;
        p.max_token_per_utxo = self.caps.max_token_per_utxo;
        p.max_output_data_size = self.caps.max_output_data_size;
        Ok(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_deserialize_from_empty() {
        let config: NodeConfig = toml::from_str("").unwrap();
        assert_eq!(config.groups, 2);
        assert_eq!(config.broker_info, BrokerInfo::solo());
        assert_eq!(config.network_id, NetworkId::Testnet);
        assert_eq!(config.status_size_limit, 512);
        assert!(!config.mining.enabled);
    }

    #[test]
    fn test_consensus_params_resolution() {
        let config: NodeConfig = toml::from_str("").unwrap();
        let p = config.consensus_params().unwrap();
        assert_eq!(p.groups, 2);
        assert_eq!(p.max_mining_target, U256::max_value());
        assert_eq!(p.tx_base_gas, params::TX_BASE_GAS);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: NodeConfig = toml::from_str(
            r#"
            groups = 4
            network_id = "devnet"
            status_size_limit = 64

            [gas]
            tx_base_gas = 1000
            tx_input_base_gas = 2000
            tx_output_base_gas = 4500
            p2pk_unlock_gas = 2060
            minimal_gas = 20000
            max_gas_per_tx = 625000

            [broker_info]
            broker_id = 1
            broker_num = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.groups, 4);
        assert_eq!(config.network_id, NetworkId::Devnet);
        assert_eq!(config.broker_info, BrokerInfo::new(1, 2));
        assert_eq!(config.status_size_limit, 64);
    }

    #[test]
    fn test_bad_target_rejected() {
        let mut config: NodeConfig = toml::from_str("").unwrap();
        config.max_mining_target = "zz".into();
        assert!(config.consensus_params().is_err());
    }
}
