//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! section has defaults so an empty file is a valid configuration.

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::tokens::types::TokenMetadata;
use crate::wallet::registry::{Network, NetworkRegistry};
use crate::wallet::types::ChainId;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Connection and chain recovery settings.
    pub connection: ConnectionConfig,

    /// Block and account polling intervals.
    pub polling: PollingConfig,

    /// JSON-RPC endpoint used by the headless wallet.
    pub rpc: RpcConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,

    /// Extra networks, or replacements for built-in ones.
    pub networks: Vec<NetworkConfig>,
}

impl SyncConfig {
    /// Built-in networks with the configured overrides applied.
    ///
    /// Entries with unparsable token addresses are skipped; validation reports them.
    pub fn registry(&self) -> NetworkRegistry {
        let overrides = self.networks.iter().filter_map(|n| match n.to_network() {
            Ok(network) => Some(network),
            Err(e) => {
                tracing::warn!(chain_id = n.chain_id, error = %e, "Ignoring invalid network entry");
                None
            }
        });
        NetworkRegistry::builtin().with_overrides(overrides.collect::<Vec<_>>())
    }
}

/// Connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Network switched to when the wallet sits on an unsupported chain.
    pub default_network_id: u64,

    /// Pause after registering a chain before retrying, in milliseconds.
    pub chain_settle_delay_ms: u64,

    /// Maximum chain switches during one connect.
    pub max_switch_attempts: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_network_id: 1,
            chain_settle_delay_ms: 100,
            max_switch_attempts: 2,
        }
    }
}

/// Polling intervals.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Block number polling interval in milliseconds.
    pub block_interval_ms: u64,

    /// Account/network polling interval for wallets without events, in milliseconds.
    pub account_interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            block_interval_ms: 1000,
            account_interval_ms: 100,
        }
    }
}

/// JSON-RPC settings for [`crate::wallet::rpc::RpcWallet`].
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL.
    pub url: String,

    /// RPC request timeout in seconds.
    pub timeout_secs: u64,

    /// Transfer log polling interval in milliseconds.
    pub log_poll_interval_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8545".to_string(),
            timeout_secs: 10,
            log_poll_interval_ms: 2000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A network entry as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub native_currency: TokenMetadata,
    #[serde(default)]
    pub block_explorer_urls: Vec<String>,
    pub rpc_urls: Vec<String>,
    #[serde(default)]
    pub known_tokens: Vec<String>,
}

impl NetworkConfig {
    pub fn to_network(&self) -> Result<Network, String> {
        let known_tokens = self
            .known_tokens
            .iter()
            .map(|raw| {
                raw.parse::<Address>()
                    .map_err(|e| format!("invalid token address '{}': {}", raw, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Network {
            chain_id: ChainId(self.chain_id),
            chain_name: self.chain_name.clone(),
            native_currency: self.native_currency.clone(),
            block_explorer_urls: self.block_explorer_urls.clone(),
            rpc_urls: self.rpc_urls.clone(),
            known_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.connection.default_network_id, 1);
        assert_eq!(config.connection.chain_settle_delay_ms, 100);
        assert_eq!(config.polling.block_interval_ms, 1000);
        assert_eq!(config.polling.account_interval_ms, 100);
        assert!(!config.observability.metrics_enabled);
        assert!(config.networks.is_empty());
    }

    #[test]
    fn test_partial_toml() {
        let config: SyncConfig = toml::from_str(
            r#"
            [polling]
            block_interval_ms = 4000

            [[networks]]
            chain_id = 10
            chain_name = "OP Mainnet"
            rpc_urls = ["https://mainnet.optimism.io"]
            known_tokens = ["0x94b008aa00579c1307b0ef2c499ad98a8ce58e58"]
            native_currency = { name = "Ether", symbol = "ETH", decimals = 18 }
            "#,
        )
        .unwrap();

        assert_eq!(config.polling.block_interval_ms, 4000);
        assert_eq!(config.polling.account_interval_ms, 100);

        let registry = config.registry();
        assert_eq!(registry.len(), 4);
        assert_eq!(registry.default_tokens(ChainId(10)).len(), 2);
    }
}
