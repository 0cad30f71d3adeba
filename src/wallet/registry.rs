//! Static lookup of supported networks.
//!
//! Only networks present here may be connected to or added to the wallet.

use alloy::primitives::{address, Address};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

use crate::tokens::types::{TokenDescriptor, TokenMetadata};
use crate::wallet::types::ChainId;

/// Chain metadata plus the tokens watched by default on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub chain_id: ChainId,
    pub chain_name: String,
    pub native_currency: TokenMetadata,
    pub block_explorer_urls: Vec<String>,
    pub rpc_urls: Vec<String>,
    pub known_tokens: Vec<Address>,
}

impl Network {
    /// Params object for `wallet_addEthereumChain`.
    pub fn add_chain_params(&self) -> Value {
        json!({
            "chainId": self.chain_id.to_hex(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": self.block_explorer_urls,
        })
    }

    /// Native token followed by the known contract tokens.
    pub fn default_tokens(&self) -> Vec<TokenDescriptor> {
        std::iter::once(TokenDescriptor::Native)
            .chain(self.known_tokens.iter().copied().map(TokenDescriptor::contract))
            .collect()
    }
}

/// Read-only registry keyed by chain id.
#[derive(Debug, Clone, Default)]
pub struct NetworkRegistry {
    networks: BTreeMap<ChainId, Network>,
}

impl NetworkRegistry {
    pub fn new(networks: impl IntoIterator<Item = Network>) -> Self {
        Self {
            networks: networks.into_iter().map(|n| (n.chain_id, n)).collect(),
        }
    }

    /// Ethereum, Polygon and Arbitrum with their stablecoins.
    pub fn builtin() -> Self {
        let eth = TokenMetadata::new("Ether", "ETH", 18);
        let matic = TokenMetadata::new("Matic Token", "MATIC", 18);

        Self::new([
            Network {
                chain_id: ChainId(1),
                chain_name: "Ethereum Mainnet".to_string(),
                native_currency: eth.clone(),
                block_explorer_urls: vec!["https://etherscan.io".to_string()],
                rpc_urls: vec!["https://mainnet.infura.io/v3".to_string()],
                known_tokens: vec![
                    address!("dac17f958d2ee523a2206206994597c13d831ec7"),
                    address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"),
                    address!("d533a949740bb3306d119cc777fa900ba034cd52"),
                ],
            },
            Network {
                chain_id: ChainId(42161),
                chain_name: "Arbitrum Mainnet".to_string(),
                native_currency: eth,
                block_explorer_urls: vec!["https://arbiscan.io/".to_string()],
                rpc_urls: vec!["https://1rpc.io/arb".to_string()],
                known_tokens: vec![
                    address!("fd086bc7cd5c481dcc9c85ebe478a1c0b69fcbb9"),
                    address!("af88d065e77c8cc2239327c5edb3a432268e5831"),
                    address!("11cdb42b0eb46d95f990bedd4695a6e3fa034978"),
                ],
            },
            Network {
                chain_id: ChainId(137),
                chain_name: "Polygon Mainnet".to_string(),
                native_currency: matic,
                block_explorer_urls: vec!["https://polygonscan.com".to_string()],
                rpc_urls: vec!["https://1rpc.io/matic".to_string()],
                known_tokens: vec![
                    address!("c2132d05d31c914a87c6611c10748aeb04b58e8f"),
                    address!("2791bca1f2de4661ed88a30c99a7a9449aa84174"),
                    address!("172370d5cd63279efa6d502dab29171933a610af"),
                ],
            },
        ])
    }

    /// Registry with `overrides` replacing or extending these networks.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = Network>) -> Self {
        for network in overrides {
            self.networks.insert(network.chain_id, network);
        }
        self
    }

    pub fn get(&self, chain_id: ChainId) -> Option<&Network> {
        self.networks.get(&chain_id)
    }

    pub fn contains(&self, chain_id: ChainId) -> bool {
        self.networks.contains_key(&chain_id)
    }

    pub fn native_currency(&self, chain_id: ChainId) -> Option<&TokenMetadata> {
        self.get(chain_id).map(|n| &n.native_currency)
    }

    /// Watched-token set for a network, empty when unsupported.
    pub fn default_tokens(&self, chain_id: ChainId) -> Vec<TokenDescriptor> {
        self.get(chain_id)
            .map(Network::default_tokens)
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Network> {
        self.networks.values()
    }

    pub fn len(&self) -> usize {
        self.networks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}
