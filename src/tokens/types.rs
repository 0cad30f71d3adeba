//! Token identity and metadata.

use alloy::hex;
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// Cache key of the native pseudo-token.
pub const NATIVE_SLUG: &str = "NATIVE";

/// A token whose balance can be watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TokenDescriptor {
    /// The chain's native currency (ETH, MATIC, ...).
    Native,
    /// An ERC-20 contract.
    Contract { address: Address },
}

impl TokenDescriptor {
    /// ERC-20 token at `address`.
    pub fn contract(address: Address) -> Self {
        TokenDescriptor::Contract { address }
    }

    /// Stable cache key: `NATIVE` or the lowercase `0x` contract address.
    pub fn slug(&self) -> String {
        match self {
            TokenDescriptor::Native => NATIVE_SLUG.to_string(),
            TokenDescriptor::Contract { address } => hex::encode_prefixed(address),
        }
    }

    /// Contract address, `None` for the native token.
    pub fn address(&self) -> Option<Address> {
        match self {
            TokenDescriptor::Native => None,
            TokenDescriptor::Contract { address } => Some(*address),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, TokenDescriptor::Native)
    }

    /// Name used when metadata is not available yet.
    pub fn fallback_name(&self) -> String {
        match self {
            TokenDescriptor::Native => "native token".to_string(),
            TokenDescriptor::Contract { .. } => format!("token {}", self.slug()),
        }
    }
}

/// Display metadata of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMetadata {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            decimals,
        }
    }
}

/// Render an amount of atoms as a decimal string, e.g. `1500000` with 6 decimals is `1.5`.
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }

    let base = U256::from(10u8).pow(U256::from(decimals));
    let whole = amount / base;
    let fraction = (amount % base).to_string();
    let padded = format!("{:0>width$}", fraction, width = decimals as usize);
    let trimmed = padded.trim_end_matches('0');

    if trimmed.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, trimmed)
    }
}
