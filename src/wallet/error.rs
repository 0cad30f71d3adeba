//! Wallet error taxonomy and classification of raw provider errors.
//!
//! Every retry decision in the connection manager is driven by the typed
//! [`WalletError`] produced by [`classify`], never by inspecting raw codes.

use thiserror::Error;

use crate::wallet::types::ChainId;

/// The wallet does not know the requested chain (EIP-3085 / EIP-3326).
pub const UNKNOWN_CHAIN_ERROR_CODE: i64 = 4902;
/// The user declined the wallet prompt (EIP-1193).
pub const USER_REJECTED_ERROR_CODE: i64 = 4001;
/// Another wallet prompt is already open.
pub const ALREADY_PENDING_ERROR_CODE: i64 = -32002;

/// Opaque error as reported by a wallet provider or node, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Numeric error code, when the provider attached one.
    pub code: Option<i64>,
    /// Human readable message.
    pub message: String,
}

impl ProviderError {
    /// A provider error carrying a numeric code.
    pub fn coded(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// A provider error without a code (transport failures, timeouts, decoding).
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

/// Classified wallet errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// No wallet provider is present in this environment.
    #[error("No Ethereum provider found")]
    EthereumNotFound,

    /// The wallet has no such network registered.
    #[error("Unknown chain")]
    UnknownChain,

    /// The user declined the prompt.
    #[error("The action was rejected by the user")]
    UserRejected,

    /// Another prompt is already open in the wallet.
    #[error("Already pending")]
    PendingRequest,

    /// Any other coded provider failure.
    #[error("Provider error: {message} (code {code})")]
    Provider { code: i64, message: String },

    /// Uncoded failure, surfaced with its message only.
    #[error("{0}")]
    Other(String),

    /// The network is absent from the registry and cannot be added to the wallet.
    #[error("Network with id {0} is not supported")]
    UnsupportedNetwork(ChainId),

    /// A fetch was attempted without an active connection.
    #[error("No connection")]
    NoConnection,

    /// Chain recovery exceeded its attempt budget.
    #[error("Gave up switching to chain {0}: the wallet kept reporting it as unknown")]
    ChainSwitchLoop(ChainId),
}

impl WalletError {
    /// The provider code behind this error, if any.
    pub fn code(&self) -> Option<i64> {
        match self {
            WalletError::UnknownChain => Some(UNKNOWN_CHAIN_ERROR_CODE),
            WalletError::UserRejected => Some(USER_REJECTED_ERROR_CODE),
            WalletError::PendingRequest => Some(ALREADY_PENDING_ERROR_CODE),
            WalletError::Provider { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Text to show to the user for this error.
    pub fn user_message(&self) -> String {
        match self {
            WalletError::Provider { .. } => self.to_string(),
            other => match other.code() {
                Some(code) => format!("Provider error: {} (code {})", other, code),
                None => other.to_string(),
            },
        }
    }
}

impl From<ProviderError> for WalletError {
    fn from(err: ProviderError) -> Self {
        classify(err)
    }
}

/// Result type for wallet operations.
pub type WalletResult<T> = Result<T, WalletError>;

/// Map a raw provider error onto the closed taxonomy.
pub fn classify(err: ProviderError) -> WalletError {
    match err.code {
        Some(UNKNOWN_CHAIN_ERROR_CODE) => WalletError::UnknownChain,
        Some(USER_REJECTED_ERROR_CODE) => WalletError::UserRejected,
        Some(ALREADY_PENDING_ERROR_CODE) => WalletError::PendingRequest,
        Some(code) => WalletError::Provider {
            code,
            message: err.message,
        },
        None => WalletError::Other(err.message),
    }
}
