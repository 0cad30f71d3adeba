//! Wallet connection subsystem.
//!
//! # Data Flow
//! ```text
//! ProviderSource::open → ConnectionManager::connect
//!     → signer + chain id read
//!     → chain unsupported? switch_chain → (4902) add_network → switch again
//!     → Connection published to its Store
//! ```
//!
//! Prompting entry points (`connect`, `switch_chain`, `add_network`) share one
//! [`guard::ConcurrencyGuard`], so overlapping callers never open a second
//! wallet prompt.

pub mod connection;
pub mod error;
pub mod guard;
pub mod provider;
pub mod registry;
pub mod rpc;
pub mod types;

pub use connection::{Connection, ConnectionId, ConnectionManager, ConnectionStatus};
pub use error::{classify, ProviderError, WalletError, WalletResult};
pub use registry::{Network, NetworkRegistry};
pub use types::ChainId;
