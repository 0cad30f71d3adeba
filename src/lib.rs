//! Wallet connection and token balance synchronization.
//!
//! Keeps a connection to an EIP-1193 style wallet on a supported network and
//! a cache of balances and metadata for a watched set of tokens, refreshed on
//! transfers, new blocks and wallet events.

pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod session;
pub mod store;
pub mod tokens;
pub mod wallet;
pub mod watcher;

pub use config::SyncConfig;
pub use lifecycle::Shutdown;
pub use session::WalletSession;
pub use store::Store;
