//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → SyncConfig (validated, immutable)
//!     → sections handed to the connection manager, watcher and RPC wallet
//! ```

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_config_with, ConfigError};
pub use schema::{
    ConnectionConfig, NetworkConfig, ObservabilityConfig, PollingConfig, RpcConfig, SyncConfig,
};
