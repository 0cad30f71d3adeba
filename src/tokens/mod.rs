//! Watched tokens and their cached balances and metadata.

pub mod cache;
pub mod contracts;
pub mod fetch_state;
pub mod types;

pub use cache::{FetchMap, TokenCache};
pub use fetch_state::FetchState;
pub use types::{format_units, TokenDescriptor, TokenMetadata, NATIVE_SLUG};
