//! Capability interfaces consumed from the wallet environment.
//!
//! # Surfaces
//! - [`ProviderSource`]: detects an injected wallet and opens a provider handle
//! - [`WalletProvider`]: EIP-1193 style requests, events and the read surface
//! - [`WalletSigner`]: the account currently selected in the wallet
//! - [`Erc20Contract`]: per-token reads and `Transfer` subscriptions

use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::wallet::error::ProviderError;
use crate::wallet::types::ChainId;

/// Result of a raw provider call.
pub type ProviderResult<T> = Result<T, ProviderError>;

pub const METHOD_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
pub const METHOD_ADD_CHAIN: &str = "wallet_addEthereumChain";

/// Wallet events the manager listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderEventKind {
    AccountsChanged,
    ChainChanged,
}

/// Payload of a wallet event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(ChainId),
}

impl ProviderEvent {
    pub fn kind(&self) -> ProviderEventKind {
        match self {
            ProviderEvent::AccountsChanged(_) => ProviderEventKind::AccountsChanged,
            ProviderEvent::ChainChanged(_) => ProviderEventKind::ChainChanged,
        }
    }
}

/// Decoded ERC-20 `Transfer(from, to, amount)` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

pub type EventHandler = Arc<dyn Fn(ProviderEvent) + Send + Sync>;
pub type TransferHandler = Arc<dyn Fn(TransferEvent) + Send + Sync>;

/// Handle returned by a subscription, used to unsubscribe exactly that listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// The account selected in the wallet.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    async fn address(&self) -> ProviderResult<Address>;
}

/// A session handle over the injected wallet.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Raw EIP-1193 request (`wallet_switchEthereumChain`, `wallet_addEthereumChain`, ...).
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value>;

    /// Ask the wallet for the active account. May prompt the user.
    async fn get_signer(&self) -> ProviderResult<Arc<dyn WalletSigner>>;

    /// Chain currently selected in the wallet.
    async fn get_chain_id(&self) -> ProviderResult<ChainId>;

    /// Native currency balance of `address`.
    async fn get_balance(&self, address: Address) -> ProviderResult<U256>;

    async fn get_block_number(&self) -> ProviderResult<u64>;

    /// Build a contract handle bound to this provider.
    fn contract(&self, address: Address) -> Arc<dyn Erc20Contract>;

    /// Whether [`WalletProvider::on`] delivers events. Without them callers poll.
    fn supports_events(&self) -> bool;

    /// Subscribe to a wallet event. Returns `None` when events are unsupported.
    fn on(&self, kind: ProviderEventKind, handler: EventHandler) -> Option<ListenerId>;

    fn off(&self, id: ListenerId);

    /// Drop every event and transfer listener registered through this handle.
    fn remove_all_listeners(&self);

    /// Release the handle. Reads after this may fail.
    fn destroy(&self);
}

/// Read surface of one ERC-20 contract.
#[async_trait]
pub trait Erc20Contract: Send + Sync {
    fn address(&self) -> Address;

    async fn name(&self) -> ProviderResult<String>;

    async fn symbol(&self) -> ProviderResult<String>;

    async fn decimals(&self) -> ProviderResult<u8>;

    async fn balance_of(&self, owner: Address) -> ProviderResult<U256>;

    fn on_transfer(&self, handler: TransferHandler) -> ListenerId;

    fn off_transfer(&self, id: ListenerId);
}

/// Detects the wallet injected into the environment.
pub trait ProviderSource: Send + Sync {
    /// Whether a wallet is present right now.
    fn is_available(&self) -> bool;

    /// Open a fresh provider handle, `None` when no wallet is present.
    fn open(&self) -> Option<Arc<dyn WalletProvider>>;
}

/// Id-keyed listener table shared by provider implementations.
pub struct Listeners<K, H> {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, (K, H)>>,
}

impl<K, H> Listeners<K, H>
where
    K: PartialEq + Copy,
    H: Clone,
{
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, key: K, handler: H) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, (key, handler));
        ListenerId(id)
    }

    /// Returns true if the listener existed.
    pub fn remove(&self, id: ListenerId) -> bool {
        self.lock().remove(&id.0).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Handlers registered for `key`, cloned so they run outside the lock.
    pub fn handlers(&self, key: K) -> Vec<H> {
        self.lock()
            .values()
            .filter(|(k, _)| *k == key)
            .map(|(_, h)| h.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, (K, H)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, H> Default for Listeners<K, H>
where
    K: PartialEq + Copy,
    H: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_table() {
        let listeners: Listeners<ProviderEventKind, u32> = Listeners::new();
        let a = listeners.add(ProviderEventKind::AccountsChanged, 1);
        let _b = listeners.add(ProviderEventKind::ChainChanged, 2);
        assert_eq!(listeners.handlers(ProviderEventKind::AccountsChanged), vec![1]);

        assert!(listeners.remove(a));
        assert!(!listeners.remove(a));
        assert!(listeners.handlers(ProviderEventKind::AccountsChanged).is_empty());
        assert_eq!(listeners.len(), 1);

        listeners.clear();
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(
            ProviderEvent::ChainChanged(ChainId(1)).kind(),
            ProviderEventKind::ChainChanged
        );
    }
}
