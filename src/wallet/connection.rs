//! Wallet connection lifecycle.
//!
//! # State Transitions
//! ```text
//! Disconnected → Connecting → Connected(Connection)
//! Connected → SwitchingNetwork → Connected (network id refreshed)
//! Connected → Disconnected (listeners removed, provider released)
//! ```
//!
//! # Recovery
//! `connect`, `switch_chain` and `add_network` call each other: a switch to a
//! chain the wallet does not know registers it first, and a connect to an
//! unsupported or unexpected chain switches and then re-validates. All three
//! share one [`ConcurrencyGuard`] so the wallet never sees two prompts at once.
//! Each public call carries a [`Recovery`] budget: the chain is added at most
//! once and the number of switches is capped, so every path terminates.

use alloy::primitives::Address;
use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::observability::metrics;
use crate::store::Store;
use crate::wallet::error::{WalletError, WalletResult};
use crate::wallet::guard::ConcurrencyGuard;
use crate::wallet::provider::{
    ProviderSource, WalletProvider, WalletSigner, METHOD_ADD_CHAIN, METHOD_SWITCH_CHAIN,
};
use crate::wallet::registry::NetworkRegistry;
use crate::wallet::types::ChainId;

/// Identity of one published [`Connection`] value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

/// A fully established wallet connection. Replaced wholesale, never mutated.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    signer: Arc<dyn WalletSigner>,
    provider: Arc<dyn WalletProvider>,
    network_id: ChainId,
    address: Address,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn signer(&self) -> &Arc<dyn WalletSigner> {
        &self.signer
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }

    pub fn network_id(&self) -> ChainId {
        self.network_id
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// `0x1234...abcd` form for display.
    pub fn short_address(&self) -> String {
        let full = self.address.to_string();
        format!("{}...{}", &full[..6], &full[full.len() - 4..])
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id.0)
            .field("network_id", &self.network_id.0)
            .field("address", &self.address)
            .finish()
    }
}

/// Coarse lifecycle state for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    SwitchingNetwork,
    Connected,
}

/// Attempt budget carried through one recovery sequence.
#[derive(Debug, Clone, Copy)]
struct Recovery {
    added_chain: bool,
    switches: u32,
    max_switches: u32,
}

impl Recovery {
    fn new(max_switches: u32) -> Self {
        Self {
            added_chain: false,
            switches: 0,
            max_switches,
        }
    }

    fn record_switch(&mut self, target: ChainId) -> WalletResult<()> {
        if self.switches >= self.max_switches {
            return Err(WalletError::ChainSwitchLoop(target));
        }
        self.switches += 1;
        Ok(())
    }
}

struct ManagerInner {
    source: Arc<dyn ProviderSource>,
    registry: Arc<NetworkRegistry>,
    config: ConnectionConfig,
    connection: Store<Option<Connection>>,
    status: Store<ConnectionStatus>,
    guard: ConcurrencyGuard<Option<Connection>>,
    next_id: AtomicU64,
}

/// Owner of the single wallet connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(
        source: Arc<dyn ProviderSource>,
        registry: Arc<NetworkRegistry>,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                source,
                registry,
                config,
                connection: Store::new(None),
                status: Store::new(ConnectionStatus::Disconnected),
                guard: ConcurrencyGuard::new(),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Published connection, `None` when disconnected.
    pub fn current(&self) -> Option<Connection> {
        (*self.inner.connection.get()).clone()
    }

    pub fn store(&self) -> &Store<Option<Connection>> {
        &self.inner.connection
    }

    pub fn status(&self) -> &Store<ConnectionStatus> {
        &self.inner.status
    }

    pub fn registry(&self) -> &Arc<NetworkRegistry> {
        &self.inner.registry
    }

    /// Whether a wallet is present in the environment.
    pub fn can_connect(&self) -> bool {
        self.inner.source.is_available()
    }

    /// Connect to the wallet, switching to `desired` (or to a supported
    /// network) when the wallet is elsewhere.
    ///
    /// Joins any in-flight connect/switch/add. Joining a switch or add yields
    /// [`WalletError::PendingRequest`] since no connection came out of it.
    pub async fn connect(&self, desired: Option<ChainId>) -> WalletResult<Connection> {
        let inner = self.inner.clone();
        let outcome = self
            .inner
            .guard
            .run(move || async move { inner.connect_flow(desired).await.map(Some) })
            .await?;

        outcome.value.ok_or(WalletError::PendingRequest)
    }

    /// Ask the wallet to switch to `network_id`, registering the chain first if
    /// the wallet does not know it.
    pub async fn switch_chain(&self, network_id: ChainId) -> WalletResult<()> {
        let inner = self.inner.clone();
        self.inner
            .guard
            .run(move || async move { inner.switch_flow(network_id).await.map(|_| None) })
            .await?;
        Ok(())
    }

    /// Register a supported network with the wallet.
    pub async fn add_network(&self, network_id: ChainId) -> WalletResult<()> {
        let inner = self.inner.clone();
        self.inner
            .guard
            .run(move || async move { inner.add_flow(network_id).await.map(|_| None) })
            .await?;
        Ok(())
    }

    /// Tear down the connection. Listeners are removed and the provider is
    /// released before the absent state is published.
    pub fn disconnect(&self) {
        let Some(connection) = self.current() else {
            return;
        };

        connection.provider.remove_all_listeners();
        connection.provider.destroy();
        self.inner.connection.set(None);
        self.inner.status.set(ConnectionStatus::Disconnected);

        tracing::info!(address = %connection.address, "Wallet disconnected");
    }

    /// Re-read the selected account and republish the connection.
    pub async fn refresh_account(&self) -> WalletResult<()> {
        let Some(connection) = self.current() else {
            return Ok(());
        };

        let signer = connection.provider.get_signer().await?;
        let address = signer.address().await?;

        let next = Connection {
            id: self.inner.next_connection_id(),
            signer,
            address,
            ..connection.clone()
        };
        if self.inner.replace_if_current(connection.id, next) {
            tracing::info!(%address, "Wallet account changed");
        }
        Ok(())
    }

    /// Re-read the active chain and republish the connection.
    pub async fn refresh_chain_id(&self) -> WalletResult<()> {
        let Some(connection) = self.current() else {
            return Ok(());
        };

        let network_id = connection.provider.get_chain_id().await?;

        let next = Connection {
            id: self.inner.next_connection_id(),
            network_id,
            ..connection.clone()
        };
        if self.inner.replace_if_current(connection.id, next) {
            tracing::info!(chain_id = network_id.0, "Wallet network changed");
        }
        Ok(())
    }
}

impl ManagerInner {
    fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Publish `next` unless the connection it was derived from is gone.
    fn replace_if_current(&self, expected: ConnectionId, next: Connection) -> bool {
        let mut replaced = false;
        self.connection.update(|current| match current {
            Some(c) if c.id == expected => {
                replaced = true;
                Some(next.clone())
            }
            other => {
                replaced = false;
                other.clone()
            }
        });
        if !replaced {
            tracing::debug!("Connection changed while refreshing, dropping stale result");
        }
        replaced
    }

    fn settle_status(&self) {
        let status = if self.connection.get().is_some() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        self.status.set(status);
    }

    fn open_provider(&self) -> WalletResult<Arc<dyn WalletProvider>> {
        self.source.open().ok_or(WalletError::EthereumNotFound)
    }

    /// Provider of the live connection, or a fresh handle.
    fn active_provider(&self) -> WalletResult<Arc<dyn WalletProvider>> {
        match &*self.connection.get() {
            Some(connection) => Ok(connection.provider.clone()),
            None => self.open_provider(),
        }
    }

    async fn settle_delay(&self) {
        let delay = Duration::from_millis(self.config.chain_settle_delay_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_flow(self: Arc<Self>, desired: Option<ChainId>) -> WalletResult<Connection> {
        let provider = self.open_provider()?;
        self.status.set(ConnectionStatus::Connecting);

        let recovery = Recovery::new(self.config.max_switch_attempts);
        let result = self.establish(&provider, desired, recovery).await;

        match &result {
            Ok(connection) => {
                let previous = self.connection.get();
                if let Some(previous) = (*previous)
                    .as_ref()
                    .filter(|p| !same_provider(&p.provider, &connection.provider))
                {
                    previous.provider.remove_all_listeners();
                    previous.provider.destroy();
                }
                self.connection.set(Some(connection.clone()));
                tracing::info!(
                    address = %connection.address,
                    chain_id = connection.network_id.0,
                    "Wallet connected"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Wallet connection failed");
                provider.destroy();
            }
        }

        self.settle_status();
        result
    }

    async fn switch_flow(self: Arc<Self>, network_id: ChainId) -> WalletResult<()> {
        let provider = self.active_provider()?;
        let was_connected = self.connection.get().is_some();
        self.status.set(ConnectionStatus::SwitchingNetwork);

        let mut recovery = Recovery::new(self.config.max_switch_attempts);
        let result = self.switch_chain(&provider, network_id, &mut recovery).await;

        if result.is_ok() && was_connected {
            if let Some(connection) = &*self.connection.get() {
                match provider.get_chain_id().await {
                    Ok(chain_id) if chain_id != connection.network_id => {
                        let next = Connection {
                            id: self.next_connection_id(),
                            network_id: chain_id,
                            ..connection.clone()
                        };
                        self.replace_if_current(connection.id, next);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Failed to read chain after switch"),
                }
            }
        }

        self.settle_status();
        result
    }

    async fn add_flow(self: Arc<Self>, network_id: ChainId) -> WalletResult<()> {
        let provider = self.active_provider()?;
        let result = self.add_network(&provider, network_id).await;
        self.settle_status();
        result
    }

    /// Read signer, account and chain; switch and re-validate when the wallet
    /// sits on an unsupported or unexpected chain.
    fn establish<'a>(
        &'a self,
        provider: &'a Arc<dyn WalletProvider>,
        desired: Option<ChainId>,
        mut recovery: Recovery,
    ) -> BoxFuture<'a, WalletResult<Connection>> {
        Box::pin(async move {
            match self.read_or_switch(provider, desired, &mut recovery).await {
                Ok(Established::Ready(connection)) => Ok(connection),
                Ok(Established::Switched(target)) => {
                    self.establish(provider, Some(target), recovery).await
                }
                Err(WalletError::UnknownChain) if desired.is_some() && !recovery.added_chain => {
                    let target = desired.unwrap_or(ChainId::MAINNET);
                    recovery.added_chain = true;
                    tracing::debug!(chain_id = target.0, "Wallet lacks chain, adding before reconnect");
                    self.add_network(provider, target).await?;
                    self.settle_delay().await;
                    self.establish(provider, Some(target), recovery).await
                }
                Err(e) => Err(e),
            }
        })
    }

    async fn read_or_switch(
        &self,
        provider: &Arc<dyn WalletProvider>,
        desired: Option<ChainId>,
        recovery: &mut Recovery,
    ) -> WalletResult<Established> {
        let signer = provider.get_signer().await?;
        let address = signer.address().await?;
        let active = provider.get_chain_id().await?;

        let unsupported = !self.registry.contains(active);
        let mismatched = desired.is_some_and(|d| d != active);

        if unsupported || mismatched {
            let target = desired.unwrap_or(ChainId(self.config.default_network_id));
            tracing::debug!(
                active = active.0,
                target = target.0,
                unsupported,
                "Wallet on wrong chain, switching"
            );
            recovery.record_switch(target)?;
            self.switch_chain(provider, target, recovery).await?;
            return Ok(Established::Switched(target));
        }

        Ok(Established::Ready(Connection {
            id: self.next_connection_id(),
            signer,
            provider: provider.clone(),
            network_id: active,
            address,
        }))
    }

    /// Switch, registering the chain once if the wallet reports it unknown.
    fn switch_chain<'a>(
        &'a self,
        provider: &'a Arc<dyn WalletProvider>,
        network_id: ChainId,
        recovery: &'a mut Recovery,
    ) -> BoxFuture<'a, WalletResult<()>> {
        Box::pin(async move {
            let params = json!([{ "chainId": network_id.to_hex() }]);
            match prompt(provider, METHOD_SWITCH_CHAIN, params).await {
                Ok(_) => Ok(()),
                Err(WalletError::UnknownChain) if !recovery.added_chain => {
                    recovery.added_chain = true;
                    tracing::debug!(chain_id = network_id.0, "Wallet lacks chain, adding before switch");
                    self.add_network(provider, network_id).await?;
                    self.settle_delay().await;
                    self.switch_chain(provider, network_id, recovery).await
                }
                Err(WalletError::UnknownChain) => Err(WalletError::ChainSwitchLoop(network_id)),
                Err(e) => Err(e),
            }
        })
    }

    async fn add_network(
        &self,
        provider: &Arc<dyn WalletProvider>,
        network_id: ChainId,
    ) -> WalletResult<()> {
        let network = self
            .registry
            .get(network_id)
            .ok_or(WalletError::UnsupportedNetwork(network_id))?;

        prompt(provider, METHOD_ADD_CHAIN, json!([network.add_chain_params()])).await?;
        tracing::info!(chain_id = network_id.0, chain_name = %network.chain_name, "Network added to wallet");
        Ok(())
    }
}

enum Established {
    Ready(Connection),
    Switched(ChainId),
}

fn same_provider(a: &Arc<dyn WalletProvider>, b: &Arc<dyn WalletProvider>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

/// Issue a user-facing wallet request and classify its failure.
async fn prompt(
    provider: &Arc<dyn WalletProvider>,
    method: &'static str,
    params: Value,
) -> WalletResult<Value> {
    metrics::record_wallet_prompt(method);
    provider.request(method, params).await.map_err(WalletError::from)
}
