//! Session facade wiring the connection manager, token cache and watcher.
//!
//! This is what a front end drives: connect to the selected network, pick a
//! different network, disconnect. The watched-token set always follows the
//! connected network.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::SyncConfig;
use crate::lifecycle::Shutdown;
use crate::tokens::cache::TokenCache;
use crate::wallet::connection::{Connection, ConnectionManager};
use crate::wallet::error::{WalletError, WalletResult};
use crate::wallet::provider::ProviderSource;
use crate::wallet::registry::NetworkRegistry;
use crate::wallet::types::ChainId;
use crate::watcher::EventWatcher;

pub struct WalletSession {
    connections: ConnectionManager,
    cache: TokenCache,
    selected_network: AtomicU64,
    shutdown: Shutdown,
    watcher: JoinHandle<()>,
}

impl WalletSession {
    /// Build the components and spawn the event watcher on the current runtime.
    pub fn start(
        source: Arc<dyn ProviderSource>,
        registry: Arc<NetworkRegistry>,
        config: &SyncConfig,
    ) -> Self {
        let connections = ConnectionManager::new(source, registry, config.connection.clone());
        let cache = TokenCache::new(connections.clone());
        let shutdown = Shutdown::new();

        let watcher = EventWatcher::new(connections.clone(), cache.clone(), config.polling.clone())
            .spawn(shutdown.subscribe());

        Self {
            connections,
            cache,
            selected_network: AtomicU64::new(config.connection.default_network_id),
            shutdown,
            watcher,
        }
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Whether a wallet is available to connect to.
    pub fn can_connect(&self) -> bool {
        self.connections.can_connect()
    }

    /// Network picked in [`WalletSession::select_network`] or last connected to.
    pub fn selected_network(&self) -> ChainId {
        ChainId(self.selected_network.load(Ordering::Relaxed))
    }

    /// Connect to `network_id` and watch its default tokens.
    pub async fn connect(&self, network_id: ChainId) -> WalletResult<Connection> {
        let connection = self.connections.connect(Some(network_id)).await?;
        self.follow_network(&connection);
        Ok(connection)
    }

    /// Connect to whatever supported network the wallet is on. A missing
    /// wallet is not an error here.
    pub async fn auto_connect(&self) -> WalletResult<Option<Connection>> {
        match self.connections.connect(None).await {
            Ok(connection) => {
                self.follow_network(&connection);
                Ok(Some(connection))
            }
            Err(WalletError::EthereumNotFound) => {
                tracing::debug!("No wallet detected, skipping auto-connect");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Disconnect and stop watching tokens.
    pub fn disconnect(&self) {
        self.connections.disconnect();
        self.cache.set_watched_tokens(Vec::new());
    }

    /// Switch the wallet when connected, otherwise remember the choice.
    pub async fn select_network(&self, network_id: ChainId) -> WalletResult<()> {
        if self.connections.current().is_none() {
            self.selected_network.store(network_id.0, Ordering::Relaxed);
            return Ok(());
        }

        self.connections.switch_chain(network_id).await?;
        match self.connections.current() {
            Some(connection) => self.follow_network(&connection),
            None => self.selected_network.store(network_id.0, Ordering::Relaxed),
        }
        Ok(())
    }

    /// Stop the watcher and wait for it to finish.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        if let Err(e) = self.watcher.await {
            tracing::warn!(error = %e, "Event watcher ended abnormally");
        }
    }

    fn follow_network(&self, connection: &Connection) {
        let network = connection.network_id();
        self.selected_network.store(network.0, Ordering::Relaxed);

        let defaults = self.connections.registry().default_tokens(network);
        if self.cache.network() != Some(network) || *self.cache.tokens() != defaults {
            self.cache.set_network_tokens(network, defaults);
        }
    }
}
