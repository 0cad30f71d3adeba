//! Bridge from external signals to cache and connection updates.
//!
//! # Signals
//! ```text
//! watched-token set replaced      → reset metadata + balances, full refresh of both
//! account changed, same network   → reset balances, full balance refresh
//! network changed under us        → watched set reassigned to that network's defaults
//! Transfer event (contract token) → mark token outdated
//! block number changed            → mark native outdated, refresh outdated balances
//! accountsChanged / chainChanged  → refresh_account / refresh_chain_id
//! ```
//!
//! Each (connection, tokens) snapshot gets one cycle of subscriptions and
//! polling tasks. A cycle is torn down through the exact handles it was
//! created with before the next one is installed, so nothing outlives the
//! connection it was opened against.

pub mod blocks;
pub mod events;

use alloy::primitives::Address;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::config::PollingConfig;
use crate::lifecycle::ShutdownSignal;
use crate::tokens::cache::TokenCache;
use crate::tokens::types::TokenDescriptor;
use crate::wallet::connection::{Connection, ConnectionManager};
use crate::wallet::provider::{Erc20Contract, ListenerId, ProviderEventKind, WalletProvider};
use crate::wallet::types::ChainId;

/// Subscriptions and tasks installed for one snapshot.
struct Cycle {
    provider: Arc<dyn WalletProvider>,
    transfers: Vec<(Arc<dyn Erc20Contract>, ListenerId)>,
    wallet_listeners: Vec<ListenerId>,
    tasks: Vec<JoinHandle<()>>,
}

impl Cycle {
    fn teardown(&mut self) {
        for (contract, id) in self.transfers.drain(..) {
            contract.off_transfer(id);
        }
        for id in self.wallet_listeners.drain(..) {
            self.provider.off(id);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Cycle {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Values seen while connected, used to tell which signal fired.
#[derive(Default)]
struct Seen {
    tokens: Option<Arc<Vec<TokenDescriptor>>>,
    account: Option<Address>,
    network: Option<ChainId>,
}

/// Watches connection and token changes and keeps balances fresh.
pub struct EventWatcher {
    connections: ConnectionManager,
    cache: TokenCache,
    config: PollingConfig,
    cycle: Option<Cycle>,
    seen: Seen,
}

impl EventWatcher {
    pub fn new(connections: ConnectionManager, cache: TokenCache, config: PollingConfig) -> Self {
        Self {
            connections,
            cache,
            config,
            cycle: None,
            seen: Seen::default(),
        }
    }

    /// Spawn [`EventWatcher::run`] on the current runtime.
    pub fn spawn(self, shutdown: ShutdownSignal) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// React to changes until `shutdown` fires.
    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        let mut connection_rx = self.connections.store().subscribe();
        let mut tokens_rx = self.cache.tokens_store().subscribe();

        tracing::info!(
            block_interval_ms = self.config.block_interval_ms,
            "Event watcher starting"
        );

        self.sync((*connection_rx.get()).clone(), tokens_rx.get());

        loop {
            tokio::select! {
                _ = connection_rx.changed() => {}
                _ = tokens_rx.changed() => {}
                _ = shutdown.recv() => {
                    tracing::info!("Event watcher received shutdown signal, exiting loop");
                    break;
                }
            }

            self.sync((*connection_rx.get()).clone(), tokens_rx.get());
        }

        self.cycle = None;
    }

    /// Tear down the previous cycle, dispatch signals, install the next cycle.
    fn sync(&mut self, connection: Option<Connection>, tokens: Arc<Vec<TokenDescriptor>>) {
        if let Some(mut previous) = self.cycle.take() {
            previous.teardown();
        }

        let Some(connection) = connection else {
            return;
        };
        let account = connection.address();
        let network = connection.network_id();

        // A custom list follows the last network this watcher saw instead.
        let assigned = self.cache.network().or(self.seen.network);
        if assigned.is_some_and(|n| n != network) {
            let defaults = self.connections.registry().default_tokens(network);
            if *tokens != defaults {
                tracing::info!(chain_id = network.0, "Network changed, reassigning watched tokens");
                self.seen.account = Some(account);
                self.seen.network = Some(network);
                // The token change wakes us again and installs the next cycle.
                self.cache.set_network_tokens(network, defaults);
                return;
            }
        }

        let tokens_changed = self
            .seen
            .tokens
            .as_ref()
            .map_or(true, |seen| !Arc::ptr_eq(seen, &tokens));
        let account_changed = self.seen.account != Some(account);
        let same_network = self.seen.network == Some(network);

        if tokens_changed {
            self.cache.reset_metadata();
            self.cache.reset_balances();
            let cache = self.cache.clone();
            tokio::spawn(async move {
                tokio::join!(cache.update_all_metadata(), cache.update_all_balances());
            });
        } else if account_changed && same_network {
            self.cache.reset_balances();
            let cache = self.cache.clone();
            tokio::spawn(async move {
                cache.update_all_balances().await;
            });
        }

        self.seen.tokens = Some(tokens.clone());
        self.seen.account = Some(account);
        self.seen.network = Some(network);

        self.cycle = Some(self.install(&connection, &tokens));
    }

    fn install(&self, connection: &Connection, tokens: &[TokenDescriptor]) -> Cycle {
        let provider = connection.provider().clone();
        let mut cycle = Cycle {
            provider: provider.clone(),
            transfers: Vec::new(),
            wallet_listeners: Vec::new(),
            tasks: Vec::new(),
        };

        for token in tokens {
            let Some(contract) = self.cache.contracts().get(connection, token) else {
                continue;
            };
            let handler = events::transfer_handler(self.cache.clone(), token.slug(), connection.address());
            let id = contract.on_transfer(handler);
            cycle.transfers.push((contract, id));
        }

        cycle.tasks.push(tokio::spawn(blocks::poll_blocks(
            provider.clone(),
            self.cache.clone(),
            Duration::from_millis(self.config.block_interval_ms),
        )));

        if provider.supports_events() {
            let handler = events::wallet_event_handler(self.connections.clone(), Handle::current());
            for kind in [ProviderEventKind::AccountsChanged, ProviderEventKind::ChainChanged] {
                if let Some(id) = provider.on(kind, handler.clone()) {
                    cycle.wallet_listeners.push(id);
                }
            }
        } else {
            cycle.tasks.push(tokio::spawn(events::poll_account(
                self.connections.clone(),
                connection.clone(),
                Duration::from_millis(self.config.account_interval_ms),
            )));
        }

        tracing::debug!(
            connection_id = connection.id().0,
            transfers = cycle.transfers.len(),
            events = provider.supports_events(),
            "Watch cycle installed"
        );
        cycle
    }
}
