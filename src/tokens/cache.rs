//! Balance and metadata cache for the watched tokens.
//!
//! # Data Flow
//! ```text
//! set_watched_tokens → (watcher) reset_* → update_all_*      full cycle
//! transfer / block   → mark_outdated    → update_outdated_balances
//! ```
//!
//! Fetches fan out over all tokens at once. Every token's failure is captured
//! into its own [`FetchState::Error`]; a refresh as a whole never fails.

use alloy::primitives::U256;
use dashmap::DashMap;
use futures_util::future::join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;
use crate::store::Store;
use crate::tokens::contracts::ContractCache;
use crate::tokens::fetch_state::FetchState;
use crate::tokens::types::{TokenDescriptor, TokenMetadata};
use crate::wallet::connection::{Connection, ConnectionManager};
use crate::wallet::error::{WalletError, WalletResult};
use crate::wallet::types::ChainId;

/// Fetch states keyed by token slug.
pub type FetchMap<T> = HashMap<String, FetchState<T>>;

struct CacheInner {
    connections: ConnectionManager,
    contracts: ContractCache,
    tokens: Store<Vec<TokenDescriptor>>,
    balances: Store<FetchMap<U256>>,
    metadata: Store<FetchMap<TokenMetadata>>,
    outdated: DashMap<String, bool>,
    /// Network the watched list was assigned for, 0 when it is a custom list.
    network: AtomicU64,
}

/// Owner of the watched-token list and its balances and metadata.
#[derive(Clone)]
pub struct TokenCache {
    inner: Arc<CacheInner>,
}

impl TokenCache {
    pub fn new(connections: ConnectionManager) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                connections,
                contracts: ContractCache::new(),
                tokens: Store::new(Vec::new()),
                balances: Store::new(HashMap::new()),
                metadata: Store::new(HashMap::new()),
                outdated: DashMap::new(),
                network: AtomicU64::new(0),
            }),
        }
    }

    pub fn tokens(&self) -> Arc<Vec<TokenDescriptor>> {
        self.inner.tokens.get()
    }

    pub fn tokens_store(&self) -> &Store<Vec<TokenDescriptor>> {
        &self.inner.tokens
    }

    pub fn balances(&self) -> &Store<FetchMap<U256>> {
        &self.inner.balances
    }

    pub fn metadata(&self) -> &Store<FetchMap<TokenMetadata>> {
        &self.inner.metadata
    }

    pub fn contracts(&self) -> &ContractCache {
        &self.inner.contracts
    }

    pub fn balance(&self, token: &TokenDescriptor) -> Option<FetchState<U256>> {
        self.inner.balances.get().get(&token.slug()).cloned()
    }

    pub fn token_metadata(&self, token: &TokenDescriptor) -> Option<FetchState<TokenMetadata>> {
        self.inner.metadata.get().get(&token.slug()).cloned()
    }

    /// Network whose default tokens are watched, `None` for a custom list.
    pub fn network(&self) -> Option<ChainId> {
        match self.inner.network.load(Ordering::Acquire) {
            0 => None,
            id => Some(ChainId(id)),
        }
    }

    /// Replace the watched list. Duplicate slugs keep their first occurrence.
    /// Does not fetch anything by itself.
    pub fn set_watched_tokens(&self, tokens: Vec<TokenDescriptor>) {
        self.replace_watched(None, tokens);
    }

    /// Replace the watched list with the tokens of `network`.
    pub fn set_network_tokens(&self, network: ChainId, tokens: Vec<TokenDescriptor>) {
        self.replace_watched(Some(network), tokens);
    }

    fn replace_watched(&self, network: Option<ChainId>, tokens: Vec<TokenDescriptor>) {
        let mut seen = HashSet::new();
        let tokens: Vec<_> = tokens
            .into_iter()
            .filter(|token| seen.insert(token.slug()))
            .collect();

        self.inner.outdated.retain(|slug, _| seen.contains(slug));
        metrics::record_watched_tokens(tokens.len());
        tracing::debug!(count = tokens.len(), chain_id = ?network.map(|n| n.0), "Watched tokens replaced");
        self.inner
            .network
            .store(network.map_or(0, |n| n.0), Ordering::Release);
        self.inner.tokens.set(tokens);
    }

    /// Every watched token back to bare loading, dropping old balances.
    pub fn reset_balances(&self) {
        self.inner.balances.set(self.loading_map());
    }

    /// Every watched token back to bare loading, dropping old metadata.
    pub fn reset_metadata(&self) {
        self.inner.metadata.set(self.loading_map());
    }

    /// Flag a watched token's balance as needing a refresh.
    ///
    /// Returns false when the slug is not watched.
    pub fn mark_outdated(&self, slug: &str) -> bool {
        if !self.watched_slugs().contains(slug) {
            return false;
        }
        self.inner.outdated.insert(slug.to_string(), true);
        true
    }

    pub fn is_outdated(&self, slug: &str) -> bool {
        self.inner.outdated.get(slug).is_some_and(|flag| *flag)
    }

    /// Watched tokens whose balance is flagged outdated, in watch order.
    pub fn outdated_tokens(&self) -> Vec<TokenDescriptor> {
        self.tokens()
            .iter()
            .filter(|token| self.is_outdated(&token.slug()))
            .copied()
            .collect()
    }

    /// Refresh every watched balance, then clear all outdated flags.
    pub async fn update_all_balances(&self) {
        let this = self;
        let tokens = self.tokens();
        let refreshed = self
            .refresh(&self.inner.balances, &tokens, "balance", move |c, t| async move {
                this.fetch_balance(&c, &t).await
            })
            .await;

        self.inner.outdated.clear();
        for slug in refreshed {
            self.inner.outdated.insert(slug, false);
        }
    }

    /// Refresh only the balances flagged outdated and clear exactly those flags.
    pub async fn update_outdated_balances(&self) {
        let tokens = self.outdated_tokens();
        if tokens.is_empty() {
            return;
        }

        tracing::debug!(count = tokens.len(), "Refreshing outdated balances");
        let this = self;
        let refreshed = self
            .refresh(&self.inner.balances, &tokens, "balance", move |c, t| async move {
                this.fetch_balance(&c, &t).await
            })
            .await;

        for slug in refreshed {
            self.inner.outdated.insert(slug, false);
        }
    }

    /// Refresh one token's balance and clear its outdated flag.
    pub async fn update_balance(&self, token: TokenDescriptor) {
        let this = self;
        let refreshed = self
            .refresh(&self.inner.balances, &[token], "balance", move |c, t| async move {
                this.fetch_balance(&c, &t).await
            })
            .await;

        for slug in refreshed {
            self.inner.outdated.insert(slug, false);
        }
    }

    /// Refresh metadata of every watched token.
    pub async fn update_all_metadata(&self) {
        let this = self;
        let tokens = self.tokens();
        self.refresh(&self.inner.metadata, &tokens, "metadata", move |c, t| async move {
            this.fetch_metadata(&c, &t).await
        })
        .await;
    }

    fn watched_slugs(&self) -> HashSet<String> {
        self.tokens().iter().map(TokenDescriptor::slug).collect()
    }

    fn loading_map<T>(&self) -> FetchMap<T> {
        self.tokens()
            .iter()
            .map(|token| (token.slug(), FetchState::loading()))
            .collect()
    }

    /// Move `tokens` to loading (keeping visible data), fetch them concurrently
    /// and patch the results in. Returns the slugs that were refreshed.
    async fn refresh<T, F, Fut>(
        &self,
        store: &Store<FetchMap<T>>,
        tokens: &[TokenDescriptor],
        kind: &'static str,
        fetch: F,
    ) -> Vec<String>
    where
        T: Clone,
        F: Fn(Connection, TokenDescriptor) -> Fut,
        Fut: Future<Output = WalletResult<T>>,
    {
        if tokens.is_empty() {
            return Vec::new();
        }

        store.update(|current| {
            let mut next = current.clone();
            for token in tokens {
                let slug = token.slug();
                let state = FetchState::revalidating(current.get(&slug));
                next.insert(slug, state);
            }
            next
        });

        let connection = self.inner.connections.current();
        let fetch = &fetch;
        let entries = join_all(tokens.iter().map(|token| {
            let connection = connection.clone();
            let token = *token;
            async move {
                let slug = token.slug();
                let result = match connection {
                    Some(connection) => fetch(connection, token).await,
                    None => Err(WalletError::NoConnection),
                };

                match &result {
                    Ok(_) => metrics::record_token_fetch(kind, "success"),
                    Err(e) => {
                        metrics::record_token_fetch(kind, "error");
                        tracing::warn!(token = %slug, kind, error = %e, "Token fetch failed");
                    }
                }
                (slug, FetchState::from(result))
            }
        }))
        .await;

        // Tokens unwatched while fetching are dropped rather than left loading.
        let watched = self.watched_slugs();
        store.update(|current| {
            let mut next = current.clone();
            for (slug, state) in &entries {
                if watched.contains(slug) {
                    next.insert(slug.clone(), state.clone());
                } else {
                    next.remove(slug);
                }
            }
            next
        });

        entries
            .into_iter()
            .map(|(slug, _)| slug)
            .filter(|slug| watched.contains(slug))
            .collect()
    }

    async fn fetch_balance(
        &self,
        connection: &Connection,
        token: &TokenDescriptor,
    ) -> WalletResult<U256> {
        let owner = connection.address();
        let balance = match self.inner.contracts.get(connection, token) {
            None => connection.provider().get_balance(owner).await?,
            Some(contract) => contract.balance_of(owner).await?,
        };
        Ok(balance)
    }

    async fn fetch_metadata(
        &self,
        connection: &Connection,
        token: &TokenDescriptor,
    ) -> WalletResult<TokenMetadata> {
        match self.inner.contracts.get(connection, token) {
            None => self
                .inner
                .connections
                .registry()
                .native_currency(connection.network_id())
                .cloned()
                .ok_or(WalletError::UnsupportedNetwork(connection.network_id())),
            Some(contract) => {
                let (name, symbol, decimals) =
                    tokio::try_join!(contract.name(), contract.symbol(), contract.decimals())?;
                Ok(TokenMetadata {
                    name,
                    symbol,
                    decimals,
                })
            }
        }
    }
}
