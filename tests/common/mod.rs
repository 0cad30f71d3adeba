//! Shared utilities for integration testing: an in-memory wallet.
#![allow(dead_code)]

use alloy::primitives::{address, Address, U256};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wallet_sync::config::{ConnectionConfig, PollingConfig};
use wallet_sync::tokens::{TokenDescriptor, TokenMetadata};
use wallet_sync::wallet::error::{
    ProviderError, ALREADY_PENDING_ERROR_CODE, UNKNOWN_CHAIN_ERROR_CODE, USER_REJECTED_ERROR_CODE,
};
use wallet_sync::wallet::provider::{
    Erc20Contract, EventHandler, ListenerId, Listeners, ProviderEvent, ProviderEventKind,
    ProviderResult, ProviderSource, TransferEvent, TransferHandler, WalletProvider, WalletSigner,
    METHOD_ADD_CHAIN, METHOD_SWITCH_CHAIN,
};
use wallet_sync::wallet::{ChainId, ConnectionManager, NetworkRegistry};

pub const ACCOUNT: Address = address!("00000000000000000000000000000000000000a1");
pub const OTHER_ACCOUNT: Address = address!("00000000000000000000000000000000000000b2");
pub const STRANGER: Address = address!("00000000000000000000000000000000000000c3");
pub const TOKEN_A: Address = address!("c2132d05d31c914a87c6611c10748aeb04b58e8f");
pub const TOKEN_B: Address = address!("2791bca1f2de4661ed88a30c99a7a9449aa84174");

/// Programmable wallet state shared by every handle.
pub struct MockState {
    pub chain: ChainId,
    pub known_chains: HashSet<u64>,
    pub accounts: Vec<Address>,
    pub prompts: Vec<String>,
    /// Error returned by the next prompt, then cleared.
    pub next_prompt_error: Option<ProviderError>,
    pub prompt_delay: Duration,
    /// Accept switch requests without changing chain.
    pub ignore_switch: bool,
    /// Delay applied to every balance read.
    pub read_delay: Duration,
    pub native_balance: U256,
    pub token_balances: HashMap<Address, U256>,
    pub token_metadata: HashMap<Address, TokenMetadata>,
    /// Slugs whose reads fail.
    pub failing: HashSet<String>,
    pub block_number: u64,
    pub balance_reads: usize,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            chain: ChainId(1),
            known_chains: [1u64, 42161].into_iter().collect(),
            accounts: vec![ACCOUNT],
            prompts: Vec::new(),
            next_prompt_error: None,
            prompt_delay: Duration::ZERO,
            ignore_switch: false,
            read_delay: Duration::ZERO,
            native_balance: U256::from(5u64),
            token_balances: HashMap::from([
                (TOKEN_A, U256::from(1_500_000u64)),
                (TOKEN_B, U256::from(2_000_000u64)),
            ]),
            token_metadata: HashMap::from([
                (TOKEN_A, TokenMetadata::new("Tether USD", "USDT", 6)),
                (TOKEN_B, TokenMetadata::new("USD Coin", "USDC", 6)),
            ]),
            failing: HashSet::new(),
            block_number: 100,
            balance_reads: 0,
        }
    }
}

/// In-memory wallet. Every `open` hands out a fresh provider handle.
#[derive(Clone)]
pub struct MockWallet {
    state: Arc<Mutex<MockState>>,
    handles: Arc<Mutex<Vec<Arc<MockProvider>>>>,
    available: Arc<AtomicBool>,
    events: Arc<AtomicBool>,
    opened: Arc<AtomicUsize>,
}

impl MockWallet {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            handles: Arc::new(Mutex::new(Vec::new())),
            available: Arc::new(AtomicBool::new(true)),
            events: Arc::new(AtomicBool::new(true)),
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_events_supported(&self, supported: bool) {
        self.events.store(supported, Ordering::SeqCst);
    }

    pub fn prompts(&self) -> Vec<String> {
        self.with(|s| s.prompts.clone())
    }

    pub fn balance_reads(&self) -> usize {
        self.with(|s| s.balance_reads)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn handles(&self) -> Vec<Arc<MockProvider>> {
        self.handles.lock().unwrap().clone()
    }

    /// Deliver a wallet event to every handle ever opened, released ones included.
    pub fn fire_event(&self, event: ProviderEvent) {
        for handle in self.handles() {
            for handler in handle.events.handlers(event.kind()) {
                handler(event.clone());
            }
        }
    }

    /// Deliver a `Transfer` of `token` to every handle ever opened.
    pub fn fire_transfer(&self, token: Address, event: TransferEvent) {
        for handle in self.handles() {
            for handler in handle.transfers.handlers(token) {
                handler(event);
            }
        }
    }

    /// Live event and transfer listeners across all handles.
    pub fn listener_count(&self) -> usize {
        self.handles()
            .iter()
            .map(|h| h.events.len() + h.transfers.len())
            .sum()
    }
}

impl ProviderSource for MockWallet {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn open(&self) -> Option<Arc<dyn WalletProvider>> {
        if !self.is_available() {
            return None;
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let handle = Arc::new(MockProvider {
            wallet: self.clone(),
            destroyed: AtomicBool::new(false),
            events: Listeners::new(),
            transfers: Arc::new(Listeners::new()),
        });
        self.handles.lock().unwrap().push(handle.clone());
        Some(handle)
    }
}

pub struct MockProvider {
    wallet: MockWallet,
    pub destroyed: AtomicBool,
    events: Listeners<ProviderEventKind, EventHandler>,
    transfers: Arc<Listeners<Address, TransferHandler>>,
}

impl MockProvider {
    fn read<T>(&self, f: impl FnOnce(&mut MockState) -> ProviderResult<T>) -> ProviderResult<T> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ProviderError::uncoded("provider destroyed"));
        }
        self.wallet.with(f)
    }
}

fn parse_chain(params: &Value) -> u64 {
    let hex = params[0]["chainId"].as_str().unwrap_or("0x0");
    u64::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap_or(0)
}

#[async_trait]
impl WalletProvider for MockProvider {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value> {
        let delay = self.wallet.with(|s| {
            s.prompts.push(method.to_string());
            s.prompt_delay
        });
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.read(|s| {
            if let Some(err) = s.next_prompt_error.take() {
                return Err(err);
            }
            let chain = parse_chain(&params);
            match method {
                METHOD_SWITCH_CHAIN if s.known_chains.contains(&chain) => {
                    if !s.ignore_switch {
                        s.chain = ChainId(chain);
                    }
                    Ok(Value::Null)
                }
                METHOD_SWITCH_CHAIN => Err(ProviderError::coded(
                    UNKNOWN_CHAIN_ERROR_CODE,
                    "Unrecognized chain ID",
                )),
                METHOD_ADD_CHAIN => {
                    s.known_chains.insert(chain);
                    Ok(Value::Null)
                }
                other => Err(ProviderError::uncoded(format!("unsupported method {other}"))),
            }
        })
    }

    async fn get_signer(&self) -> ProviderResult<Arc<dyn WalletSigner>> {
        self.read(|s| {
            if s.accounts.is_empty() {
                Err(ProviderError::coded(USER_REJECTED_ERROR_CODE, "User rejected the request."))
            } else {
                Ok(())
            }
        })?;
        Ok(Arc::new(MockSigner {
            wallet: self.wallet.clone(),
        }))
    }

    async fn get_chain_id(&self) -> ProviderResult<ChainId> {
        self.read(|s| Ok(s.chain))
    }

    async fn get_balance(&self, _address: Address) -> ProviderResult<U256> {
        read_delay(&self.wallet).await;
        self.read(|s| {
            s.balance_reads += 1;
            if s.failing.contains(&TokenDescriptor::Native.slug()) {
                return Err(ProviderError::uncoded("timeout"));
            }
            Ok(s.native_balance)
        })
    }

    async fn get_block_number(&self) -> ProviderResult<u64> {
        self.read(|s| Ok(s.block_number))
    }

    fn contract(&self, address: Address) -> Arc<dyn Erc20Contract> {
        Arc::new(MockContract {
            address,
            wallet: self.wallet.clone(),
            transfers: self.transfers.clone(),
        })
    }

    fn supports_events(&self) -> bool {
        self.wallet.events.load(Ordering::SeqCst)
    }

    fn on(&self, kind: ProviderEventKind, handler: EventHandler) -> Option<ListenerId> {
        self.supports_events().then(|| self.events.add(kind, handler))
    }

    fn off(&self, id: ListenerId) {
        self.events.remove(id);
    }

    fn remove_all_listeners(&self) {
        self.events.clear();
        self.transfers.clear();
    }

    fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

async fn read_delay(wallet: &MockWallet) {
    let delay = wallet.with(|s| s.read_delay);
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

struct MockSigner {
    wallet: MockWallet,
}

#[async_trait]
impl WalletSigner for MockSigner {
    async fn address(&self) -> ProviderResult<Address> {
        self.wallet
            .with(|s| s.accounts.first().copied())
            .ok_or_else(|| ProviderError::uncoded("no account"))
    }
}

pub struct MockContract {
    address: Address,
    wallet: MockWallet,
    transfers: Arc<Listeners<Address, TransferHandler>>,
}

impl MockContract {
    fn read<T>(&self, f: impl FnOnce(&mut MockState) -> ProviderResult<T>) -> ProviderResult<T> {
        let slug = TokenDescriptor::contract(self.address).slug();
        self.wallet.with(|s| {
            if s.failing.contains(&slug) {
                return Err(ProviderError::uncoded("timeout"));
            }
            f(s)
        })
    }

    fn metadata(&self) -> ProviderResult<TokenMetadata> {
        let address = self.address;
        self.read(|s| {
            s.token_metadata
                .get(&address)
                .cloned()
                .ok_or_else(|| ProviderError::uncoded("not a token"))
        })
    }
}

#[async_trait]
impl Erc20Contract for MockContract {
    fn address(&self) -> Address {
        self.address
    }

    async fn name(&self) -> ProviderResult<String> {
        Ok(self.metadata()?.name)
    }

    async fn symbol(&self) -> ProviderResult<String> {
        Ok(self.metadata()?.symbol)
    }

    async fn decimals(&self) -> ProviderResult<u8> {
        Ok(self.metadata()?.decimals)
    }

    async fn balance_of(&self, _owner: Address) -> ProviderResult<U256> {
        read_delay(&self.wallet).await;
        let address = self.address;
        self.wallet.with(|s| s.balance_reads += 1);
        self.read(|s| Ok(s.token_balances.get(&address).copied().unwrap_or_default()))
    }

    fn on_transfer(&self, handler: TransferHandler) -> ListenerId {
        self.transfers.add(self.address, handler)
    }

    fn off_transfer(&self, id: ListenerId) {
        self.transfers.remove(id);
    }
}

pub fn rejected() -> ProviderError {
    ProviderError::coded(USER_REJECTED_ERROR_CODE, "User rejected the request.")
}

pub fn already_pending() -> ProviderError {
    ProviderError::coded(ALREADY_PENDING_ERROR_CODE, "Request already pending")
}

pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig {
        default_network_id: 1,
        chain_settle_delay_ms: 0,
        max_switch_attempts: 2,
    }
}

pub fn polling_config() -> PollingConfig {
    PollingConfig {
        block_interval_ms: 20,
        account_interval_ms: 20,
    }
}

pub fn manager(wallet: &MockWallet) -> ConnectionManager {
    ConnectionManager::new(
        Arc::new(wallet.clone()),
        Arc::new(NetworkRegistry::builtin()),
        connection_config(),
    )
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check().await
}
