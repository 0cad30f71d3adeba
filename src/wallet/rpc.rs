//! Wallet provider over a JSON-RPC node.
//!
//! Lets the crate run outside a browser: the node's unlocked accounts stand
//! in for the wallet's signer and `wallet_*` requests are forwarded as-is.
//! Nodes do not push wallet events, so [`RpcWallet::supports_events`] is false
//! and the watcher falls back to polling. `Transfer` subscriptions are served
//! by polling `eth_getLogs` over new blocks.

use alloy::primitives::{Address, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::eth::Filter;
use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy::transports::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::{Future, IntoFuture};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::config::RpcConfig;
use crate::wallet::error::ProviderError;
use crate::wallet::provider::{
    Erc20Contract, EventHandler, ListenerId, ProviderEventKind, ProviderResult, ProviderSource,
    TransferEvent, TransferHandler, WalletProvider, WalletSigner,
};
use crate::wallet::types::ChainId;

sol! {
    #[sol(rpc)]
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address owner) external view returns (uint256);

        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}

/// Opens [`RpcWallet`] handles against one endpoint.
pub struct RpcSource {
    provider: DynProvider,
    config: RpcConfig,
}

impl RpcSource {
    pub fn new(config: &RpcConfig) -> Result<Self, ProviderError> {
        let url: url::Url = config
            .url
            .parse()
            .map_err(|e| ProviderError::uncoded(format!("Invalid RPC URL '{}': {}", config.url, e)))?;

        tracing::info!(rpc_url = %config.url, "RPC wallet source configured");
        Ok(Self {
            provider: ProviderBuilder::new().connect_http(url).erased(),
            config: config.clone(),
        })
    }
}

impl ProviderSource for RpcSource {
    fn is_available(&self) -> bool {
        true
    }

    fn open(&self) -> Option<Arc<dyn WalletProvider>> {
        Some(Arc::new(RpcWallet::new(self.provider.clone(), &self.config)))
    }
}

/// Polling tasks owned by one provider handle.
struct Subscriptions {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<u64, JoinHandle<()>>>,
}

impl Subscriptions {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
        }
    }

    fn add(&self, task: JoinHandle<()>) -> ListenerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, task);
        ListenerId(id)
    }

    fn remove(&self, id: ListenerId) {
        if let Some(task) = self.lock().remove(&id.0) {
            task.abort();
        }
    }

    fn clear(&self) {
        for (_, task) in self.lock().drain() {
            task.abort();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Settings shared by a handle and the contracts it creates.
#[derive(Clone)]
struct RpcContext {
    provider: DynProvider,
    timeout: Duration,
    log_poll_interval: Duration,
    subscriptions: Arc<Subscriptions>,
    destroyed: Arc<AtomicBool>,
}

impl RpcContext {
    /// Run an RPC call under the configured timeout.
    async fn call<T, E, F>(&self, op: &str, fut: F) -> ProviderResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ProviderError>,
    {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(ProviderError::uncoded("Provider was destroyed"));
        }
        match timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                tracing::warn!(op, timeout_ms = self.timeout.as_millis() as u64, "RPC timeout");
                Err(ProviderError::uncoded(format!("{op} timed out")))
            }
        }
    }
}

impl From<TransportError> for ProviderError {
    fn from(e: TransportError) -> Self {
        match e.as_error_resp() {
            Some(payload) => ProviderError::coded(payload.code, payload.message.to_string()),
            None => ProviderError::uncoded(e.to_string()),
        }
    }
}

impl From<alloy::contract::Error> for ProviderError {
    fn from(e: alloy::contract::Error) -> Self {
        match e {
            alloy::contract::Error::TransportError(e) => e.into(),
            other => ProviderError::uncoded(other.to_string()),
        }
    }
}

/// Provider handle backed by a JSON-RPC node.
pub struct RpcWallet {
    ctx: RpcContext,
}

impl RpcWallet {
    pub fn new(provider: DynProvider, config: &RpcConfig) -> Self {
        Self {
            ctx: RpcContext {
                provider,
                timeout: Duration::from_secs(config.timeout_secs),
                log_poll_interval: Duration::from_millis(config.log_poll_interval_ms),
                subscriptions: Arc::new(Subscriptions::new()),
                destroyed: Arc::new(AtomicBool::new(false)),
            },
        }
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    async fn request(&self, method: &str, params: Value) -> ProviderResult<Value> {
        let provider = &self.ctx.provider;
        self.ctx
            .call(method, provider.raw_request::<_, Value>(method.to_string().into(), params))
            .await
    }

    async fn get_signer(&self) -> ProviderResult<Arc<dyn WalletSigner>> {
        let signer = RpcSigner {
            ctx: self.ctx.clone(),
        };
        // Fails early when the node exposes no account.
        signer.address().await?;
        Ok(Arc::new(signer))
    }

    async fn get_chain_id(&self) -> ProviderResult<ChainId> {
        let id = self
            .ctx
            .call("eth_chainId", self.ctx.provider.get_chain_id().into_future())
            .await?;
        Ok(ChainId(id))
    }

    async fn get_balance(&self, address: Address) -> ProviderResult<U256> {
        self.ctx
            .call("eth_getBalance", self.ctx.provider.get_balance(address).into_future())
            .await
    }

    async fn get_block_number(&self) -> ProviderResult<u64> {
        self.ctx
            .call("eth_blockNumber", self.ctx.provider.get_block_number().into_future())
            .await
    }

    fn contract(&self, address: Address) -> Arc<dyn Erc20Contract> {
        Arc::new(RpcErc20 {
            address,
            instance: IERC20::new(address, self.ctx.provider.clone()),
            ctx: self.ctx.clone(),
        })
    }

    fn supports_events(&self) -> bool {
        false
    }

    fn on(&self, _kind: ProviderEventKind, _handler: EventHandler) -> Option<ListenerId> {
        None
    }

    fn off(&self, _id: ListenerId) {}

    fn remove_all_listeners(&self) {
        self.ctx.subscriptions.clear();
    }

    fn destroy(&self) {
        self.ctx.destroyed.store(true, Ordering::Release);
        self.ctx.subscriptions.clear();
    }
}

/// First unlocked account of the node.
struct RpcSigner {
    ctx: RpcContext,
}

#[async_trait]
impl WalletSigner for RpcSigner {
    async fn address(&self) -> ProviderResult<Address> {
        let accounts = self
            .ctx
            .call("eth_accounts", self.ctx.provider.get_accounts().into_future())
            .await?;
        accounts
            .first()
            .copied()
            .ok_or_else(|| ProviderError::uncoded("Node exposes no accounts"))
    }
}

struct RpcErc20 {
    address: Address,
    instance: IERC20::IERC20Instance<DynProvider>,
    ctx: RpcContext,
}

#[async_trait]
impl Erc20Contract for RpcErc20 {
    fn address(&self) -> Address {
        self.address
    }

    async fn name(&self) -> ProviderResult<String> {
        self.ctx
            .call("name", self.instance.name().call().into_future())
            .await
    }

    async fn symbol(&self) -> ProviderResult<String> {
        self.ctx
            .call("symbol", self.instance.symbol().call().into_future())
            .await
    }

    async fn decimals(&self) -> ProviderResult<u8> {
        self.ctx
            .call("decimals", self.instance.decimals().call().into_future())
            .await
    }

    async fn balance_of(&self, owner: Address) -> ProviderResult<U256> {
        self.ctx
            .call("balanceOf", self.instance.balanceOf(owner).call().into_future())
            .await
    }

    fn on_transfer(&self, handler: TransferHandler) -> ListenerId {
        let task = tokio::spawn(poll_transfers(self.ctx.clone(), self.address, handler));
        self.ctx.subscriptions.add(task)
    }

    fn off_transfer(&self, id: ListenerId) {
        self.ctx.subscriptions.remove(id);
    }
}

/// Deliver `Transfer` logs of `contract` from blocks mined after the first poll.
async fn poll_transfers(ctx: RpcContext, contract: Address, handler: TransferHandler) {
    let mut ticker = interval(ctx.log_poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_block: Option<u64> = None;

    loop {
        ticker.tick().await;

        let block = ctx.provider.get_block_number().into_future();
        let current = match ctx.call("eth_blockNumber", block).await {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!(contract = %contract, error = %e, "Transfer poll failed");
                continue;
            }
        };

        let Some(from) = last_block else {
            last_block = Some(current);
            continue;
        };
        if current <= from {
            continue;
        }

        let filter = Filter::new()
            .address(contract)
            .from_block(from + 1)
            .to_block(current)
            .event(IERC20::Transfer::SIGNATURE);

        let logs = match ctx.call("eth_getLogs", ctx.provider.get_logs(&filter)).await {
            Ok(logs) => logs,
            Err(e) => {
                tracing::warn!(contract = %contract, error = %e, "Fetching transfer logs failed");
                continue;
            }
        };

        for log in logs {
            if let Ok(decoded) = log.log_decode::<IERC20::Transfer>() {
                let event = decoded.inner.data;
                handler(TransferEvent {
                    from: event.from,
                    to: event.to,
                    amount: event.value,
                });
            }
        }

        last_block = Some(current);
    }
}
