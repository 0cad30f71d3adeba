//! Transfer relevance and wallet event handlers.

use alloy::primitives::{Address, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::tokens::cache::TokenCache;
use crate::wallet::connection::{Connection, ConnectionManager};
use crate::wallet::provider::{EventHandler, ProviderEvent, TransferEvent, TransferHandler};

/// A transfer changes the account's balance only when the account is on one
/// side, the amount is nonzero and it is not a self-transfer.
pub fn is_relevant_transfer(event: &TransferEvent, account: Address) -> bool {
    (event.from == account || event.to == account)
        && event.amount > U256::ZERO
        && event.from != event.to
}

/// Handler marking `slug` outdated on relevant transfers of `account`.
pub fn transfer_handler(cache: TokenCache, slug: String, account: Address) -> TransferHandler {
    Arc::new(move |event: TransferEvent| {
        if is_relevant_transfer(&event, account) && cache.mark_outdated(&slug) {
            metrics::record_outdated_mark("transfer");
            tracing::debug!(token = %slug, from = %event.from, to = %event.to, "Balance outdated by transfer");
        }
    })
}

/// Handler bridging wallet events into connection refreshes.
///
/// Events may fire from any thread, so work is spawned on `runtime`.
pub fn wallet_event_handler(connections: ConnectionManager, runtime: Handle) -> EventHandler {
    Arc::new(move |event: ProviderEvent| {
        let connections = connections.clone();
        runtime.spawn(async move {
            let result = match event {
                ProviderEvent::AccountsChanged(_) => connections.refresh_account().await,
                ProviderEvent::ChainChanged(_) => connections.refresh_chain_id().await,
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "Failed to apply wallet event");
            }
        });
    })
}

/// Poll account and network for wallets that emit no events.
pub async fn poll_account(connections: ConnectionManager, connection: Connection, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let provider = connection.provider().clone();

    loop {
        ticker.tick().await;

        let address = match provider.get_signer().await {
            Ok(signer) => signer.address().await,
            Err(e) => Err(e),
        };
        match address {
            Ok(address) if address != connection.address() => {
                if let Err(e) = connections.refresh_account().await {
                    tracing::warn!(error = %e, "Failed to refresh account");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Account poll failed"),
        }

        match provider.get_chain_id().await {
            Ok(chain_id) if chain_id != connection.network_id() => {
                if let Err(e) = connections.refresh_chain_id().await {
                    tracing::warn!(error = %e, "Failed to refresh network");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Network poll failed"),
        }
    }
}
