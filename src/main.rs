//! Headless wallet-sync runner.
//!
//! Connects to the node's first account through the JSON-RPC wallet, watches
//! the selected network's default tokens and logs the balance table whenever
//! it changes.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use wallet_sync::config::load_config_with;
use wallet_sync::lifecycle::signals::wait_for_shutdown_signal;
use wallet_sync::observability::{logging, metrics};
use wallet_sync::tokens::{format_units, FetchState};
use wallet_sync::wallet::rpc::RpcSource;
use wallet_sync::WalletSession;

#[derive(Parser)]
#[command(name = "wallet-sync")]
#[command(about = "Keep a wallet connection and token balances in sync", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint, overrides the configured one
    #[arg(long)]
    rpc_url: Option<String>,

    /// Network to connect to, overrides the configured default
    #[arg(short, long)]
    network: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config_with(cli.config.as_deref(), |config| {
        if let Some(url) = cli.rpc_url {
            config.rpc.url = url;
        }
        if let Some(network) = cli.network {
            config.connection.default_network_id = network;
        }
    })?;

    logging::init_logging(&config.observability);
    tracing::info!("wallet-sync v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let registry = Arc::new(config.registry());
    let source = Arc::new(RpcSource::new(&config.rpc)?);
    let session = WalletSession::start(source, registry, &config);

    let connection = match session.connect(session.selected_network()).await {
        Ok(connection) => connection,
        Err(e) => {
            tracing::error!(error = %e, "{}", e.user_message());
            session.shutdown().await;
            return Err(e.into());
        }
    };
    tracing::info!(
        account = %connection.short_address(),
        chain_id = %connection.network_id().to_hex(),
        "Connected"
    );

    let mut balances = session.cache().balances().subscribe();
    let signal = wait_for_shutdown_signal();
    tokio::pin!(signal);

    loop {
        tokio::select! {
            _ = balances.changed() => {
                balances.get();
                report(&session);
            }
            _ = &mut signal => break,
        }
    }

    session.disconnect();
    session.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Log one line per watched token.
fn report(session: &WalletSession) {
    let cache = session.cache();
    for token in cache.tokens().iter() {
        let metadata = cache.token_metadata(token).and_then(|m| m.data().cloned());
        let label = metadata
            .as_ref()
            .map(|m| m.symbol.clone())
            .unwrap_or_else(|| token.fallback_name());

        match cache.balance(token) {
            Some(FetchState::Success { data }) => {
                let amount = match &metadata {
                    Some(m) => format_units(data, m.decimals),
                    None => data.to_string(),
                };
                tracing::info!(token = %label, balance = %amount, "Balance");
            }
            Some(FetchState::Error { cause }) => {
                tracing::warn!(token = %label, error = %cause, "Balance unavailable");
            }
            _ => tracing::debug!(token = %label, "Balance loading"),
        }
    }
}
