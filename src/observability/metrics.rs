//! Metrics collection and exposition.
//!
//! # Metrics
//! - `wallet_prompts_total` (counter): wallet requests that may open a prompt, by method
//! - `token_fetch_total` (counter): per-token fetches by kind (balance/metadata) and outcome
//! - `outdated_marks_total` (counter): outdated flags set, by source (transfer/block)
//! - `watched_tokens` (gauge): size of the watched-token set
//! - `latest_block_number` (gauge): last block number seen by the poller
//!
//! Recording goes through the `metrics` facade and is a no-op until an
//! exporter is installed with [`init_metrics`].

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP listener on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_wallet_prompt(method: &'static str) {
    metrics::counter!("wallet_prompts_total", "method" => method).increment(1);
}

pub fn record_token_fetch(kind: &'static str, outcome: &'static str) {
    metrics::counter!("token_fetch_total", "kind" => kind, "outcome" => outcome).increment(1);
}

pub fn record_outdated_mark(source: &'static str) {
    metrics::counter!("outdated_marks_total", "source" => source).increment(1);
}

pub fn record_watched_tokens(count: usize) {
    metrics::gauge!("watched_tokens").set(count as f64);
}

pub fn record_block_number(block: u64) {
    metrics::gauge!("latest_block_number").set(block as f64);
}
