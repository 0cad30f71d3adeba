//! OS signal handling.

/// Resolve on ctrl-c (SIGINT). Failure to install the handler is logged and
/// treated as an immediate signal so the caller still shuts down cleanly.
pub async fn wait_for_shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
