//! Configuration validation.
//!
//! Serde handles the syntax; this checks value ranges and network entries.
//! All problems are reported at once, not just the first.

use std::collections::HashSet;
use thiserror::Error;

use crate::config::schema::SyncConfig;

/// One semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.polling.block_interval_ms == 0 {
        errors.push(ValidationError::new("polling.block_interval_ms", "must be greater than 0"));
    }
    if config.polling.account_interval_ms == 0 {
        errors.push(ValidationError::new("polling.account_interval_ms", "must be greater than 0"));
    }
    if config.connection.max_switch_attempts == 0 {
        errors.push(ValidationError::new("connection.max_switch_attempts", "must be at least 1"));
    }
    if config.rpc.timeout_secs == 0 {
        errors.push(ValidationError::new("rpc.timeout_secs", "must be greater than 0"));
    }
    if config.rpc.log_poll_interval_ms == 0 {
        errors.push(ValidationError::new("rpc.log_poll_interval_ms", "must be greater than 0"));
    }
    if url::Url::parse(&config.rpc.url).is_err() {
        errors.push(ValidationError::new("rpc.url", format!("invalid URL '{}'", config.rpc.url)));
    }

    let mut chain_ids = HashSet::new();
    for (i, network) in config.networks.iter().enumerate() {
        let field = format!("networks[{}]", i);

        if network.chain_id == 0 {
            errors.push(ValidationError::new(&field, "chain_id must be non-zero"));
        } else if !chain_ids.insert(network.chain_id) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate chain_id {}", network.chain_id),
            ));
        }

        if network.native_currency.symbol.trim().is_empty() {
            errors.push(ValidationError::new(&field, "native_currency.symbol is empty"));
        }

        if network.rpc_urls.is_empty() {
            errors.push(ValidationError::new(&field, "at least one rpc url is required"));
        }
        for raw in network.rpc_urls.iter().chain(&network.block_explorer_urls) {
            if url::Url::parse(raw).is_err() {
                errors.push(ValidationError::new(&field, format!("invalid URL '{}'", raw)));
            }
        }

        if let Err(message) = network.to_network() {
            errors.push(ValidationError::new(&field, message));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
