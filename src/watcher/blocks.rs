//! Block polling.
//!
//! Every new block may have changed the native balance, which emits no event,
//! so each observed block change marks the native token outdated and refreshes
//! whatever is outdated at that point (including tokens flagged by transfers).

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::tokens::cache::TokenCache;
use crate::tokens::types::NATIVE_SLUG;
use crate::wallet::provider::WalletProvider;

/// Remembers the last block number and reports changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTracker {
    last: Option<u64>,
}

impl BlockTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `block`. True when it differs from a previously seen block;
    /// the very first observation never counts as a change.
    pub fn observe(&mut self, block: u64) -> bool {
        let changed = self.last.is_some_and(|last| last != block);
        self.last = Some(block);
        changed
    }

    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

/// Poll the block number forever. Read failures are logged and polling goes on.
pub async fn poll_blocks(provider: Arc<dyn WalletProvider>, cache: TokenCache, period: Duration) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut tracker = BlockTracker::new();

    loop {
        ticker.tick().await;

        let block = match provider.get_block_number().await {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to poll block number");
                continue;
            }
        };

        metrics::record_block_number(block);
        if !tracker.observe(block) {
            continue;
        }

        tracing::trace!(block, "New block");
        if cache.mark_outdated(NATIVE_SLUG) {
            metrics::record_outdated_mark("block");
        }

        let cache = cache.clone();
        tokio::spawn(async move {
            cache.update_outdated_balances().await;
        });
    }
}
