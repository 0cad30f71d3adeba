//! Contract handle cache.
//!
//! Handles are keyed by (token slug, connection id) so every part of the
//! crate that asks for a token's contract under the same connection gets the
//! same object. This matters for transfer subscriptions, which must be removed
//! from the handle they were added to. Entries from older connections are
//! evicted as soon as a newer connection is seen.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::tokens::types::TokenDescriptor;
use crate::wallet::connection::{Connection, ConnectionId};
use crate::wallet::provider::Erc20Contract;

#[derive(Default)]
pub struct ContractCache {
    handles: DashMap<(String, ConnectionId), Arc<dyn Erc20Contract>>,
    connection: AtomicU64,
}

impl ContractCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for a contract token, `None` for the native token.
    pub fn get(
        &self,
        connection: &Connection,
        token: &TokenDescriptor,
    ) -> Option<Arc<dyn Erc20Contract>> {
        let address = token.address()?;
        self.evict_stale(connection.id());

        let handle = self
            .handles
            .entry((token.slug(), connection.id()))
            .or_insert_with(|| connection.provider().contract(address))
            .value()
            .clone();
        Some(handle)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    fn evict_stale(&self, current: ConnectionId) {
        let previous = self.connection.swap(current.0, Ordering::AcqRel);
        if previous != current.0 {
            self.handles.retain(|(_, id), _| *id == current);
            tracing::trace!(connection_id = current.0, "Evicted contract handles of previous connection");
        }
    }
}
