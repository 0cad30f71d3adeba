//! Single-flight guard for side-effecting wallet requests.
//!
//! While a guarded call is pending, further calls join it and receive the same
//! result instead of opening a second wallet prompt. Once the call settles the
//! next caller starts a fresh one.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::wallet::error::WalletResult;

type SharedCall<T> = Shared<BoxFuture<'static, WalletResult<T>>>;

struct Pending<T: Clone> {
    id: u64,
    call: SharedCall<T>,
}

struct Slot<T: Clone> {
    pending: Option<Pending<T>>,
    next_id: u64,
}

/// Collapses overlapping invocations into one in-flight future.
pub struct ConcurrencyGuard<T: Clone> {
    slot: Mutex<Slot<T>>,
}

/// Outcome of a guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guarded<T> {
    /// Result of the underlying call.
    pub value: T,
    /// True when this caller joined a call started by someone else.
    pub joined: bool,
}

impl<T> ConcurrencyGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                pending: None,
                next_id: 0,
            }),
        }
    }

    /// Run `f` unless a call is already in flight, in which case join it.
    ///
    /// `f` is only invoked when this caller starts the call. Failures are
    /// delivered to every caller that joined.
    pub async fn run<F, Fut>(&self, f: F) -> WalletResult<Guarded<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = WalletResult<T>> + Send + 'static,
    {
        let (id, call, joined) = {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match &slot.pending {
                // A settled call whose owner never cleared the slot must not be reused.
                Some(pending) if pending.call.peek().is_none() => {
                    (pending.id, pending.call.clone(), true)
                }
                _ => {
                    slot.next_id += 1;
                    let id = slot.next_id;
                    let call = f().boxed().shared();
                    slot.pending = Some(Pending {
                        id,
                        call: call.clone(),
                    });
                    (id, call, false)
                }
            }
        };

        if joined {
            tracing::debug!(call_id = id, "Joining in-flight wallet request");
        }

        let result = call.await;

        {
            let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.pending.as_ref().is_some_and(|p| p.id == id) {
                slot.pending = None;
            }
        }

        result.map(|value| Guarded { value, joined })
    }

    /// Whether a call is currently in flight.
    pub fn is_pending(&self) -> bool {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.pending
            .as_ref()
            .is_some_and(|p| p.call.peek().is_none())
    }
}

impl<T> Default for ConcurrencyGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
