//! Observable state container.
//!
//! Values are replaced wholesale and read lock-free through [`arc_swap`].
//! Subscribers are woken through a version counter on a `watch` channel and
//! read the latest value themselves, so intermediate values may be skipped.

use arc_swap::ArcSwap;
use std::sync::Arc;
use tokio::sync::watch;

struct StoreInner<T> {
    current: ArcSwap<T>,
    version: watch::Sender<u64>,
}

/// Shared, observable value. Cloning yields another handle to the same value.
pub struct Store<T> {
    inner: Arc<StoreInner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Store<T> {
    pub fn new(value: T) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(StoreInner {
                current: ArcSwap::from_pointee(value),
                version,
            }),
        }
    }

    /// Current value.
    pub fn get(&self) -> Arc<T> {
        self.inner.current.load_full()
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.inner.current.store(Arc::new(value));
        self.bump();
    }

    /// Atomically derive the next value from the current one.
    ///
    /// `f` may run more than once under contention and must be pure.
    pub fn update<F>(&self, mut f: F)
    where
        F: FnMut(&T) -> T,
    {
        self.inner.current.rcu(|current| Arc::new(f(current)));
        self.bump();
    }

    /// Number of changes published so far.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    /// Observe future changes.
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            inner: self.inner.clone(),
            changes: self.inner.version.subscribe(),
        }
    }

    fn bump(&self) {
        self.inner.version.send_modify(|v| *v += 1);
    }
}

impl<T: Default> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Receiver side of a [`Store`].
pub struct Subscription<T> {
    inner: Arc<StoreInner<T>>,
    changes: watch::Receiver<u64>,
}

impl<T> Subscription<T> {
    /// Wait until the value changes after the last observed version.
    pub async fn changed(&mut self) {
        // The sender lives as long as `inner`, which this subscription keeps alive.
        let _ = self.changes.changed().await;
    }

    /// Latest value, marking the current version as seen.
    pub fn get(&mut self) -> Arc<T> {
        self.changes.borrow_and_update();
        self.inner.current.load_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_get_set() {
        let store = Store::new(1u32);
        assert_eq!(*store.get(), 1);
        store.set(2);
        assert_eq!(*store.get(), 2);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn test_update() {
        let store = Store::new(vec![1u32]);
        store.update(|v| {
            let mut next = v.clone();
            next.push(2);
            next
        });
        assert_eq!(*store.get(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_subscription_wakes_on_change() {
        let store = Store::new(0u32);
        let mut sub = store.subscribe();

        let writer = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            writer.set(5);
        });

        tokio::time::timeout(Duration::from_secs(1), sub.changed())
            .await
            .expect("subscriber was not notified");
        assert_eq!(*sub.get(), 5);
    }
}
