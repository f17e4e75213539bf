//! Container Implementation
//!
//! A container holds the latest value committed by one producer instance
//! together with the callbacks of every consumer reading it.
//!
//! # Lifecycle
//!
//! 1. A container starts uninitialized: [`Container::data`] is `None`.
//!
//! 2. The executor's first run initializes it without notifying anyone,
//!    because every consumer that could exist at that point reads the
//!    value during its own first render.
//!
//! 3. Every later run publishes during the commit phase: the value is
//!    overwritten and then subscribers are notified, once per write.
//!
//! Only the owning executor writes. Consumers subscribe and read.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use super::subscriber::{Callback, SubscriberId, SubscriberSet};
use crate::host::PhaseGuard;

type Waiter = Box<dyn FnOnce() + Send>;

/// Latest committed value of one producer plus its subscribers.
pub struct Container<V> {
    name: Arc<str>,
    data: RwLock<Option<Arc<V>>>,
    subscribers: SubscriberSet,
    waiters: Mutex<IndexMap<SubscriberId, Waiter>>,
    notifications: AtomicUsize,
}

impl<V> Container<V>
where
    V: Send + Sync + 'static,
{
    /// Create an uninitialized container.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(None),
            subscribers: SubscriberSet::default(),
            waiters: Mutex::new(IndexMap::new()),
            notifications: AtomicUsize::new(0),
        }
    }

    /// Display name of the owning store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The latest committed value, or `None` before the first one.
    pub fn data(&self) -> Option<Arc<V>> {
        self.data.read().clone()
    }

    /// Whether a value has ever been committed.
    pub fn is_initialized(&self) -> bool {
        self.data.read().is_some()
    }

    /// Register a change callback.
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribers.insert(Arc::new(callback))
    }

    pub(crate) fn subscribe_callback(&self, callback: Callback) -> SubscriberId {
        self.subscribers.insert(callback)
    }

    /// Remove a callback. Safe to call from inside a notification.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.remove(id)
    }

    /// Number of registered callbacks.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of notifications sent so far.
    pub fn notify_count(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }

    /// Run `waiter` once the container holds a value. Runs immediately if
    /// it already does.
    ///
    /// Returns an id for [`cancel_waiter`](Self::cancel_waiter) while the
    /// waiter is pending, `None` if it already ran.
    pub(crate) fn when_initialized(&self, waiter: Waiter) -> Option<SubscriberId> {
        {
            let mut waiters = self.waiters.lock();
            if !self.is_initialized() {
                let id = SubscriberId::new();
                waiters.insert(id, waiter);
                return Some(id);
            }
        }
        waiter();
        None
    }

    /// Drop a pending waiter without running it.
    pub(crate) fn cancel_waiter(&self, id: SubscriberId) -> bool {
        self.waiters.lock().shift_remove(&id).is_some()
    }

    /// Store the first value without notifying.
    ///
    /// Returns `false` and leaves the container untouched if it already
    /// holds a value.
    pub(crate) fn initialize(&self, value: Arc<V>) -> bool {
        {
            let mut data = self.data.write();
            if data.is_some() {
                return false;
            }
            *data = Some(value);
        }
        tracing::trace!(store = %self.name, "initialized");
        let waiters = std::mem::take(&mut *self.waiters.lock());
        for (_, waiter) in waiters {
            waiter();
        }
        true
    }

    /// Overwrite the value, then notify every subscriber.
    pub(crate) fn publish(&self, value: Arc<V>) {
        *self.data.write() = Some(value);
        self.notify();
    }

    /// Call every subscriber registered at call time that is still
    /// registered when its turn comes.
    pub(crate) fn notify(&self) {
        if PhaseGuard::is_rendering() {
            tracing::warn!(store = %self.name, "notify called during render");
            debug_assert!(false, "container `{}` notified during render", self.name);
        }
        self.notifications.fetch_add(1, Ordering::SeqCst);
        let called = self.subscribers.notify();
        tracing::trace!(store = %self.name, subscribers = called, "notified");
    }
}

impl<V> fmt::Debug for Container<V>
where
    V: fmt::Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("name", &self.name)
            .field("data", &self.data())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
