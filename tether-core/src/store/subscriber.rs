//! Subscriber types for containers and the global registry.
//!
//! A subscriber is a change callback registered by a consumer binding or by
//! the root aggregator. Callbacks take no argument: they pull the current
//! value themselves when they run.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// A change callback.
pub type Callback = Arc<dyn Fn() + Send + Sync>;

/// Set of callbacks that tolerates mutation while it is being notified.
///
/// `notify` snapshots the set before calling anything, calls each entry
/// that is still registered at the moment its turn comes, and never calls
/// entries added during the loop. The lock is never held across a callback.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    entries: Mutex<IndexMap<SubscriberId, Callback>>,
}

impl SubscriberSet {
    pub(crate) fn insert(&self, callback: Callback) -> SubscriberId {
        let id = SubscriberId::new();
        self.entries.lock().insert(id, callback);
        id
    }

    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        self.entries.lock().shift_remove(&id).is_some()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Call every registered callback. Returns how many ran.
    pub(crate) fn notify(&self) -> usize {
        let snapshot: SmallVec<[(SubscriberId, Callback); 8]> = self
            .entries
            .lock()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        let mut called = 0;
        for (id, callback) in snapshot {
            let live = self.entries.lock().contains_key(&id);
            if live {
                callback();
                called += 1;
            }
        }
        called
    }
}
