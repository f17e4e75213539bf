//! Consumer Binding
//!
//! The read side shared by scoped and global stores. A binding adapts a
//! [`Container`] to the host's [`ExternalStore`] protocol and filters
//! notifications through an optional projection.
//!
//! # Filtering
//!
//! Without a projection every notification surfaces the new value. With
//! one, the binding recomputes `deps(value)` on each notification and
//! surfaces the value only when [`deps_changed`] says the projection moved.
//! The snapshot handed to the host is the last surfaced value, so a
//! consumer re-rendered for an unrelated reason keeps seeing it.

use std::sync::Arc;

use parking_lot::Mutex;

use super::container::Container;
use crate::host::{Cleanup, ExternalStore, OnChange, RenderCx};

/// Projection from a value to the sequence that decides whether a consumer
/// cares about a change.
pub type DepsFn<V, D> = Arc<dyn Fn(&V) -> Vec<D> + Send + Sync>;

/// Whether two dependency sequences differ.
///
/// They are equal only when they have the same length and every positional
/// pair of elements is equal.
pub fn deps_changed<D: PartialEq>(previous: &[D], next: &[D]) -> bool {
    if previous.len() != next.len() {
        return true;
    }
    previous.iter().zip(next).any(|(a, b)| a != b)
}

struct BindingState<V, D> {
    deps: Vec<D>,
    surfaced: Option<Arc<V>>,
}

/// One consumer's view of one container.
pub(crate) struct Binding<V, D> {
    container: Arc<Container<V>>,
    deps_fn: Arc<Mutex<Option<DepsFn<V, D>>>>,
    state: Arc<Mutex<BindingState<V, D>>>,
}

impl<V, D> Binding<V, D>
where
    V: Send + Sync + 'static,
    D: PartialEq + Send + 'static,
{
    pub(crate) fn new(container: Arc<Container<V>>, deps_fn: Option<DepsFn<V, D>>) -> Self {
        let surfaced = container.data();
        let deps = match (&deps_fn, &surfaced) {
            (Some(deps_fn), Some(value)) => deps_fn(value.as_ref()),
            _ => Vec::new(),
        };
        Self {
            container,
            deps_fn: Arc::new(Mutex::new(deps_fn)),
            state: Arc::new(Mutex::new(BindingState { deps, surfaced })),
        }
    }

    pub(crate) fn container(&self) -> &Arc<Container<V>> {
        &self.container
    }

    /// Swap in the projection passed on the latest render.
    pub(crate) fn set_deps_fn(&self, deps_fn: Option<DepsFn<V, D>>) {
        *self.deps_fn.lock() = deps_fn;
    }

    fn on_notify(
        container: &Container<V>,
        deps_fn: &Mutex<Option<DepsFn<V, D>>>,
        state: &Mutex<BindingState<V, D>>,
    ) -> bool {
        let current = container.data();
        let deps_fn = deps_fn.lock().clone();
        let mut state = state.lock();
        match (deps_fn, &current) {
            (Some(deps_fn), Some(value)) => {
                let next = deps_fn(value.as_ref());
                let changed = deps_changed(&state.deps, &next);
                state.deps = next;
                if changed {
                    state.surfaced = current;
                }
                changed
            }
            _ => {
                state.surfaced = current;
                true
            }
        }
    }

    /// Surface a value committed between this consumer's render and its
    /// subscription, regardless of the projection.
    fn catch_up(
        container: &Container<V>,
        deps_fn: &Mutex<Option<DepsFn<V, D>>>,
        state: &Mutex<BindingState<V, D>>,
    ) {
        let current = container.data();
        let deps_fn = deps_fn.lock().clone();
        let mut state = state.lock();
        let stale = match (&state.surfaced, &current) {
            (Some(surfaced), Some(current)) => !Arc::ptr_eq(surfaced, current),
            (None, None) => false,
            _ => true,
        };
        if stale {
            if let (Some(deps_fn), Some(value)) = (deps_fn, &current) {
                state.deps = deps_fn(value.as_ref());
            }
            state.surfaced = current;
        }
    }
}

impl<V, D> ExternalStore for Binding<V, D>
where
    V: Send + Sync + 'static,
    D: PartialEq + Send + 'static,
{
    type Snapshot = Option<Arc<V>>;

    fn subscribe(&self, on_change: OnChange) -> Cleanup {
        let callback = {
            let container = Arc::downgrade(&self.container);
            let deps_fn = Arc::clone(&self.deps_fn);
            let state = Arc::clone(&self.state);
            let on_change = Arc::clone(&on_change);
            Arc::new(move || {
                let Some(container) = container.upgrade() else {
                    return;
                };
                if Self::on_notify(&container, &deps_fn, &state) {
                    on_change();
                }
            })
        };
        let id = self.container.subscribe_callback(callback);
        Self::catch_up(&self.container, &self.deps_fn, &self.state);

        // The first write never notifies, so a consumer subscribed before it
        // waits for it separately.
        let waiter = if self.container.is_initialized() {
            None
        } else {
            let container = Arc::downgrade(&self.container);
            let deps_fn = Arc::clone(&self.deps_fn);
            let state = Arc::clone(&self.state);
            self.container.when_initialized(Box::new(move || {
                let Some(container) = container.upgrade() else {
                    return;
                };
                Self::catch_up(&container, &deps_fn, &state);
                on_change();
            }))
        };

        let container = Arc::clone(&self.container);
        Box::new(move || {
            container.unsubscribe(id);
            if let Some(waiter) = waiter {
                container.cancel_waiter(waiter);
            }
        })
    }

    fn get_snapshot(&self) -> Option<Arc<V>> {
        self.state.lock().surfaced.clone()
    }
}

/// Read `container` from a component, re-rendering it when the value (or
/// its projection, if `deps_fn` is given) changes.
pub(crate) fn use_container<V, D>(
    cx: &mut RenderCx<'_>,
    container: &Arc<Container<V>>,
    deps_fn: Option<DepsFn<V, D>>,
) -> Option<Arc<V>>
where
    V: Send + Sync + 'static,
    D: PartialEq + Send + 'static,
{
    let slot = cx.use_ref(|| None::<Arc<Binding<V, D>>>);
    let existing = slot
        .lock()
        .as_ref()
        .filter(|binding| Arc::ptr_eq(binding.container(), container))
        .cloned();
    let binding = match existing {
        Some(binding) => {
            binding.set_deps_fn(deps_fn);
            binding
        }
        None => {
            let binding = Arc::new(Binding::new(Arc::clone(container), deps_fn));
            *slot.lock() = Some(Arc::clone(&binding));
            binding
        }
    };
    cx.use_external_store(binding)
}
