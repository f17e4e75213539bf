//! Global Stores
//!
//! A global store has a single instance for the lifetime of its registry.
//! Creating one allocates its container and appends an executor to the
//! [`StoreRegistry`]; nothing runs until a [`StoreRoot`](super::StoreRoot)
//! mounted on that registry renders the executor.
//!
//! # Registry
//!
//! The registry is append-only. Each registration swaps in a new snapshot
//! (`Arc<Vec<_>>`) and notifies listeners, which makes it an external store
//! in its own right: a root that already rendered picks up late
//! registrations on its next pass.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::binding::{use_container, DepsFn};
use super::container::Container;
use super::executor::{producer_fn, Executor};
use super::subscriber::SubscriberSet;
use crate::error::{Error, Result};
use crate::host::{Cleanup, Element, ExternalStore, OnChange, RenderCx};

/// One registered global store.
#[derive(Clone)]
pub struct RegistryEntry {
    index: usize,
    name: Arc<str>,
    pub(crate) executor: Element,
}

impl RegistryEntry {
    /// Position in registration order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Display name of the store.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("index", &self.index)
            .field("name", &self.name)
            .finish()
    }
}

/// Append-only list of global stores, observable through [`ExternalStore`].
pub struct StoreRegistry {
    entries: RwLock<Arc<Vec<RegistryEntry>>>,
    listeners: Arc<SubscriberSet>,
}

impl StoreRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            listeners: Arc::new(SubscriberSet::default()),
        }
    }

    pub(crate) fn register(&self, name: Arc<str>, executor: Element) -> usize {
        let index = {
            let mut entries = self.entries.write();
            // O(n) per registration. Readers keep whatever snapshot they
            // already hold.
            let mut next: Vec<RegistryEntry> = entries.iter().cloned().collect();
            let index = next.len();
            next.push(RegistryEntry {
                index,
                name: Arc::clone(&name),
                executor,
            });
            *entries = Arc::new(next);
            index
        };
        tracing::debug!(store = %name, index, "registered global store");
        self.listeners.notify();
        index
    }

    /// Number of registered stores.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// The current entries, in registration order.
    pub fn entries(&self) -> Arc<Vec<RegistryEntry>> {
        Arc::clone(&*self.entries.read())
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExternalStore for StoreRegistry {
    type Snapshot = Arc<Vec<RegistryEntry>>;

    fn subscribe(&self, on_change: OnChange) -> Cleanup {
        let id = self.listeners.insert(on_change);
        let listeners = Arc::clone(&self.listeners);
        Box::new(move || {
            listeners.remove(id);
        })
    }

    fn get_snapshot(&self) -> Self::Snapshot {
        self.entries()
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("entries", &self.entries())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Handle to a store with one instance per registry.
pub struct GlobalStore<V> {
    container: Arc<Container<V>>,
    index: usize,
}

impl<V> GlobalStore<V>
where
    V: Send + Sync + 'static,
{
    /// Register `producer` with `registry`, named after its value type.
    pub fn new<F>(registry: &StoreRegistry, producer: F) -> Self
    where
        F: Fn(&mut RenderCx<'_>) -> V + Send + Sync + 'static,
    {
        Self::named(registry, std::any::type_name::<V>(), producer)
    }

    /// Register `producer` with `registry` under `name`.
    pub fn named<F>(registry: &StoreRegistry, name: impl Into<Arc<str>>, producer: F) -> Self
    where
        F: Fn(&mut RenderCx<'_>) -> V + Send + Sync + 'static,
    {
        let name = name.into();
        let container = Arc::new(Container::new(Arc::clone(&name)));
        let producer = producer_fn(move |cx: &mut RenderCx<'_>, _: &()| producer(cx));
        let executor = Element::new(Executor::new(
            producer,
            Arc::clone(&container),
            Arc::new(()),
            true,
        ));
        let index = registry.register(name, executor);
        Self { container, index }
    }

    /// Display name used in diagnostics.
    pub fn name(&self) -> &str {
        self.container.name()
    }

    /// Position in the registry.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The container the store's executor writes to.
    pub fn container(&self) -> &Arc<Container<V>> {
        &self.container
    }

    /// The latest committed value, or `None` before the root has run the
    /// producer.
    pub fn get(&self) -> Option<Arc<V>> {
        self.container.data()
    }

    /// Like [`get`](Self::get), reporting the pre-mount state as an error.
    pub fn try_get(&self) -> Result<Arc<V>> {
        self.container.data().ok_or_else(|| Error::NotMounted {
            store: self.container.name().to_string(),
        })
    }

    /// Read the value from a component, re-rendering on every change.
    pub fn use_store(&self, cx: &mut RenderCx<'_>) -> Option<Arc<V>> {
        self.check_mounted(cx);
        use_container::<V, ()>(cx, &self.container, None)
    }

    /// Read the value from a component, re-rendering only when `deps` of
    /// the value changes.
    pub fn use_store_with<D, F>(&self, cx: &mut RenderCx<'_>, deps: F) -> Option<Arc<V>>
    where
        D: PartialEq + Send + 'static,
        F: Fn(&V) -> Vec<D> + Send + Sync + 'static,
    {
        self.check_mounted(cx);
        let deps: DepsFn<V, D> = Arc::new(deps);
        use_container(cx, &self.container, Some(deps))
    }

    fn check_mounted(&self, cx: &RenderCx<'_>) {
        if !self.container.is_initialized() {
            tracing::error!(
                store = self.container.name(),
                index = self.index,
                instance = cx.instance().raw(),
                "global store read before its producer ran; mount a StoreRoot above this consumer"
            );
        }
    }
}

impl<V> Clone for GlobalStore<V> {
    fn clone(&self) -> Self {
        Self {
            container: Arc::clone(&self.container),
            index: self.index,
        }
    }
}

impl<V> fmt::Debug for GlobalStore<V>
where
    V: fmt::Debug + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalStore")
            .field("index", &self.index)
            .field("container", &self.container)
            .finish()
    }
}
