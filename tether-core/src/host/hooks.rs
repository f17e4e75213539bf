//! Hooks
//!
//! A component keeps state between passes through hooks called on its
//! [`RenderCx`]. Hooks are identified by call order, so a component must call
//! the same hooks in the same order on every render.
//!
//! Anything with an observable side effect is deferred to the commit phase:
//! effects queue closures, and external store subscriptions are attached
//! after the render that first read the store.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::node::InstanceId;
use super::scheduler::{Host, HostInner};

/// Teardown returned by effects and subscriptions.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Change callback handed to [`ExternalStore::subscribe`].
pub type OnChange = Arc<dyn Fn() + Send + Sync>;

pub(crate) type Effect = Box<dyn FnOnce() + Send>;

type CleanupCell = Arc<Mutex<Option<Cleanup>>>;

/// Identity of a context slot. Each store factory allocates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Allocate a fresh context slot.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot identity used by [`RenderCx::use_external_store`].
///
/// Two snapshots are the same when a consumer would render identically
/// from either. Shared snapshots compare by pointer.
pub trait Snapshot: Clone + Send + Sync + 'static {
    /// Whether `self` and `other` are the same snapshot.
    fn is_same(&self, other: &Self) -> bool;
}

impl<T: ?Sized + Send + Sync + 'static> Snapshot for Arc<T> {
    fn is_same(&self, other: &Self) -> bool {
        Arc::ptr_eq(self, other)
    }
}

impl<T: Snapshot> Snapshot for Option<T> {
    fn is_same(&self, other: &Self) -> bool {
        match (self, other) {
            (Some(a), Some(b)) => a.is_same(b),
            (None, None) => true,
            _ => false,
        }
    }
}

macro_rules! value_snapshot {
    ($($ty:ty),*) => {
        $(impl Snapshot for $ty {
            fn is_same(&self, other: &Self) -> bool {
                self == other
            }
        })*
    };
}

value_snapshot!(bool, u32, u64, usize, i32, i64);

/// A source of state that lives outside the tree.
///
/// The host reads `get_snapshot` during render and attaches `subscribe` in
/// the commit phase. Whenever `on_change` fires, the host compares a fresh
/// snapshot with the one it last rendered and schedules the reader if they
/// differ.
pub trait ExternalStore: Send + Sync + 'static {
    /// The value handed to readers.
    type Snapshot: Snapshot;

    /// Register a change callback. The returned cleanup removes it.
    fn subscribe(&self, on_change: OnChange) -> Cleanup;

    /// The current value.
    fn get_snapshot(&self) -> Self::Snapshot;
}

/// Per-instance hook storage.
pub(crate) enum HookSlot {
    Value(Arc<dyn Any + Send + Sync>),
    Effect(EffectSlot),
    External(ExternalSlot),
}

pub(crate) struct EffectSlot {
    deps: Option<Box<dyn Any + Send + Sync>>,
    cleanup: CleanupCell,
}

pub(crate) struct ExternalSlot {
    source: Arc<dyn Any + Send + Sync>,
    rendered: Arc<dyn Any + Send + Sync>,
    cleanup: CleanupCell,
}

impl HookSlot {
    /// Teardown to run when the owning instance unmounts.
    pub(crate) fn take_cleanup(&self) -> Option<Effect> {
        let cell = match self {
            HookSlot::Value(_) => return None,
            HookSlot::Effect(slot) => &slot.cleanup,
            HookSlot::External(slot) => &slot.cleanup,
        };
        cell.lock().take()
    }
}

/// Handle that schedules one instance for re-render.
#[derive(Clone)]
pub struct ScheduleHandle {
    host: Weak<HostInner>,
    instance: InstanceId,
}

impl ScheduleHandle {
    /// Mark the instance as needing a render on the next pass.
    ///
    /// Does nothing if the host is gone or the instance has unmounted.
    pub fn schedule(&self) {
        if let Some(host) = self.host.upgrade() {
            host.schedule(self.instance);
        }
    }

    /// The instance this handle schedules.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }
}

impl std::fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("instance", &self.instance)
            .finish()
    }
}

/// Setter returned by [`RenderCx::use_state`].
pub struct StateSetter<T> {
    cell: Arc<Mutex<T>>,
    handle: ScheduleHandle,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            handle: self.handle.clone(),
        }
    }
}

impl<T> StateSetter<T> {
    /// Replace the state and schedule the owner.
    pub fn set(&self, value: T) {
        *self.cell.lock() = value;
        self.handle.schedule();
    }

    /// Compute the next state from the current one and schedule the owner.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        {
            let mut guard = self.cell.lock();
            let next = f(&*guard);
            *guard = next;
        }
        self.handle.schedule();
    }
}

impl<T> std::fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateSetter")
            .field("instance", &self.handle.instance)
            .finish()
    }
}

/// Render-time access to hooks, context and scheduling for one instance.
pub struct RenderCx<'a> {
    host: &'a Host,
    instance: InstanceId,
    name: &'static str,
    hooks: Vec<HookSlot>,
    cursor: usize,
    contexts: SmallVec<[(ContextId, Arc<dyn Any + Send + Sync>); 1]>,
    effects: Vec<Effect>,
}

pub(crate) struct RenderParts {
    pub(crate) hooks: Vec<HookSlot>,
    pub(crate) contexts: SmallVec<[(ContextId, Arc<dyn Any + Send + Sync>); 1]>,
    pub(crate) effects: Vec<Effect>,
}

impl<'a> RenderCx<'a> {
    pub(crate) fn new(
        host: &'a Host,
        instance: InstanceId,
        name: &'static str,
        hooks: Vec<HookSlot>,
    ) -> Self {
        Self {
            host,
            instance,
            name,
            hooks,
            cursor: 0,
            contexts: SmallVec::new(),
            effects: Vec::new(),
        }
    }

    pub(crate) fn into_parts(self) -> RenderParts {
        RenderParts {
            hooks: self.hooks,
            contexts: self.contexts,
            effects: self.effects,
        }
    }

    /// The instance being rendered.
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// The host driving this render.
    pub fn host(&self) -> &Host {
        self.host
    }

    /// A handle that schedules this instance from outside the render.
    pub fn schedule_handle(&self) -> ScheduleHandle {
        ScheduleHandle {
            host: self.host.downgrade(),
            instance: self.instance,
        }
    }

    fn slot(&mut self, make: impl FnOnce() -> HookSlot) -> &mut HookSlot {
        let index = self.cursor;
        self.cursor += 1;
        if index == self.hooks.len() {
            self.hooks.push(make());
        }
        &mut self.hooks[index]
    }

    fn hook_order_changed(&self, expected: &str) -> ! {
        panic!(
            "hook #{} of `{}` is not a {expected} hook; hooks must be called in the same order on every render",
            self.cursor - 1,
            self.name
        )
    }

    /// A mutable cell that survives re-renders.
    pub fn use_ref<T, F>(&mut self, init: F) -> Arc<Mutex<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> T,
    {
        let slot = self.slot(|| HookSlot::Value(Arc::new(Mutex::new(init()))));
        let cell = match slot {
            HookSlot::Value(cell) => Arc::clone(cell).downcast::<Mutex<T>>().ok(),
            _ => None,
        };
        match cell {
            Some(cell) => cell,
            None => self.hook_order_changed("ref"),
        }
    }

    /// Local state whose setter schedules this instance.
    pub fn use_state<T, F>(&mut self, init: F) -> (T, StateSetter<T>)
    where
        T: Clone + Send + 'static,
        F: FnOnce() -> T,
    {
        let cell = self.use_ref(init);
        let value = cell.lock().clone();
        let setter = StateSetter {
            cell,
            handle: self.schedule_handle(),
        };
        (value, setter)
    }

    /// Run `effect` in the commit phase after every render of this instance.
    ///
    /// The cleanup it returns runs before the next run and on unmount.
    pub fn use_effect<F>(&mut self, effect: F)
    where
        F: FnOnce() -> Option<Cleanup> + Send + 'static,
    {
        let cleanup = match self.slot(|| {
            HookSlot::Effect(EffectSlot {
                deps: None,
                cleanup: Arc::new(Mutex::new(None)),
            })
        }) {
            HookSlot::Effect(slot) => Arc::clone(&slot.cleanup),
            _ => self.hook_order_changed("effect"),
        };
        self.effects.push(run_effect(cleanup, effect));
    }

    /// Run `effect` in the commit phase when `deps` differs from the value
    /// passed on the previous render.
    pub fn use_effect_with<D, F>(&mut self, deps: D, effect: F)
    where
        D: PartialEq + Send + Sync + 'static,
        F: FnOnce() -> Option<Cleanup> + Send + 'static,
    {
        let mut fresh = false;
        let slot = self.slot(|| {
            fresh = true;
            HookSlot::Effect(EffectSlot {
                deps: None,
                cleanup: Arc::new(Mutex::new(None)),
            })
        });
        let queued = match slot {
            HookSlot::Effect(slot) => {
                let changed = fresh
                    || slot
                        .deps
                        .as_ref()
                        .and_then(|previous| previous.downcast_ref::<D>())
                        .map_or(true, |previous| *previous != deps);
                if changed {
                    slot.deps = Some(Box::new(deps));
                    Some(Arc::clone(&slot.cleanup))
                } else {
                    None
                }
            }
            _ => self.hook_order_changed("effect"),
        };
        if let Some(cleanup) = queued {
            self.effects.push(run_effect(cleanup, effect));
        }
    }

    /// Make `value` visible to descendants through [`use_context`](Self::use_context).
    pub fn provide_context<T>(&mut self, id: ContextId, value: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        let value: Arc<dyn Any + Send + Sync> = value;
        match self.contexts.iter_mut().find(|(context, _)| *context == id) {
            Some(entry) => entry.1 = value,
            None => self.contexts.push((id, value)),
        }
    }

    /// The value provided for `id` by the nearest ancestor, if any.
    pub fn use_context<T>(&self, id: ContextId) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.host
            .lookup_context(self.instance, id)
            .and_then(|value| value.downcast::<T>().ok())
    }

    /// Read an external store with tearing-safe subscribe/snapshot semantics.
    ///
    /// The snapshot is read on every render. The subscription is attached in
    /// the commit after the first render (and again whenever a different
    /// store is passed), re-checked immediately for changes that landed
    /// between render and commit, and removed on unmount.
    pub fn use_external_store<S>(&mut self, store: Arc<S>) -> S::Snapshot
    where
        S: ExternalStore,
    {
        let snapshot = store.get_snapshot();

        let mut fresh = false;
        let slot = self.slot(|| {
            fresh = true;
            HookSlot::External(ExternalSlot {
                source: Arc::clone(&store) as Arc<dyn Any + Send + Sync>,
                rendered: Arc::new(Mutex::new(snapshot.clone())),
                cleanup: Arc::new(Mutex::new(None)),
            })
        });

        let attached = match slot {
            HookSlot::External(slot) => {
                let same_source = std::ptr::eq(
                    Arc::as_ptr(&slot.source) as *const (),
                    Arc::as_ptr(&store) as *const (),
                );
                if !same_source {
                    slot.source = Arc::clone(&store) as Arc<dyn Any + Send + Sync>;
                }
                Arc::clone(&slot.rendered)
                    .downcast::<Mutex<S::Snapshot>>()
                    .ok()
                    .map(|rendered| (fresh || !same_source, rendered, Arc::clone(&slot.cleanup)))
            }
            _ => None,
        };
        let Some((resubscribe, rendered, cleanup)) = attached else {
            self.hook_order_changed("external store")
        };

        *rendered.lock() = snapshot.clone();

        if resubscribe {
            let handle = self.schedule_handle();
            self.effects.push(Box::new(move || {
                let previous = cleanup.lock().take();
                if let Some(previous) = previous {
                    previous();
                }

                let on_change: OnChange = {
                    let store = Arc::clone(&store);
                    Arc::new(move || {
                        let next = store.get_snapshot();
                        let stale = !next.is_same(&rendered.lock());
                        if stale {
                            handle.schedule();
                        }
                    })
                };
                let unsubscribe = store.subscribe(Arc::clone(&on_change));
                *cleanup.lock() = Some(unsubscribe);

                on_change();
            }));
        }

        snapshot
    }
}

fn run_effect<F>(cleanup: CleanupCell, effect: F) -> Effect
where
    F: FnOnce() -> Option<Cleanup> + Send + 'static,
{
    Box::new(move || {
        let previous = cleanup.lock().take();
        if let Some(previous) = previous {
            previous();
        }
        let next = effect();
        *cleanup.lock() = next;
    })
}
