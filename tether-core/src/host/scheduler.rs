//! Render Scheduler
//!
//! The scheduler owns the instance tree and drives render passes.
//!
//! # Algorithm
//!
//! A pass has two phases:
//!
//! 1. Render: walk the tree depth-first in child order. An instance renders
//!    when it was scheduled (its state or an external store it reads
//!    changed) or when its parent rendered and its new element does not
//!    bail out through [`Component::memo_eq`](super::Component::memo_eq).
//!    The children it returns are reconciled against the mounted ones by
//!    key and component type: matches are updated in place, the rest are
//!    unmounted, and new elements are mounted and rendered in the same walk.
//!
//! 2. Commit: run the cleanups of unmounted instances, then every effect
//!    queued during the render phase, in render order.
//!
//! Effects may schedule more work. [`Host::flush`] keeps running passes
//! until nothing is scheduled, up to [`HostConfig::max_passes`].

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::map::Entry;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smallvec::SmallVec;

use super::hooks::{ContextId, Effect, RenderCx};
use super::node::{Element, Instance, InstanceId, Key};
use super::phase::PhaseGuard;
use crate::config::HostConfig;
use crate::error::{Error, Result};

/// Handle to a render host. Clones share the same tree.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

pub(crate) struct HostInner {
    config: HostConfig,
    tree: Mutex<Tree>,
    passes: AtomicU64,
}

#[derive(Default)]
struct Tree {
    instances: IndexMap<InstanceId, Instance>,
    root: Option<InstanceId>,
}

/// Work collected during the render phase of one pass.
#[derive(Default)]
struct CommitQueue {
    cleanups: Vec<Effect>,
    effects: Vec<Effect>,
}

impl Host {
    /// Create a host with the given configuration.
    pub fn new(config: HostConfig) -> Self {
        Self {
            inner: Arc::new(HostInner {
                config,
                tree: Mutex::new(Tree::default()),
                passes: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<HostInner> {
        Arc::downgrade(&self.inner)
    }

    /// The host configuration.
    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    /// Mount `element` as the root and flush until the tree settles.
    pub fn mount(&self, element: Element) -> Result<InstanceId> {
        let id = {
            let mut tree = self.inner.tree.lock();
            if tree.root.is_some() {
                return Err(Error::AlreadyMounted);
            }
            let id = tree.insert(None, element);
            tree.root = Some(id);
            id
        };
        tracing::debug!(root = id.raw(), "mounting root");
        self.flush()?;
        Ok(id)
    }

    /// Unmount the whole tree, running every cleanup.
    pub fn unmount(&self) {
        let mut queue = CommitQueue::default();
        {
            let mut tree = self.inner.tree.lock();
            if let Some(root) = tree.root.take() {
                tree.unmount(root, &mut queue);
            }
        }
        self.commit(queue);
    }

    /// Run passes until no instance is scheduled.
    ///
    /// Returns the number of passes run.
    pub fn flush(&self) -> Result<usize> {
        let limit = self.inner.config.max_passes;
        let mut passes = 0;
        while self.has_pending_work() {
            if passes == limit {
                tracing::warn!(limit, "render did not settle");
                return Err(Error::PassLimitExceeded { limit });
            }
            self.render_pass();
            passes += 1;
        }
        Ok(passes)
    }

    /// Run exactly one render phase followed by one commit phase.
    ///
    /// Returns `false` if nothing was scheduled.
    pub fn render_pass(&self) -> bool {
        if !self.has_pending_work() {
            return false;
        }
        let pass = self.inner.passes.fetch_add(1, Ordering::Relaxed);
        let span = tracing::debug_span!("render_pass", pass);
        let _entered = span.enter();

        let mut queue = CommitQueue::default();
        let root = self.inner.tree.lock().root;
        if let Some(root) = root {
            self.visit(root, &mut queue);
        }
        self.commit(queue);
        true
    }

    /// Whether any mounted instance is waiting to render.
    pub fn has_pending_work(&self) -> bool {
        self.inner
            .tree
            .lock()
            .instances
            .values()
            .any(|instance| instance.needs_render)
    }

    /// Total passes run by this host.
    pub fn pass_count(&self) -> u64 {
        self.inner.passes.load(Ordering::Relaxed)
    }

    /// Number of mounted instances.
    pub fn instance_count(&self) -> usize {
        self.inner.tree.lock().instances.len()
    }

    /// Whether `id` is still mounted.
    pub fn is_mounted(&self, id: InstanceId) -> bool {
        self.inner.tree.lock().instances.contains_key(&id)
    }

    /// How many times `id` has rendered, if mounted.
    pub fn render_count(&self, id: InstanceId) -> Option<usize> {
        self.inner
            .tree
            .lock()
            .instances
            .get(&id)
            .map(|instance| instance.render_count)
    }

    /// Schedule `id` for the next pass.
    pub fn schedule(&self, id: InstanceId) {
        self.inner.schedule(id);
    }

    pub(crate) fn lookup_context(
        &self,
        from: InstanceId,
        id: ContextId,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        let tree = self.inner.tree.lock();
        let mut cursor = tree.instances.get(&from).and_then(|instance| instance.parent);
        while let Some(ancestor) = cursor {
            let instance = tree.instances.get(&ancestor)?;
            if let Some(value) = instance.context(id) {
                return Some(Arc::clone(value));
            }
            cursor = instance.parent;
        }
        None
    }

    fn visit(&self, id: InstanceId, queue: &mut CommitQueue) {
        let needs_render = match self.inner.tree.lock().instances.get(&id) {
            Some(instance) => instance.needs_render,
            None => return,
        };
        if needs_render {
            self.render_instance(id, queue);
        }

        let children: SmallVec<[InstanceId; 8]> = match self.inner.tree.lock().instances.get(&id) {
            Some(instance) => instance.children.iter().map(|(_, child)| *child).collect(),
            None => return,
        };
        for child in children {
            self.visit(child, queue);
        }
    }

    fn render_instance(&self, id: InstanceId, queue: &mut CommitQueue) {
        let (component, hooks) = {
            let mut tree = self.inner.tree.lock();
            let Some(instance) = tree.instances.get_mut(&id) else {
                return;
            };
            instance.needs_render = false;
            (
                Arc::clone(&instance.element.component),
                std::mem::take(&mut instance.hooks),
            )
        };

        tracing::trace!(instance = id.raw(), component = component.name(), "render");
        let mut cx = RenderCx::new(self, id, component.name(), hooks);
        let children = {
            let _phase = PhaseGuard::render(id);
            component.render(&mut cx)
        };
        let parts = cx.into_parts();

        let mut tree = self.inner.tree.lock();
        let Some(instance) = tree.instances.get_mut(&id) else {
            return;
        };
        instance.hooks = parts.hooks;
        instance.contexts = parts.contexts;
        instance.render_count += 1;
        queue.effects.extend(parts.effects);
        tree.reconcile(id, children, queue);
    }

    fn commit(&self, queue: CommitQueue) {
        let _phase = PhaseGuard::commit();
        for cleanup in queue.cleanups {
            cleanup();
        }
        for effect in queue.effects {
            effect();
        }
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("instances", &self.instance_count())
            .field("passes", &self.pass_count())
            .finish()
    }
}

impl HostInner {
    pub(crate) fn schedule(&self, id: InstanceId) {
        match self.tree.lock().instances.get_mut(&id) {
            Some(instance) => instance.needs_render = true,
            None => tracing::trace!(instance = id.raw(), "ignoring schedule of unmounted instance"),
        }
    }
}

impl Tree {
    fn insert(&mut self, parent: Option<InstanceId>, element: Element) -> InstanceId {
        let id = InstanceId::new();
        self.instances.insert(id, Instance::new(parent, element));
        id
    }

    fn reconcile(&mut self, parent: InstanceId, elements: Vec<Element>, queue: &mut CommitQueue) {
        let children = match self.instances.get_mut(&parent) {
            Some(instance) => std::mem::take(&mut instance.children),
            None => return,
        };
        let mut previous: IndexMap<Key, InstanceId> = IndexMap::with_capacity(children.len());
        for (key, child) in children {
            // Only the first child under a duplicated key can be matched.
            match previous.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(child);
                }
                Entry::Occupied(_) => self.unmount(child, queue),
            }
        }
        let mut next: SmallVec<[(Key, InstanceId); 4]> = SmallVec::with_capacity(elements.len());
        let mut implicit = 0;

        for element in elements {
            let key = match element.key.clone() {
                Some(key) => key,
                None => {
                    implicit += 1;
                    Key::Index(implicit - 1)
                }
            };
            if next.iter().any(|(existing, _)| *existing == key) {
                tracing::warn!(key = %key, component = element.name(), "duplicate child key");
            }

            let matched = previous.shift_remove(&key);
            let reused = matched.filter(|child| {
                self.instances
                    .get(child)
                    .map_or(false, |instance| instance.element.same_type(&element))
            });

            let child = match reused {
                Some(child) => {
                    if let Some(instance) = self.instances.get_mut(&child) {
                        let bail_out = !instance.needs_render
                            && element.component.memo_eq(&*instance.element.component);
                        if !bail_out {
                            instance.needs_render = true;
                        }
                        instance.element = element;
                    }
                    child
                }
                None => {
                    if let Some(stale) = matched {
                        self.unmount(stale, queue);
                    }
                    self.insert(Some(parent), element)
                }
            };
            next.push((key, child));
        }

        for (_, stale) in previous {
            self.unmount(stale, queue);
        }
        if let Some(instance) = self.instances.get_mut(&parent) {
            instance.children = next;
        }
    }

    fn unmount(&mut self, id: InstanceId, queue: &mut CommitQueue) {
        let Some(instance) = self.instances.shift_remove(&id) else {
            return;
        };
        tracing::trace!(instance = id.raw(), component = instance.element.name(), "unmount");
        queue
            .cleanups
            .extend(instance.hooks.iter().filter_map(|slot| slot.take_cleanup()));
        for (_, child) in instance.children {
            self.unmount(child, queue);
        }
    }
}
