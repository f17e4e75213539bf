//! Tree Nodes
//!
//! This module defines what lives in the render tree: elements describing
//! what a parent wants rendered, and the mounted instances that keep hook
//! state between passes.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use super::hooks::{ContextId, HookSlot, RenderCx};

/// Unique identifier for a mounted component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Generate a new unique instance ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of a child among its siblings.
///
/// Children without an explicit key are numbered in order among the other
/// unkeyed siblings, so inserting keyed children never shifts them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Implicit positional key.
    Index(usize),
    /// Explicit key.
    Name(Cow<'static, str>),
}

impl From<&'static str> for Key {
    fn from(name: &'static str) -> Self {
        Key::Name(Cow::Borrowed(name))
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Key::Name(Cow::Owned(name))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "#{index}"),
            Key::Name(name) => f.write_str(name),
        }
    }
}

#[doc(hidden)]
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A unit of UI that renders into child elements.
///
/// `render` runs during the render phase and must not perform side effects
/// other than through the hooks on [`RenderCx`].
pub trait Component: AsAny + Send + Sync {
    /// Produce this component's children.
    fn render(&self, cx: &mut RenderCx<'_>) -> Vec<Element>;

    /// Name used in traces and hook diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Return `true` when a parent re-render may skip this component because
    /// its inputs equal the `previous` element's.
    ///
    /// `previous` is always the same concrete type as `self`.
    fn memo_eq(&self, previous: &dyn Component) -> bool {
        let _ = previous;
        false
    }
}

/// Description of a child to render.
#[derive(Clone)]
pub struct Element {
    pub(crate) key: Option<Key>,
    pub(crate) component: Arc<dyn Component>,
}

impl Element {
    /// Wrap a component.
    pub fn new<C: Component>(component: C) -> Self {
        Self {
            key: None,
            component: Arc::new(component),
        }
    }

    /// Build an element from a render closure.
    pub fn from_fn<F>(render: F) -> Self
    where
        F: Fn(&mut RenderCx<'_>) -> Vec<Element> + Send + Sync + 'static,
    {
        Self::new(FnComponent { render })
    }

    /// Give the element an explicit key.
    pub fn keyed(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// The explicit key, if any.
    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Name of the wrapped component.
    pub fn name(&self) -> &'static str {
        self.component.name()
    }

    pub(crate) fn same_type(&self, other: &Element) -> bool {
        (*self.component).as_any().type_id() == (*other.component).as_any().type_id()
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("key", &self.key)
            .field("component", &self.name())
            .finish()
    }
}

/// Component backed by a closure. Closures never bail out on parent renders.
struct FnComponent<F> {
    render: F,
}

impl<F> Component for FnComponent<F>
where
    F: Fn(&mut RenderCx<'_>) -> Vec<Element> + Send + Sync + 'static,
{
    fn render(&self, cx: &mut RenderCx<'_>) -> Vec<Element> {
        (self.render)(cx)
    }

    fn name(&self) -> &'static str {
        "fn"
    }
}

/// A mounted component instance.
pub(crate) struct Instance {
    pub(crate) parent: Option<InstanceId>,
    pub(crate) element: Element,
    pub(crate) hooks: Vec<HookSlot>,
    pub(crate) children: SmallVec<[(Key, InstanceId); 4]>,
    pub(crate) contexts: SmallVec<[(ContextId, Arc<dyn Any + Send + Sync>); 1]>,
    pub(crate) needs_render: bool,
    pub(crate) render_count: usize,
}

impl Instance {
    pub(crate) fn new(parent: Option<InstanceId>, element: Element) -> Self {
        Self {
            parent,
            element,
            hooks: Vec::new(),
            children: SmallVec::new(),
            contexts: SmallVec::new(),
            needs_render: true,
            render_count: 0,
        }
    }

    pub(crate) fn context(&self, id: ContextId) -> Option<&Arc<dyn Any + Send + Sync>> {
        self.contexts
            .iter()
            .find(|(context, _)| *context == id)
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Leaf(u32);

    impl Component for Leaf {
        fn render(&self, _cx: &mut RenderCx<'_>) -> Vec<Element> {
            Vec::new()
        }

        fn memo_eq(&self, previous: &dyn Component) -> bool {
            previous
                .as_any()
                .downcast_ref::<Leaf>()
                .map_or(false, |previous| previous.0 == self.0)
        }
    }

    #[test]
    fn instance_ids_are_unique() {
        assert_ne!(InstanceId::new(), InstanceId::new());
    }

    #[test]
    fn element_type_identity() {
        let a = Element::new(Leaf(1));
        let b = Element::new(Leaf(2));
        let c = Element::from_fn(|_| Vec::new());

        assert!(a.same_type(&b));
        assert!(!a.same_type(&c));
        assert!(a.component.memo_eq(&*Element::new(Leaf(1)).component));
        assert!(!a.component.memo_eq(&*b.component));
    }

    #[test]
    fn keys_from_strings() {
        let element = Element::new(Leaf(0)).keyed("content");
        assert_eq!(element.key(), Some(&Key::Name(Cow::Borrowed("content"))));
        assert_eq!(Key::from(format!("store-{}", 3)).to_string(), "store-3");
        assert_eq!(Key::Index(2).to_string(), "#2");
    }
}
