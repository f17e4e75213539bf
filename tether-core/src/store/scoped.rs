//! Scoped Stores
//!
//! A scoped store binds a producer to a subtree. Every mount of its provider
//! owns a private container and executor, so two providers from the same
//! store never share state.
//!
//! # Provider layout
//!
//! ```text
//! Provider            provides the container through the store's context
//! ├── Executor        key "executor": runs the producer
//! └── Gate            key "content": renders the children once initialized
//!     └── children...
//! ```
//!
//! The executor renders before the gate in every pass, so the gate normally
//! finds the container initialized on its first render. If it does not, it
//! renders nothing and waits to be woken by the container.

use std::fmt;
use std::sync::Arc;

use super::binding::{use_container, DepsFn};
use super::container::Container;
use super::executor::{Executor, Producer};
use crate::config::StoreOptions;
use crate::error::{Error, Result};
use crate::host::{Component, ContextId, Element, RenderCx};

/// A producer that is mounted once per provider.
///
/// `P` is the argument type the provider passes to the producer on every
/// render. Stores created with [`ScopedStore::new`] take no arguments.
pub struct ScopedStore<V, P = ()> {
    inner: Arc<ScopedInner<V, P>>,
}

struct ScopedInner<V, P> {
    name: Arc<str>,
    context: ContextId,
    producer: Producer<V, P>,
    memo: bool,
    /// Never initialized. Resolved by readers outside any provider.
    fallback: Arc<Container<V>>,
}

impl<V> ScopedStore<V, ()>
where
    V: Send + Sync + 'static,
{
    /// Create a store from a producer that takes no arguments.
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(&mut RenderCx<'_>) -> V + Send + Sync + 'static,
    {
        Self::with_options(producer, StoreOptions::default())
    }

    /// Like [`new`](Self::new), with explicit options.
    pub fn with_options<F>(producer: F, options: StoreOptions) -> Self
    where
        F: Fn(&mut RenderCx<'_>) -> V + Send + Sync + 'static,
    {
        Self::with_args_and_options(move |cx: &mut RenderCx<'_>, _: &()| producer(cx), options)
    }
}

impl<V, P> ScopedStore<V, P>
where
    V: Send + Sync + 'static,
    P: PartialEq + Send + Sync + 'static,
{
    /// Create a store whose producer receives the provider's arguments.
    pub fn with_args<F>(producer: F) -> Self
    where
        F: Fn(&mut RenderCx<'_>, &P) -> V + Send + Sync + 'static,
    {
        Self::with_args_and_options(producer, StoreOptions::default())
    }

    /// Like [`with_args`](Self::with_args), with explicit options.
    pub fn with_args_and_options<F>(producer: F, options: StoreOptions) -> Self
    where
        F: Fn(&mut RenderCx<'_>, &P) -> V + Send + Sync + 'static,
    {
        let name: Arc<str> = match options.name {
            Some(name) => name.into(),
            None => std::any::type_name::<V>().into(),
        };
        Self {
            inner: Arc::new(ScopedInner {
                fallback: Arc::new(Container::new(Arc::clone(&name))),
                name,
                context: ContextId::new(),
                producer: Arc::new(producer),
                memo: options.memo,
            }),
        }
    }

    /// Display name used in diagnostics.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// A provider element running the producer with `args` and rendering
    /// `children` below it.
    pub fn provider(&self, args: P, children: Vec<Element>) -> Element {
        Element::new(Provider {
            store: Arc::clone(&self.inner),
            args: Arc::new(args),
            children,
        })
    }

    /// Read the nearest provider's value.
    ///
    /// Outside any provider this logs an error and returns `None`.
    pub fn use_store(&self, cx: &mut RenderCx<'_>) -> Option<Arc<V>> {
        let container = self.resolve(cx);
        use_container::<V, ()>(cx, &container, None)
    }

    /// Read the nearest provider's value, re-rendering only when `deps`
    /// of the value changes.
    pub fn use_store_with<D, F>(&self, cx: &mut RenderCx<'_>, deps: F) -> Option<Arc<V>>
    where
        D: PartialEq + Send + 'static,
        F: Fn(&V) -> Vec<D> + Send + Sync + 'static,
    {
        let container = self.resolve(cx);
        let deps: DepsFn<V, D> = Arc::new(deps);
        use_container(cx, &container, Some(deps))
    }

    /// Read the nearest provider's value, reporting a missing provider as
    /// an error instead of logging it.
    pub fn try_use_store(&self, cx: &mut RenderCx<'_>) -> Result<Arc<V>> {
        let provided = cx.use_context::<Container<V>>(self.inner.context);
        let container = provided
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.inner.fallback));
        let value = use_container::<V, ()>(cx, &container, None);
        match (provided, value) {
            (None, _) => Err(Error::MissingProvider {
                store: self.inner.name.to_string(),
            }),
            (Some(_), None) => Err(Error::Uninitialized {
                store: self.inner.name.to_string(),
            }),
            (Some(_), Some(value)) => Ok(value),
        }
    }

    fn resolve(&self, cx: &RenderCx<'_>) -> Arc<Container<V>> {
        match cx.use_context::<Container<V>>(self.inner.context) {
            Some(container) => container,
            None => {
                tracing::error!(
                    store = %self.inner.name,
                    instance = cx.instance().raw(),
                    "store read outside its provider"
                );
                Arc::clone(&self.inner.fallback)
            }
        }
    }
}

impl<V, P> Clone for ScopedStore<V, P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V, P> fmt::Debug for ScopedStore<V, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedStore")
            .field("name", &self.inner.name)
            .field("memo", &self.inner.memo)
            .finish()
    }
}

struct Provider<V, P> {
    store: Arc<ScopedInner<V, P>>,
    args: Arc<P>,
    children: Vec<Element>,
}

impl<V, P> Component for Provider<V, P>
where
    V: Send + Sync + 'static,
    P: PartialEq + Send + Sync + 'static,
{
    fn render(&self, cx: &mut RenderCx<'_>) -> Vec<Element> {
        let name = Arc::clone(&self.store.name);
        let slot = cx.use_ref(move || Arc::new(Container::<V>::new(name)));
        let container = Arc::clone(&*slot.lock());
        cx.provide_context(self.store.context, Arc::clone(&container));

        let executor = Executor::new(
            Arc::clone(&self.store.producer),
            Arc::clone(&container),
            Arc::clone(&self.args),
            self.store.memo,
        );
        vec![
            Element::new(executor).keyed("executor"),
            Element::new(Gate {
                container,
                children: self.children.clone(),
            })
            .keyed("content"),
        ]
    }

    fn name(&self) -> &'static str {
        "Provider"
    }
}

/// Holds back a provider's children until its container has a value.
struct Gate<V> {
    container: Arc<Container<V>>,
    children: Vec<Element>,
}

impl<V> Component for Gate<V>
where
    V: Send + Sync + 'static,
{
    fn render(&self, cx: &mut RenderCx<'_>) -> Vec<Element> {
        let waiting = cx.use_ref(|| false);
        if self.container.is_initialized() {
            return self.children.clone();
        }

        let mut waiting = waiting.lock();
        if !*waiting {
            *waiting = true;
            tracing::trace!(store = self.container.name(), "holding children until initialized");
            let handle = cx.schedule_handle();
            self.container
                .when_initialized(Box::new(move || handle.schedule()));
        }
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "Gate"
    }
}
