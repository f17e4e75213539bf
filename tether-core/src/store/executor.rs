//! Executor Implementation
//!
//! The executor is the component that runs a producer once per render and
//! moves the result into the producer's container.
//!
//! # Phases
//!
//! - First render: the value is written immediately and the container is
//!   marked initialized, without notifying. Siblings rendered after the
//!   executor in the same pass (the provider's content, or the root's
//!   children) can therefore read it during their own first render.
//!
//! - Every later render: the value is held until the commit phase, then
//!   published. Nothing is written or notified while the tree is still
//!   rendering.
//!
//! Producer panics are not caught. They unwind through the host like any
//! other component panic.

use std::sync::Arc;

use super::container::Container;
use crate::host::{Component, Element, RenderCx};

/// A producer: a stateful function of its arguments, re-run on each render
/// of its executor. It may call hooks on the context it receives.
pub type Producer<V, P> = Arc<dyn Fn(&mut RenderCx<'_>, &P) -> V + Send + Sync>;

pub(crate) fn producer_fn<V, P, F>(producer: F) -> Producer<V, P>
where
    F: Fn(&mut RenderCx<'_>, &P) -> V + Send + Sync + 'static,
{
    Arc::new(producer)
}

pub(crate) struct Executor<V, P> {
    producer: Producer<V, P>,
    container: Arc<Container<V>>,
    args: Arc<P>,
    memo: bool,
}

impl<V, P> Executor<V, P> {
    pub(crate) fn new(
        producer: Producer<V, P>,
        container: Arc<Container<V>>,
        args: Arc<P>,
        memo: bool,
    ) -> Self {
        Self {
            producer,
            container,
            args,
            memo,
        }
    }
}

impl<V, P> Component for Executor<V, P>
where
    V: Send + Sync + 'static,
    P: PartialEq + Send + Sync + 'static,
{
    fn render(&self, cx: &mut RenderCx<'_>) -> Vec<Element> {
        let value = Arc::new((self.producer)(cx, &self.args));
        let first = self.container.initialize(Arc::clone(&value));

        let container = Arc::clone(&self.container);
        cx.use_effect(move || {
            if !first {
                container.publish(value);
            }
            None
        });
        Vec::new()
    }

    fn name(&self) -> &'static str {
        "Executor"
    }

    fn memo_eq(&self, previous: &dyn Component) -> bool {
        self.memo
            && previous
                .as_any()
                .downcast_ref::<Self>()
                .map_or(false, |previous| {
                    Arc::ptr_eq(&previous.container, &self.container)
                        && *previous.args == *self.args
                })
    }
}
