//! Root aggregator for global stores.

use std::sync::Arc;

use super::global::StoreRegistry;
use crate::host::{Component, Element, RenderCx};

/// Mounts one executor per registered global store, then its children.
///
/// Mount exactly one root per registry, above every consumer of its stores.
/// Executors are keyed `store-{index}` and bail out of root re-renders, so
/// late registrations add executors without restarting existing ones.
pub struct StoreRoot {
    registry: Arc<StoreRegistry>,
    children: Vec<Element>,
}

impl StoreRoot {
    /// Create a root that mounts `registry`'s stores above `children`.
    pub fn new(registry: Arc<StoreRegistry>, children: Vec<Element>) -> Self {
        Self { registry, children }
    }

    /// Shorthand for `Element::new(StoreRoot::new(..))`.
    pub fn element(registry: Arc<StoreRegistry>, children: Vec<Element>) -> Element {
        Element::new(Self::new(registry, children))
    }
}

impl Component for StoreRoot {
    fn render(&self, cx: &mut RenderCx<'_>) -> Vec<Element> {
        let entries = cx.use_external_store(Arc::clone(&self.registry));
        tracing::trace!(stores = entries.len(), "rendering store root");

        let mut children = Vec::with_capacity(entries.len() + self.children.len());
        children.extend(
            entries
                .iter()
                .map(|entry| entry.executor.clone().keyed(format!("store-{}", entry.index()))),
        );
        children.extend(self.children.iter().cloned());
        children
    }

    fn name(&self) -> &'static str {
        "StoreRoot"
    }
}
