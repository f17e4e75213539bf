//! Render Host
//!
//! A minimal render/commit cycle for producers and consumers to run in.
//!
//! Stores need a host that renders components, keeps per-instance hook
//! state, scopes values to subtrees, and separates rendering from the
//! commit phase where side effects happen. This module provides exactly
//! that and nothing more: there is no output surface, layout, or event
//! system. Components describe children as [`Element`]s and the
//! [`Host`] reconciles them by key and type.
//!
//! # Phases
//!
//! Rendering must be free of observable side effects, because a component
//! may render several times before anything is committed. Effects and
//! external-store subscriptions are queued during render and run in the
//! commit phase. [`PhaseGuard`] tracks which phase is active on the
//! current thread.

mod hooks;
mod node;
mod phase;
mod scheduler;

pub use hooks::{
    Cleanup, ContextId, ExternalStore, OnChange, RenderCx, ScheduleHandle, Snapshot, StateSetter,
};
pub use node::{Component, Element, InstanceId, Key};
pub use phase::{Phase, PhaseGuard};
pub use scheduler::Host;

#[doc(hidden)]
pub use node::AsAny;
