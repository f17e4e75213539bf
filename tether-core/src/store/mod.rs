//! Store Engine
//!
//! This module lets a producer running inside the render tree publish its
//! latest value to consumers anywhere below it:
//!
//! - [`Container`]: the latest committed value plus subscribers
//! - [`ScopedStore`]: one producer instance per provider mount
//! - [`GlobalStore`]: one producer instance per [`StoreRegistry`], run by a
//!   [`StoreRoot`]
//!
//! # Consistency
//!
//! Producers write during the commit phase only, after the first render.
//! Consumers read through the host's external-store protocol, so they never
//! render a value older than the last commit they were subscribed for.
//! Producers that read other producers converge over a few passes: a write
//! committed by one executor schedules its dependents for the next pass.

mod binding;
mod container;
mod executor;
mod global;
mod root;
mod scoped;
mod subscriber;

pub use binding::{deps_changed, DepsFn};
pub use container::Container;
pub use executor::Producer;
pub use global::{GlobalStore, RegistryEntry, StoreRegistry};
pub use root::StoreRoot;
pub use scoped::ScopedStore;
pub use subscriber::{Callback, SubscriberId};
