//! Tether Core
//!
//! This crate shares the output of stateful producers with consumers
//! elsewhere in a render tree. It implements:
//!
//! - Containers holding a producer's latest committed value
//! - Scoped stores, mounted once per provider
//! - Global stores, mounted once per registry by a root aggregator
//! - Consumer bindings with projection-based change filtering
//! - A minimal render/commit host to run all of the above
//!
//! # Architecture
//!
//! - `host`: components, hooks and the render/commit scheduler
//! - `store`: containers, executors, scoped and global stores
//! - `config`: serde-backed host and store options
//!
//! # Example
//!
//! ```rust,ignore
//! use tether_core::host::{Element, Host};
//! use tether_core::store::ScopedStore;
//!
//! let counter = ScopedStore::new(|cx| {
//!     let (count, set) = cx.use_state(|| 0);
//!     (count, set)
//! });
//!
//! let reader = {
//!     let counter = counter.clone();
//!     Element::from_fn(move |cx| {
//!         let value = counter.use_store(cx);
//!         println!("count: {:?}", value.map(|v| v.0));
//!         Vec::new()
//!     })
//! };
//!
//! let host = Host::default();
//! host.mount(counter.provider((), vec![reader]))?;
//! // prints "count: Some(0)"
//! ```

pub mod config;
pub mod host;
pub mod store;

mod error;

pub use config::{HostConfig, StoreOptions};
pub use error::{Error, Result};
pub use host::{Element, Host};
pub use store::{GlobalStore, ScopedStore, StoreRegistry, StoreRoot};
