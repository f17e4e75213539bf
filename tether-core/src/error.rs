//! Error types for the store engine and its render host.

use thiserror::Error;

/// Errors surfaced by the render host and the store layer.
///
/// Missing providers and pre-mount reads are degraded states rather than
/// failures; the `try_*` accessors report them through this type while the
/// plain accessors log a diagnostic and return `None`.
#[derive(Error, Debug)]
pub enum Error {
    /// A scoped store was read outside any of its providers.
    #[error("no provider found for store `{store}`; render its provider above this consumer")]
    MissingProvider {
        /// Display name of the store.
        store: String,
    },

    /// A global store was read before the root aggregator executed it.
    #[error("global store `{store}` has not been executed yet; is a StoreRoot mounted?")]
    NotMounted {
        /// Display name of the store.
        store: String,
    },

    /// A provider was found but its producer has not produced a value yet.
    #[error("store `{store}` has no value yet")]
    Uninitialized {
        /// Display name of the store.
        store: String,
    },

    /// `flush` ran out of passes before the tree settled.
    #[error("render did not settle after {limit} passes")]
    PassLimitExceeded {
        /// The configured pass limit.
        limit: usize,
    },

    /// `mount` was called on a host that already has a root.
    #[error("host already has a mounted root")]
    AlreadyMounted,

    /// Host configuration could not be parsed.
    #[error("invalid host configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for host and store operations.
pub type Result<T> = std::result::Result<T, Error>;
