//! Resilient watch engine for the `k8s-fluent` stack.
//!
//! Turns the apiserver's at-most-once watch stream into an at-least-once,
//! cache-consistent stream of object updates by running the list-then-watch
//! reflector loop: seed a uid-keyed cache by paginated listing, consume the
//! NDJSON watch stream, and relist whenever the stream falls behind,
//! disconnects, or the server purges the resource version window.

pub mod watcher;
pub use watcher::{Lifecycle, WatchConfig, WatchPhase, Watcher};

mod error;
pub use error::Error;

/// Convenient alias for `Result` with the crate error
pub type Result<T, E = Error> = std::result::Result<T, E>;
