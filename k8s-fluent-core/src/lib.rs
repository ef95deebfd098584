//! Client-less core of the `k8s-fluent` client stack.
//!
//! Holds the kind registry, the canonical URL/request builders, the filter
//! chain model, and the structural object representations that the client
//! and watch crates build on. Nothing in this crate performs I/O.

pub mod filter;
pub use filter::Filter;

pub mod gvk;
pub use gvk::{GroupVersion, GroupVersionKind};

pub mod metadata;
pub use metadata::{ListMeta, ObjectMeta, TypeMeta};

pub mod object;
pub use object::{DynamicObject, ObjectList};

pub mod params;
pub use params::{ApplyParams, ListParams, LogParams, Patch};

pub mod registry;

pub mod request;
pub use request::Request;

pub mod watch;
pub use watch::WatchEvent;

mod error;
pub use error::{Error, ErrorResponse};

/// Convenient alias for `Result` with the crate error
pub type Result<T, E = Error> = std::result::Result<T, E>;
