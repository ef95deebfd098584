//! Fluent Kubernetes client for the `k8s-fluent` stack.
//!
//! The [`Client`] performs the HTTP round-trips (with a never-throwing
//! [`client::FetchResponse`] envelope at the bottom), and [`K8s`] provides the
//! chainable filter + verb surface over any registered kind.
//!
//! ```no_run
//! use k8s_fluent_client::{Client, Config};
//! # async fn wrapper() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::try_from(Config::new("https://10.0.0.1:6443".parse()?))?;
//! let pods = client.kind("Pod")?.in_namespace("default")?;
//! for pod in pods.list().await? {
//!     println!("{:?}", pod.name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub use client::{Client, ClientBuilder, FetchResponse};

pub mod config;
pub use config::Config;

pub mod fluent;
pub use fluent::{FinalizerOp, K8s};

mod error;
pub use error::Error;

pub use k8s_fluent_core as core;
pub use k8s_fluent_core::ErrorResponse;

/// Convenient alias for `Result` with the crate error
pub type Result<T, E = Error> = std::result::Result<T, E>;
