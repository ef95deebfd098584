//! Crate for interacting with the Kubernetes API
//!
//! Builds canonical REST requests from a kind registry and a fluent filter
//! chain, and keeps a local cache consistent with the cluster through a
//! resilient list-then-watch engine.
//!
//! # Example
//!
//! The following applies a ConfigMap, then watches its namespace for
//! changes until the watcher is closed.
//!
//! ```rust,no_run
//! use k8s_fluent::{Client, Config, DynamicObject, WatchConfig, Watcher};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::new("https://10.0.0.1:6443".parse()?);
//!     let client = Client::try_from(config)?;
//!
//!     let maps = client.kind("ConfigMap")?.in_namespace("default")?;
//!
//!     let desired: DynamicObject = serde_json::from_value(serde_json::json!({
//!         "metadata": { "name": "settings" },
//!         "data": { "retries": "3" },
//!     }))?;
//!     maps.apply(&desired, &Default::default()).await?;
//!
//!     let mut watcher = Watcher::new(&maps, WatchConfig::default(), |obj, phase| async move {
//!         println!("{:?}: {:?}", phase, obj.name());
//!         Ok(())
//!     })?;
//!     watcher.start()?;
//!
//!     // ... later
//!     watcher.close();
//!     Ok(())
//! }
//! ```

pub use k8s_fluent_client as client;
pub use k8s_fluent_core as core;
pub use k8s_fluent_watch as watch;

#[doc(inline)] pub use k8s_fluent_client::{Client, Config, Error, FinalizerOp, K8s};
#[doc(inline)] pub use k8s_fluent_core::{
    ApplyParams, DynamicObject, Filter, GroupVersionKind, ListParams, LogParams, ObjectList, Patch,
};
pub use k8s_fluent_core::registry;
#[doc(inline)] pub use k8s_fluent_watch::{Lifecycle, WatchConfig, WatchPhase, Watcher};

/// Convenient alias for `Result` with the client error
pub type Result<T, E = Error> = std::result::Result<T, E>;
