use thiserror::Error;

/// Possible errors when constructing or starting a watcher
#[derive(Error, Debug)]
pub enum Error {
    /// `start` was called more than once on the same watcher
    #[error("watcher is already started")]
    AlreadyStarted,

    /// Error from the request construction layer
    #[error(transparent)]
    Core(#[from] k8s_fluent_core::Error),
}
