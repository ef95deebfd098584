use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Possible errors from request construction and the kind registry
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to build a request
    #[error("failed to build request: {0}")]
    BuildRequest(#[source] http::Error),

    /// Failed to serialize a request body
    #[error("failed to serialize body: {0}")]
    SerializeBody(#[source] serde_json::Error),

    /// A kind was missing required coordinates (e.g. a version on a non-core group)
    #[error("invalid kind {0}: non-core kinds require a version")]
    InvalidKind(String),

    /// A kind name was neither built-in nor registered
    #[error("unknown kind: {0} (register it before first use)")]
    UnknownKind(String),

    /// A kind name was registered twice
    #[error("kind {0} is already registered")]
    AlreadyRegistered(String),

    /// A filter chain already carried a name
    #[error("name is already set on this chain")]
    NameAlreadySet,

    /// A filter chain already carried a namespace
    #[error("namespace is already set on this chain")]
    NamespaceAlreadySet,

    /// The subresource is not served for this kind
    #[error("kind {0} does not support the {1} subresource")]
    UnsupportedSubresource(String, &'static str),

    /// A request validation failed
    #[error("request validation failed: {0}")]
    Validation(String),
}

/// An error response from the API.
///
/// This is the `Status`-shaped body Kubernetes returns for failing calls,
/// and the payload of `ERROR` watch events (`code == 410` signals a purged
/// resource version window).
#[derive(Error, Deserialize, Serialize, Debug, Clone, Eq, PartialEq)]
#[error("{message}: {reason}")]
pub struct ErrorResponse {
    /// The status
    #[serde(default)]
    pub status: String,
    /// A message about the error
    #[serde(default)]
    pub message: String,
    /// The reason for the error
    #[serde(default)]
    pub reason: String,
    /// The error code
    #[serde(default)]
    pub code: u16,
}
