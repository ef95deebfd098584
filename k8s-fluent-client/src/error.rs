//! Error handling for the client crate
pub use k8s_fluent_core::ErrorResponse;
use thiserror::Error;

/// Possible errors from client calls
#[derive(Error, Debug)]
pub enum Error {
    /// ApiError for when the apiserver rejects a call
    ///
    /// Carries the decoded `Status` body; `code == 410` is the common
    /// resource-version-too-old case on watches.
    #[error("ApiError: {0} ({0:?})")]
    Api(#[source] ErrorResponse),

    /// Error from the request construction layer
    #[error(transparent)]
    Core(#[from] k8s_fluent_core::Error),

    /// Hyper error
    #[error("HyperError: {0}")]
    HyperError(#[from] hyper::Error),

    /// Error from the underlying service stack
    #[error("ServiceError: {0}")]
    Service(#[source] tower::BoxError),

    /// An IO error from the connector or token source
    #[error("ConnectionError: {0}")]
    Connection(#[source] std::io::Error),

    /// The resolved bearer token was not a valid header value
    #[error("Invalid bearer token: {0}")]
    InvalidBearerToken(#[source] http::header::InvalidHeaderValue),

    /// UTF-8 error decoding a response body
    #[error("UTF-8 Error: {0}")]
    FromUtf8(#[from] std::string::FromUtf8Error),

    /// Http based error
    #[error("HttpError: {0}")]
    HttpError(#[from] http::Error),

    /// Failed to construct a URI
    #[error(transparent)]
    InvalidUri(#[from] http::uri::InvalidUri),

    /// Common error case when deserializing responses into own structs
    #[error("Error deserializing response: {0}")]
    SerdeError(#[from] serde_json::Error),
}
