//! A basic API client for interacting with the Kubernetes API
//!
//! The [`Client`] wraps a tower service stack and exposes two levels of
//! round-trip:
//!
//! - [`Client::fetch`], the never-throwing envelope: transport failures and
//!   HTTP error statuses are both reported inside the returned
//!   [`FetchResponse`], never as an `Err`.
//! - [`Client::request`] / [`Client::request_text`], typed helpers that turn
//!   non-2xx responses into [`Error::Api`] carrying the decoded `Status`
//!   body, which is what the fluent verbs build on.
use bytes::Bytes;
use futures::{future::BoxFuture, Stream, TryStreamExt};
use http::{self, header::HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, BodyStream};
use serde::de::DeserializeOwned;
use tower::{buffer::Buffer, util::BoxService, BoxError, Layer, Service, ServiceExt};
use tower_http::map_response_body::MapResponseBodyLayer;

use crate::{config::Config, error::ErrorResponse, Error, Result};
use std::sync::Arc;

mod body;
pub use body::Body;
mod builder;
pub use builder::{ClientBuilder, DynBody};

/// The fixed User-Agent identifying this library
pub const USER_AGENT: &str = concat!("k8s-fluent/", env!("CARGO_PKG_VERSION"));

/// The outcome of a single fetch, reported without throwing.
///
/// Transport errors are folded into `ok == false` with a `BAD_REQUEST`
/// status; HTTP-level failures keep the server's status code. `data` is the
/// JSON-decoded body when the response is JSON, the raw text as a JSON
/// string otherwise, and `None` for empty bodies or transport failures.
#[derive(Debug)]
pub struct FetchResponse {
    /// Decoded response body, when there was one
    pub data: Option<serde_json::Value>,
    /// Whether the response status was 2xx
    pub ok: bool,
    /// The response status, or `400` for transport errors
    pub status: StatusCode,
    /// The canonical reason phrase, or the transport error message
    pub status_text: String,
}

/// Client for connecting with a Kubernetes cluster.
///
/// Construct with [`Client::try_from`] a [`Config`] for the default stack,
/// or [`Client::new`] to bring a custom tower service.
#[derive(Clone)]
pub struct Client {
    // - `Buffer` for cheap clone
    // - `BoxService` for dynamic response future type
    inner: Buffer<Request<Body>, BoxFuture<'static, Result<Response<Body>, BoxError>>>,
    config: Arc<Config>,
}

impl Client {
    /// Create a [`Client`] using a custom `Service` stack.
    ///
    /// The config supplies the cluster URL every request is joined onto, the
    /// default namespace, and the bearer-token source.
    pub fn new<S, B>(service: S, config: Config) -> Self
    where
        S: Service<Request<Body>, Response = Response<B>> + Send + 'static,
        S::Future: Send + 'static,
        S::Error: Into<BoxError>,
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        // Erase the response body type so callers deal with one `Body`.
        let service = BoxService::new(
            MapResponseBodyLayer::new(Body::wrap_body)
                .layer(service)
                .map_err(|e| e.into()),
        );
        Self {
            inner: Buffer::new(service, 1024),
            config: Arc::new(config),
        }
    }

    /// The namespace used when a chain does not set one
    pub fn default_namespace(&self) -> &str {
        &self.config.default_namespace
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    /// Join a relative request onto the cluster URL and attach the ambient
    /// headers (User-Agent, lazily resolved bearer token).
    async fn prepare(&self, request: Request<Vec<u8>>) -> Result<Request<Body>> {
        let (mut parts, body) = request.into_parts();
        parts.uri = finalize_uri(&self.config.cluster_url, &parts.uri)?;
        parts
            .headers
            .insert(http::header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        if let Some(token) = self.config.bearer_token().await {
            parts.headers.insert(
                http::header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}")).map_err(Error::InvalidBearerToken)?,
            );
        }
        Ok(Request::from_parts(parts, Body::from(body)))
    }

    /// Perform a raw HTTP request against the API and return the raw response.
    pub async fn send(&self, request: Request<Body>) -> Result<Response<Body>> {
        let mut svc = self.inner.clone();
        let res = svc
            .ready()
            .await
            .map_err(Error::Service)?
            .call(request)
            .await
            .map_err(|err| {
                // Error decorating request
                err.downcast::<Error>()
                    .map(|e| *e)
                    // Error requesting
                    .or_else(|err| err.downcast::<hyper::Error>().map(|err| Error::HyperError(*err)))
                    // Error from another middleware
                    .unwrap_or_else(Error::Service)
            })?;
        Ok(res)
    }

    /// Perform a request and report the outcome as an envelope.
    ///
    /// This never returns `Err`; see [`FetchResponse`].
    pub async fn fetch(&self, request: Request<Vec<u8>>) -> FetchResponse {
        match self.fetch_inner(request).await {
            Ok(resp) => resp,
            Err(err) => {
                tracing::debug!("fetch transport failure: {}", err);
                FetchResponse {
                    data: None,
                    ok: false,
                    status: StatusCode::BAD_REQUEST,
                    status_text: err.to_string(),
                }
            }
        }
    }

    async fn fetch_inner(&self, request: Request<Vec<u8>>) -> Result<FetchResponse> {
        let req = self.prepare(request).await?;
        let res = self.send(req).await?;
        let status = res.status();
        let is_json = res
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);
        let bytes = res.into_body().collect().await?.to_bytes();
        let text = String::from_utf8(bytes.to_vec()).map_err(Error::FromUtf8)?;
        let data = if text.is_empty() {
            None
        } else if is_json {
            serde_json::from_str(&text).ok()
        } else {
            Some(serde_json::Value::String(text))
        };
        Ok(FetchResponse {
            data,
            ok: status.is_success(),
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
        })
    }

    /// Perform a request and deserialize the response as JSON to a known type.
    pub async fn request<T>(&self, request: Request<Vec<u8>>) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let text = self.request_text(request).await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::warn!("{}, {:?}", text, e);
            Error::SerdeError(e)
        })
    }

    /// Perform a request and get back the response body as a string.
    pub async fn request_text(&self, request: Request<Vec<u8>>) -> Result<String> {
        let req = self.prepare(request).await?;
        let res = self.send(req).await?;
        let status = res.status();
        let bytes = res.into_body().collect().await?.to_bytes();
        let text = String::from_utf8(bytes.to_vec()).map_err(Error::FromUtf8)?;
        handle_api_errors(&text, status)?;
        Ok(text)
    }

    /// Perform a request and get back the response as a stream of bytes.
    ///
    /// Non-2xx statuses are surfaced as [`Error::Api`] before any bytes flow,
    /// which is what the watch engine relies on to trigger a resync.
    pub async fn request_text_stream(
        &self,
        request: Request<Vec<u8>>,
    ) -> Result<impl Stream<Item = Result<Bytes>>> {
        let req = self.prepare(request).await?;
        let res = self.send(req).await?;
        let status = res.status();
        if status.is_client_error() || status.is_server_error() {
            let bytes = res.into_body().collect().await?.to_bytes();
            let text = String::from_utf8(bytes.to_vec()).map_err(Error::FromUtf8)?;
            handle_api_errors(&text, status)?;
            // handle_api_errors rejects every non-2xx status
            return Err(Error::Api(ErrorResponse {
                status: status.to_string(),
                code: status.as_u16(),
                message: text,
                reason: String::new(),
            }));
        }
        Ok(BodyStream::new(res.into_body())
            .try_filter_map(|frame| futures::future::ready(Ok(frame.into_data().ok()))))
    }
}

/// Join a request path+query onto the configured cluster URL
fn finalize_uri(cluster_url: &http::Uri, uri: &http::Uri) -> Result<http::Uri> {
    let pq = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    let base_path = cluster_url.path().trim_end_matches('/');
    let mut builder = http::Uri::builder();
    if let Some(scheme) = cluster_url.scheme() {
        builder = builder.scheme(scheme.as_str());
    }
    if let Some(authority) = cluster_url.authority() {
        builder = builder.authority(authority.as_str());
    }
    builder
        .path_and_query(format!("{base_path}{pq}"))
        .build()
        .map_err(Error::HttpError)
}

/// Kubernetes returned error handling
///
/// Either the apiserver returned an explicit `Status` body we can decode,
/// or it returned something else and we reconstruct an equivalent. Either
/// way callers see an [`Error::Api`] with the status code preserved.
fn handle_api_errors(text: &str, status: StatusCode) -> Result<()> {
    if status.is_client_error() || status.is_server_error() {
        if let Ok(errdata) = serde_json::from_str::<ErrorResponse>(text) {
            tracing::debug!("unsuccessful: {:?}", errdata);
            Err(Error::Api(errdata))
        } else {
            tracing::warn!("unsuccessful data error parse: {}", text);
            let ae = ErrorResponse {
                status: status.to_string(),
                code: status.as_u16(),
                message: format!("{text:?}"),
                reason: "Failed to parse error data".into(),
            };
            Err(Error::Api(ae))
        }
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tower::service_fn;

    fn test_config() -> Config {
        Config::new("http://localhost:8080".parse().unwrap()).auth_token_file("/nonexistent".into())
    }

    fn json_response(value: serde_json::Value) -> Response<Body> {
        Response::builder()
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&value).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn fetch_decodes_json_bodies() {
        let svc = service_fn(|req: Request<Body>| async move {
            assert_eq!(req.uri(), "http://localhost:8080/version");
            assert_eq!(req.headers().get(http::header::USER_AGENT).unwrap(), USER_AGENT);
            Ok::<_, BoxError>(json_response(serde_json::json!({"major": "1"})))
        });
        let client = Client::new(svc, test_config());
        let resp = client
            .fetch(Request::get("/version").body(vec![]).unwrap())
            .await;
        assert!(resp.ok);
        assert_eq!(resp.status, StatusCode::OK);
        assert_eq!(resp.data.unwrap()["major"], "1");
    }

    #[tokio::test]
    async fn fetch_returns_text_as_json_string() {
        let svc = service_fn(|_req: Request<Body>| async move {
            Ok::<_, BoxError>(
                Response::builder()
                    .header(http::header::CONTENT_TYPE, "text/plain")
                    .body(Body::from(b"hello".to_vec()))
                    .unwrap(),
            )
        });
        let client = Client::new(svc, test_config());
        let resp = client.fetch(Request::get("/raw").body(vec![]).unwrap()).await;
        assert!(resp.ok);
        assert_eq!(resp.data, Some(serde_json::Value::String("hello".into())));
    }

    #[tokio::test]
    async fn fetch_never_throws_on_transport_errors() {
        let svc = service_fn(|_req: Request<Body>| async move {
            Err::<Response<Body>, BoxError>("connection refused".into())
        });
        let client = Client::new(svc, test_config());
        let resp = client.fetch(Request::get("/api/v1/pods").body(vec![]).unwrap()).await;
        assert!(!resp.ok);
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
        assert!(resp.status_text.contains("connection refused"));
        assert_eq!(resp.data, None);
    }

    #[tokio::test]
    async fn request_surfaces_api_errors() {
        let svc = service_fn(|_req: Request<Body>| async move {
            Ok::<_, BoxError>(
                Response::builder()
                    .status(StatusCode::NOT_FOUND)
                    .body(Body::from(
                        serde_json::to_vec(&serde_json::json!({
                            "kind": "Status",
                            "status": "Failure",
                            "message": "pods \"nope\" not found",
                            "reason": "NotFound",
                            "code": 404,
                        }))
                        .unwrap(),
                    ))
                    .unwrap(),
            )
        });
        let client = Client::new(svc, test_config());
        let err = client
            .request::<serde_json::Value>(Request::get("/api/v1/pods/nope").body(vec![]).unwrap())
            .await
            .unwrap_err();
        match err {
            Error::Api(e) => {
                assert_eq!(e.code, 404);
                assert_eq!(e.reason, "NotFound");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bearer_token_is_attached() {
        let svc = service_fn(|req: Request<Body>| async move {
            assert_eq!(
                req.headers().get(http::header::AUTHORIZATION).unwrap(),
                "Bearer sekret"
            );
            Ok::<_, BoxError>(json_response(serde_json::json!({})))
        });
        let client = Client::new(svc, test_config().auth_token("sekret"));
        let resp = client.fetch(Request::get("/apis").body(vec![]).unwrap()).await;
        assert!(resp.ok);
    }

    #[test]
    fn uris_join_onto_base_paths() {
        let base: http::Uri = "https://example.com:6443/prefix/".parse().unwrap();
        let uri = finalize_uri(&base, &"/api/v1/pods?watch=true".parse().unwrap()).unwrap();
        assert_eq!(uri.to_string(), "https://example.com:6443/prefix/api/v1/pods?watch=true");
    }
}
