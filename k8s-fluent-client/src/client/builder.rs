use bytes::Bytes;
use http::{Request, Response};
use http_body_util::BodyExt;
use hyper_util::{
    client::legacy::connect::{Connect, HttpConnector},
    rt::TokioExecutor,
};
use tower::{util::BoxService, BoxError, Layer, Service, ServiceExt};
use tower_http::map_response_body::MapResponseBodyLayer;

use super::body::Body;
use crate::{Client, Config, Error, Result};

/// HTTP response body of a dynamic backing type.
pub type DynBody = dyn http_body::Body<Data = Bytes, Error = BoxError> + Send + Unpin;

/// Builder for [`Client`] instances with customized [tower](`Service`) middleware.
pub struct ClientBuilder<Svc> {
    service: Svc,
    config: Config,
}

impl<Svc> ClientBuilder<Svc> {
    /// Construct a [`ClientBuilder`] from scratch with a fully custom [`Service`] stack.
    ///
    /// Most users will want [`ClientBuilder::try_from`] instead, which
    /// provides a default stack as a starting point.
    pub fn new(service: Svc, config: Config) -> Self
    where
        Svc: Service<Request<Body>>,
    {
        Self { service, config }
    }

    /// Add a [`Layer`] to the current [`Service`] stack.
    pub fn with_layer<L: Layer<Svc>>(self, layer: &L) -> ClientBuilder<L::Service> {
        let Self {
            service: stack,
            config,
        } = self;
        ClientBuilder {
            service: layer.layer(stack),
            config,
        }
    }

    /// Build a [`Client`] instance with the current [`Service`] stack.
    pub fn build<B>(self) -> Client
    where
        Svc: Service<Request<Body>, Response = Response<B>> + Send + 'static,
        Svc::Future: Send + 'static,
        Svc::Error: Into<BoxError>,
        B: http_body::Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Client::new(self.service, self.config)
    }
}

fn stack<C>(connector: C, config: Config) -> ClientBuilder<BoxService<Request<Body>, Response<Box<DynBody>>, BoxError>>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let client = hyper_util::client::legacy::Client::builder(TokioExecutor::new()).build::<_, Body>(connector);
    let service = MapResponseBodyLayer::new(|body: hyper::body::Incoming| {
        Box::new(body.map_err(BoxError::from)) as Box<DynBody>
    })
    .layer(client)
    .map_err(BoxError::from);
    ClientBuilder::new(BoxService::new(service), config)
}

impl TryFrom<Config> for ClientBuilder<BoxService<Request<Body>, Response<Box<DynBody>>, BoxError>> {
    type Error = Error;

    /// Builds a default stack from a given configuration.
    ///
    /// TLS feature precedence mirrors the cargo features: with `rustls-tls`
    /// enabled an https-or-http connector with native roots is used,
    /// otherwise requests go over the plain HTTP connector.
    fn try_from(config: Config) -> Result<Self> {
        let mut connector = HttpConnector::new();
        connector.enforce_http(false);

        #[cfg(feature = "rustls-tls")]
        let builder = {
            let https = hyper_rustls::HttpsConnectorBuilder::new()
                .with_native_roots()
                .map_err(Error::Connection)?
                .https_or_http()
                .enable_http1()
                .wrap_connector(connector);
            stack(https, config)
        };
        #[cfg(not(feature = "rustls-tls"))]
        let builder = stack(connector, config);

        Ok(builder)
    }
}

impl TryFrom<Config> for Client {
    type Error = Error;

    /// Builds a default [`Client`] from a [`Config`]; see [`ClientBuilder`]
    /// if more customization is required.
    fn try_from(config: Config) -> Result<Self> {
        Ok(ClientBuilder::try_from(config)?.build())
    }
}
