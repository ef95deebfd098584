//! Client configuration.
//!
//! Kubeconfig parsing and exotic auth flows belong to an external loader;
//! this type only carries what the transport needs: a resolved cluster URL,
//! a default namespace, and a bearer-token source.

use std::path::PathBuf;

use secrecy::SecretString;

/// The token location kubernetes mounts into pods for service accounts
pub const SERVICEACCOUNT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Configuration for a [`Client`](crate::Client)
#[derive(Clone, Debug)]
pub struct Config {
    /// The resolved base URL of the apiserver
    pub cluster_url: http::Uri,

    /// The namespace used when a chain does not set one explicitly
    pub default_namespace: String,

    /// An explicit bearer token; takes precedence over the token file
    pub auth_token: Option<SecretString>,

    /// A file to read the bearer token from, lazily, on every request.
    ///
    /// Defaults to the in-cluster service-account location; a missing or
    /// unreadable file simply means no Authorization header.
    pub auth_token_file: Option<PathBuf>,
}

impl Config {
    /// Construct a config for a given cluster URL with in-cluster token defaults
    pub fn new(cluster_url: http::Uri) -> Self {
        Self {
            cluster_url,
            default_namespace: "default".to_string(),
            auth_token: None,
            auth_token_file: Some(PathBuf::from(SERVICEACCOUNT_TOKEN_PATH)),
        }
    }

    /// Set the default namespace
    #[must_use]
    pub fn default_namespace(mut self, namespace: &str) -> Self {
        self.default_namespace = namespace.to_string();
        self
    }

    /// Use an explicit bearer token instead of the token file
    #[must_use]
    pub fn auth_token(mut self, token: &str) -> Self {
        self.auth_token = Some(SecretString::from(token.to_string()));
        self
    }

    /// Read bearer tokens from a non-default file location
    #[must_use]
    pub fn auth_token_file(mut self, path: PathBuf) -> Self {
        self.auth_token_file = Some(path);
        self
    }

    /// Resolve the bearer token for one request.
    ///
    /// The token file is re-read on every call so rotated service-account
    /// tokens are picked up without restarting.
    pub(crate) async fn bearer_token(&self) -> Option<String> {
        use secrecy::ExposeSecret;
        if let Some(token) = &self.auth_token {
            return Some(token.expose_secret().to_string());
        }
        let path = self.auth_token_file.as_ref()?;
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    None
                } else {
                    Some(token.to_string())
                }
            }
            Err(err) => {
                tracing::debug!("no bearer token at {}: {}", path.display(), err);
                None
            }
        }
    }
}
