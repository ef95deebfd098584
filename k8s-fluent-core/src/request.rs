//! Request builder producing canonical Kubernetes REST calls.
use serde::Serialize;

use crate::{
    gvk::GroupVersionKind,
    params::{ApplyParams, ListParams, LogParams, Patch},
    Error, Result,
};

pub(crate) const JSON_MIME: &str = "application/json";
pub(crate) const MERGE_PATCH_MIME: &str = "application/merge-patch+json";

/// A Kubernetes request builder
///
/// Holds the collection path of a resource (base path, optional namespace
/// segment, plural) and supplies constructors for the supported verbs.
/// All constructors return plain `http::Request` objects; building is pure,
/// so identical inputs always produce byte-identical URLs.
#[derive(Debug, Clone)]
pub struct Request {
    /// The path component of a url
    pub url_path: String,
}

impl Request {
    /// New request with a resource's collection url path
    pub fn new<S: Into<String>>(url_path: S) -> Self {
        Self {
            url_path: url_path.into(),
        }
    }

    /// Build the collection path for a kind, optionally scoped to a namespace
    ///
    /// Core-group kinds live under `/api/v1`, everything else under
    /// `/apis/<group>/<version>`. A non-core kind without a version is
    /// rejected with [`Error::InvalidKind`].
    pub fn for_kind(gvk: &GroupVersionKind, namespace: Option<&str>) -> Result<Self> {
        if gvk.kind.is_empty() {
            return Err(Error::InvalidKind("<empty>".into()));
        }
        let base = if gvk.group.is_empty() {
            "/api/v1".to_string()
        } else {
            if gvk.version.is_empty() {
                return Err(Error::InvalidKind(gvk.kind.clone()));
            }
            format!("/apis/{}/{}", gvk.group, gvk.version)
        };
        let mut segments = vec![base];
        if let Some(ns) = namespace {
            segments.push(format!("namespaces/{ns}"));
        }
        segments.push(gvk.plural_name());
        Ok(Self::new(segments.join("/")))
    }

    fn finish(target: String, qp: form_urlencoded::Serializer<String>) -> String {
        let mut qp = qp;
        let query = qp.finish();
        if query.is_empty() {
            target
        } else {
            format!("{target}?{query}")
        }
    }
}

/// Convenience methods found from API conventions
impl Request {
    /// List a collection of a resource
    pub fn list(&self, lp: &ListParams) -> Result<http::Request<Vec<u8>>> {
        let mut qp = form_urlencoded::Serializer::new(String::new());
        lp.populate_qp(&mut qp);
        let urlstr = Self::finish(self.url_path.clone(), qp);
        let req = http::Request::get(urlstr);
        req.body(vec![]).map_err(Error::BuildRequest)
    }

    /// Watch a resource, optionally resuming from a known version
    ///
    /// No `resourceVersion` parameter is emitted when `ver` is `None`, which
    /// is the correct resume behavior after a purged version window.
    pub fn watch(&self, lp: &ListParams, ver: Option<&str>) -> Result<http::Request<Vec<u8>>> {
        let mut qp = form_urlencoded::Serializer::new(String::new());
        qp.append_pair("watch", "true");
        qp.append_pair("allowWatchBookmarks", "true");
        if let Some(fields) = &lp.field_selector {
            qp.append_pair("fieldSelector", fields);
        }
        if let Some(labels) = &lp.label_selector {
            qp.append_pair("labelSelector", labels);
        }
        if let Some(ver) = ver {
            qp.append_pair("resourceVersion", ver);
        }
        let urlstr = Self::finish(self.url_path.clone(), qp);
        let req = http::Request::get(urlstr);
        req.body(vec![]).map_err(Error::BuildRequest)
    }

    /// Get a single instance
    pub fn get(&self, name: &str) -> Result<http::Request<Vec<u8>>> {
        let urlstr = format!("{}/{}", self.url_path, name);
        let req = http::Request::get(urlstr);
        req.body(vec![]).map_err(Error::BuildRequest)
    }

    /// Create an instance of a resource
    ///
    /// The name is carried in the body, never in the path.
    pub fn create(&self, data: Vec<u8>) -> Result<http::Request<Vec<u8>>> {
        let req = http::Request::post(self.url_path.clone())
            .header(http::header::CONTENT_TYPE, JSON_MIME);
        req.body(data).map_err(Error::BuildRequest)
    }

    /// Delete an instance of a resource
    pub fn delete(&self, name: &str) -> Result<http::Request<Vec<u8>>> {
        let urlstr = format!("{}/{}", self.url_path, name);
        let req = http::Request::delete(urlstr).header(http::header::CONTENT_TYPE, JSON_MIME);
        req.body(vec![]).map_err(Error::BuildRequest)
    }

    /// Patch an instance of a resource
    ///
    /// The `Content-Type` follows the patch variant; use [`Request::apply`]
    /// for server-side apply so the field-manager parameters are attached.
    pub fn patch<P: Serialize>(&self, name: &str, patch: &Patch<P>) -> Result<http::Request<Vec<u8>>> {
        let urlstr = format!("{}/{}", self.url_path, name);
        http::Request::patch(urlstr)
            .header(http::header::ACCEPT, JSON_MIME)
            .header(http::header::CONTENT_TYPE, patch.content_type())
            .body(patch.serialize().map_err(Error::SerializeBody)?)
            .map_err(Error::BuildRequest)
    }

    /// Server-side apply of a full object
    pub fn apply(&self, name: &str, ap: &ApplyParams, data: Vec<u8>) -> Result<http::Request<Vec<u8>>> {
        ap.validate()?;
        let mut qp = form_urlencoded::Serializer::new(String::new());
        ap.populate_qp(&mut qp);
        let urlstr = Self::finish(format!("{}/{}", self.url_path, name), qp);
        http::Request::patch(urlstr)
            .header(http::header::ACCEPT, JSON_MIME)
            .header(http::header::CONTENT_TYPE, "application/apply-patch+yaml")
            .body(data)
            .map_err(Error::BuildRequest)
    }

    /// Merge-patch the status subresource
    ///
    /// The body must already be the `{"status": ...}` wrapper.
    pub fn patch_status(&self, name: &str, data: Vec<u8>) -> Result<http::Request<Vec<u8>>> {
        let urlstr = format!("{}/{}/status", self.url_path, name);
        http::Request::patch(urlstr)
            .header(http::header::ACCEPT, JSON_MIME)
            .header(http::header::CONTENT_TYPE, MERGE_PATCH_MIME)
            .body(data)
            .map_err(Error::BuildRequest)
    }
}

/// Subresources
impl Request {
    /// Create an eviction for a named object
    ///
    /// Eviction is an explicit verb here: the name lands in the path with
    /// `/eviction` appended, and the body is the fixed `policy/v1` payload.
    pub fn evict(&self, name: &str, namespace: Option<&str>) -> Result<http::Request<Vec<u8>>> {
        let urlstr = format!("{}/{}/eviction", self.url_path, name);
        let mut metadata = serde_json::json!({ "name": name });
        if let Some(ns) = namespace {
            metadata["namespace"] = serde_json::Value::String(ns.to_string());
        }
        let data = serde_json::to_vec(&serde_json::json!({
            "apiVersion": "policy/v1",
            "kind": "Eviction",
            "metadata": metadata,
        }))
        .map_err(Error::SerializeBody)?;
        let req = http::Request::post(urlstr).header(http::header::CONTENT_TYPE, JSON_MIME);
        req.body(data).map_err(Error::BuildRequest)
    }

    /// Get logs for a named object
    pub fn logs(&self, name: &str, lp: &LogParams) -> Result<http::Request<Vec<u8>>> {
        let mut qp = form_urlencoded::Serializer::new(String::new());
        lp.populate_qp(&mut qp);
        let urlstr = Self::finish(format!("{}/{}/log", self.url_path, name), qp);
        let req = http::Request::get(urlstr);
        req.body(vec![]).map_err(Error::BuildRequest)
    }

    /// Patch the replica count through the scale subresource
    pub fn scale(&self, name: &str, replicas: i32) -> Result<http::Request<Vec<u8>>> {
        let urlstr = format!("{}/{}/scale", self.url_path, name);
        let ops = serde_json::json!([
            { "op": "replace", "path": "/spec/replicas", "value": replicas }
        ]);
        http::Request::patch(urlstr)
            .header(http::header::ACCEPT, JSON_MIME)
            .header(http::header::CONTENT_TYPE, "application/json-patch+json")
            .body(serde_json::to_vec(&ops).map_err(Error::SerializeBody)?)
            .map_err(Error::BuildRequest)
    }

    /// Proxy a GET through to a named object, optionally on a port
    pub fn proxy(&self, name: &str, port: Option<u16>) -> Result<http::Request<Vec<u8>>> {
        let target = match port {
            Some(port) => format!("{}/{}:{}/proxy", self.url_path, name, port),
            None => format!("{}/{}/proxy", self.url_path, name),
        };
        let req = http::Request::get(target);
        req.body(vec![]).map_err(Error::BuildRequest)
    }
}
