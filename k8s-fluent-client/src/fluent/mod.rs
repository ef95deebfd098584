//! The fluent chain: filters first, then a terminal verb.
//!
//! A [`K8s`] chain is cheap to clone and never mutated by its terminal
//! verbs; names passed to a verb do not leak back into the chain, so one
//! chain can serve many calls.
use serde_json::Value;

use k8s_fluent_core::{
    filter::Filter,
    gvk::GroupVersionKind,
    object::{DynamicObject, ObjectList},
    params::{ApplyParams, ListParams, LogParams, Patch},
    registry,
    request::Request,
    Error as CoreError,
};

use crate::{Client, Error, Result};

/// Kinds serving the `scale` subresource
const SCALABLE_KINDS: [&str; 3] = ["Deployment", "ReplicaSet", "StatefulSet"];
/// Kinds serving the `proxy` subresource
const PROXYABLE_KINDS: [&str; 3] = ["Pod", "Service", "Node"];

/// Direction of a finalizer update
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinalizerOp {
    /// Ensure the finalizer is present
    Add,
    /// Ensure the finalizer is absent
    Remove,
}

/// The fluent resource handle
///
/// Obtained from [`Client::kind`] (registry lookup) or [`Client::kind_with`]
/// (explicit coordinates). Chain methods accumulate filters; terminal verbs
/// perform the call.
#[derive(Clone)]
pub struct K8s {
    client: Client,
    gvk: GroupVersionKind,
    filter: Filter,
}

impl std::fmt::Debug for K8s {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("K8s")
            .field("gvk", &self.gvk)
            .field("filter", &self.filter)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Start a fluent chain for a registered kind name
    pub fn kind(&self, kind_name: &str) -> Result<K8s> {
        Ok(K8s {
            client: self.clone(),
            gvk: registry::lookup(kind_name)?,
            filter: Filter::default(),
        })
    }

    /// Start a fluent chain for explicit kind coordinates
    pub fn kind_with(&self, gvk: GroupVersionKind) -> K8s {
        K8s {
            client: self.clone(),
            gvk,
            filter: Filter::default(),
        }
    }

    /// Perform a request against an arbitrary apiserver path.
    ///
    /// No kind or path inference happens here; the path is joined onto the
    /// cluster URL as-is. The decoded body is returned on 2xx, and the error
    /// envelope is raised otherwise.
    pub async fn raw(&self, path: &str, method: http::Method) -> Result<Value> {
        let req = http::Request::builder()
            .method(method)
            .uri(path)
            .body(vec![])
            .map_err(Error::HttpError)?;
        self.request(req).await
    }
}

impl K8s {
    /// Add a field selector entry; a repeated key overwrites
    #[must_use]
    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.filter = self.filter.field(key, value);
        self
    }

    /// Add a label selector entry; an empty value selects bare existence
    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.filter = self.filter.label(key, value);
        self
    }

    /// Scope the chain to a namespace; fails if one is already set
    pub fn in_namespace(mut self, namespace: &str) -> Result<Self> {
        self.filter = self.filter.within(namespace)?;
        Ok(self)
    }

    /// Address a single object by name; fails if one is already set
    pub fn named(mut self, name: &str) -> Result<Self> {
        self.filter = self.filter.named(name)?;
        Ok(self)
    }

    /// The client behind this chain
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The kind coordinates behind this chain
    pub fn gvk(&self) -> &GroupVersionKind {
        &self.gvk
    }

    /// The accumulated filter set
    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    fn request(&self) -> Result<Request> {
        self.request_in(self.filter.namespace.as_deref())
    }

    fn request_in(&self, namespace: Option<&str>) -> Result<Request> {
        Ok(Request::for_kind(&self.gvk, namespace)?)
    }

    fn list_params(&self) -> ListParams {
        let mut lp = ListParams::default();
        if let Some(fields) = self.filter.field_selector() {
            lp = lp.fields(&fields);
        }
        if let Some(labels) = self.filter.label_selector() {
            lp = lp.labels(&labels);
        }
        lp
    }

    /// Reject a verb-level name when the chain already carries one
    fn verb_name<'a>(&self, name: &'a str) -> Result<&'a str> {
        if self.filter.name.is_some() {
            return Err(CoreError::NameAlreadySet.into());
        }
        Ok(name)
    }

    /// The namespace an object-carrying verb should address
    fn object_namespace<'a>(&'a self, obj: &'a DynamicObject) -> Option<&'a str> {
        self.filter.namespace.as_deref().or(obj.namespace())
    }

    /// Fill in apiVersion/kind from the chain when the object lacks them
    fn with_types(&self, obj: &DynamicObject) -> DynamicObject {
        let mut obj = obj.clone();
        if obj.types.is_none() {
            obj.types = Some(k8s_fluent_core::TypeMeta {
                api_version: self.gvk.api_version(),
                kind: self.gvk.kind.clone(),
            });
        }
        obj
    }

    async fn fetch_object(&self, name: &str) -> Result<DynamicObject> {
        let req = self.request()?.get(name)?;
        self.client.request(req).await
    }
}

/// Terminal verbs
impl K8s {
    /// Get a named resource
    pub async fn get(&self, name: &str) -> Result<DynamicObject> {
        let name = self.verb_name(name)?;
        self.fetch_object(name).await
    }

    /// Get a named resource if it exists, `None` if it does not
    pub async fn get_opt(&self, name: &str) -> Result<Option<DynamicObject>> {
        match self.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(Error::Api(e)) if e.code == 404 => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// List resources matching the chain's filters
    pub async fn list(&self) -> Result<ObjectList<DynamicObject>> {
        let req = self.request()?.list(&self.list_params())?;
        self.client.request(req).await
    }

    /// Create a resource; the name travels in the body, not the path
    pub async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let obj = self.with_types(obj);
        let req = self
            .request_in(self.object_namespace(&obj))?
            .create(serde_json::to_vec(&obj)?)?;
        self.client.request(req).await
    }

    /// Server-side apply of a full object
    ///
    /// Field-manager conflicts are surfaced verbatim; retry with
    /// [`ApplyParams::force`] to take ownership.
    pub async fn apply(&self, obj: &DynamicObject, ap: &ApplyParams) -> Result<DynamicObject> {
        let obj = self.with_types(obj);
        let name = obj
            .name()
            .ok_or_else(|| CoreError::Validation("apply requires metadata.name".into()))?
            .to_string();
        let req = self
            .request_in(self.object_namespace(&obj))?
            .apply(&name, ap, serde_json::to_vec(&obj)?)?;
        self.client.request(req).await
    }

    /// Patch a named resource with JSON-Patch operations or a merge patch
    pub async fn patch(&self, name: &str, patch: &Patch<Value>) -> Result<DynamicObject> {
        let name = self.verb_name(name)?;
        if matches!(patch, Patch::Apply(_)) {
            return Err(CoreError::Validation(
                "use apply() for server-side apply so field-manager parameters are attached".into(),
            )
            .into());
        }
        let req = self.request()?.patch(name, patch)?;
        self.client.request(req).await
    }

    /// Merge-patch the status subresource from an object carrying `status`
    pub async fn patch_status(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let name = obj
            .name()
            .ok_or_else(|| CoreError::Validation("patch_status requires metadata.name".into()))?
            .to_string();
        let status = obj
            .data
            .get("status")
            .cloned()
            .ok_or_else(|| CoreError::Validation("patch_status requires a status field".into()))?;
        let body = serde_json::to_vec(&serde_json::json!({ "status": status }))?;
        let req = self
            .request_in(self.object_namespace(obj))?
            .patch_status(&name, body)?;
        match self.client.request(req).await {
            Err(Error::Api(mut e)) if e.code == 404 => {
                e.message
                    .push_str(" (the resource may not have a status subresource)");
                Err(Error::Api(e))
            }
            other => other,
        }
    }

    /// Delete a named resource; a missing object is not an error
    pub async fn delete(&self, name: &str) -> Result<()> {
        let name = self.verb_name(name)?;
        let req = self.request()?.delete(name)?;
        match self.client.request_text(req).await {
            Ok(_) => Ok(()),
            Err(Error::Api(e)) if e.code == 404 => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Evict a named object; a missing object is not an error
    pub async fn evict(&self, name: &str) -> Result<()> {
        let name = self.verb_name(name)?;
        self.evict_in(name, self.filter.namespace.as_deref()).await
    }

    /// Evict using an object's own name and namespace
    pub async fn evict_object(&self, obj: &DynamicObject) -> Result<()> {
        let name = obj
            .name()
            .ok_or_else(|| CoreError::Validation("evict requires metadata.name".into()))?
            .to_string();
        self.evict_in(&name, self.object_namespace(obj)).await
    }

    async fn evict_in(&self, name: &str, namespace: Option<&str>) -> Result<()> {
        let req = self.request_in(namespace)?.evict(name, namespace)?;
        match self.client.request_text(req).await {
            Ok(_) => Ok(()),
            Err(Error::Api(e)) if e.code == 404 => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Fetch logs for a named object.
    ///
    /// Pods are read directly. Workload controllers and Services are
    /// resolved through their selector: matching pods are listed and their
    /// logs concatenated, each non-empty line prefixed with `[pod/<name>] `.
    pub async fn logs(&self, name: &str, lp: &LogParams) -> Result<String> {
        let name = self.verb_name(name)?;
        if self.gvk.kind == "Pod" {
            let req = self.request()?.logs(name, lp)?;
            return self.client.request_text(req).await;
        }

        let owner = self.fetch_object(name).await?;
        let selector = match self.gvk.kind.as_str() {
            "Service" => owner.data.pointer("/spec/selector"),
            _ => owner.data.pointer("/spec/selector/matchLabels"),
        }
        .and_then(Value::as_object)
        .filter(|labels| !labels.is_empty())
        .ok_or_else(|| {
            CoreError::Validation(format!("{} {} has no pod selector", self.gvk.kind, name))
        })?;

        let label_selector = selector
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.as_str().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(",");

        let pod_request = Request::for_kind(&registry::lookup("Pod")?, self.filter.namespace.as_deref())?;
        let pods: ObjectList<DynamicObject> = self
            .client
            .request(pod_request.list(&ListParams::default().labels(&label_selector))?)
            .await?;

        let mut out = Vec::new();
        for pod in &pods {
            let Some(pod_name) = pod.name() else { continue };
            let text = self
                .client
                .request_text(pod_request.logs(pod_name, lp)?)
                .await?;
            for line in text.lines().filter(|line| !line.is_empty()) {
                out.push(format!("[pod/{pod_name}] {line}"));
            }
        }
        Ok(out.join("\n"))
    }

    /// Set the replica count through the scale subresource
    pub async fn scale(&self, name: &str, replicas: i32) -> Result<()> {
        let name = self.verb_name(name)?;
        if !SCALABLE_KINDS.contains(&self.gvk.kind.as_str()) {
            return Err(CoreError::UnsupportedSubresource(self.gvk.kind.clone(), "scale").into());
        }
        let req = self.request()?.scale(name, replicas)?;
        self.client.request_text(req).await?;
        Ok(())
    }

    /// Proxy a GET through to a named object, optionally on a port
    pub async fn proxy(&self, name: &str, port: Option<u16>) -> Result<String> {
        let name = self.verb_name(name)?;
        if !PROXYABLE_KINDS.contains(&self.gvk.kind.as_str()) {
            return Err(CoreError::UnsupportedSubresource(self.gvk.kind.clone(), "proxy").into());
        }
        let req = self.request()?.proxy(name, port)?;
        self.client.request_text(req).await
    }

    /// Add or remove a finalizer on a named object.
    ///
    /// Returns `None` when the object already matches the requested state.
    /// Otherwise the controller-owned metadata fields are stripped and the
    /// object re-applied with `force=true` and the updated finalizer list.
    pub async fn finalize(
        &self,
        name: &str,
        op: FinalizerOp,
        finalizer: &str,
    ) -> Result<Option<DynamicObject>> {
        let name = self.verb_name(name)?;
        let obj = self.fetch_object(name).await?;
        let mut finalizers = obj.finalizers();
        let present = finalizers.iter().any(|f| f == finalizer);
        match op {
            FinalizerOp::Add if present => return Ok(None),
            FinalizerOp::Remove if !present => return Ok(None),
            FinalizerOp::Add => finalizers.push(finalizer.to_string()),
            FinalizerOp::Remove => finalizers.retain(|f| f != finalizer),
        }

        let mut updated = self.with_types(&obj);
        updated.metadata.managed_fields = None;
        updated.metadata.resource_version = None;
        updated.metadata.uid = None;
        updated.metadata.creation_timestamp = None;
        updated.metadata.generation = None;
        updated.metadata.finalizers = Some(finalizers);

        self.apply(&updated, &ApplyParams::default().force())
            .await
            .map(Some)
    }

    /// Perform a request against an arbitrary apiserver path
    ///
    /// Equivalent to [`Client::raw`]; no kind or path inference.
    pub async fn raw(&self, path: &str, method: http::Method) -> Result<Value> {
        self.client.raw(path, method).await
    }
}
