//! Dynamic object and list envelope wrappers.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    gvk::GroupVersionKind,
    metadata::{ListMeta, ObjectMeta, TypeMeta},
};

/// A structural representation of an arbitrary Kubernetes object.
///
/// `spec`, `status` and any other top-level fields are preserved opaquely in
/// `data`; only the type and metadata fields are modeled.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DynamicObject {
    /// The type fields, not always present
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,

    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// All other keys
    #[serde(flatten)]
    pub data: serde_json::Value,
}

impl DynamicObject {
    /// Create a named object for a given kind, with no data attached
    #[must_use]
    pub fn new(name: &str, gvk: &GroupVersionKind) -> Self {
        Self {
            types: Some(TypeMeta {
                api_version: gvk.api_version(),
                kind: gvk.kind.clone(),
            }),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            data: serde_json::json!({}),
        }
    }

    /// Attach opaque data (`spec`, `status`, ...)
    #[must_use]
    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Attach a namespace
    #[must_use]
    pub fn within(mut self, ns: &str) -> Self {
        self.metadata.namespace = Some(ns.into());
        self
    }

    /// The object name, when present
    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }

    /// The object namespace, when present
    pub fn namespace(&self) -> Option<&str> {
        self.metadata.namespace.as_deref()
    }

    /// The server-assigned uid, when present
    pub fn uid(&self) -> Option<&str> {
        self.metadata.uid.as_deref()
    }

    /// The server-assigned resource version, when present
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// The object labels, empty if unset
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.metadata.labels.clone().unwrap_or_default()
    }

    /// The finalizer list, empty if unset
    pub fn finalizers(&self) -> Vec<String> {
        self.metadata.finalizers.clone().unwrap_or_default()
    }
}

/// A generic Kubernetes list envelope
///
/// Produced by list queries; also the unit of the watch engine's relist.
#[derive(Deserialize, Debug)]
pub struct ObjectList<T> {
    /// ListMeta - used for its `resourceVersion` and `continue` token
    #[serde(default)]
    pub metadata: ListMeta,

    /// The items of the collection
    #[serde(bound(deserialize = "Vec<T>: Deserialize<'de>"))]
    pub items: Vec<T>,
}

impl<T> ObjectList<T> {
    /// Returns an iterator over the elements of this list
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T> IntoIterator for ObjectList<T> {
    type IntoIter = std::vec::IntoIter<Self::Item>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ObjectList<T> {
    type IntoIter = std::slice::Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
