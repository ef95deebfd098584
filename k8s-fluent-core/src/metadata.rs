//! Structural metadata types common to all Kubernetes objects.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Type information attached to an object (`apiVersion` + `kind`)
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// The version of the API
    pub api_version: String,
    /// The name of the API
    pub kind: String,
}

/// Standard object metadata, structurally typed.
///
/// Only the fields this library reads or rewrites are modeled; anything else
/// a server attaches is dropped on deserialize and never round-tripped.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// The unique name of this object within its namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The namespace this object lives in, when namespaced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// The server-assigned unique identifier, stable across updates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// The server-assigned opaque version cursor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Sequence number representing a specific generation of the desired state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,

    /// Server-assigned creation timestamp (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,

    /// Map of string keys and values used to organize and categorize objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// Unstructured key value map stored alongside the object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,

    /// Names that block deletion until cleared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finalizers: Option<Vec<String>>,

    /// Field-manager bookkeeping, carried opaquely.
    ///
    /// Stripped (along with the other controller-owned fields) before the
    /// finalizer path re-applies an object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_fields: Option<serde_json::Value>,
}

/// Metadata on list envelopes
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// The resource version at which this list was assembled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,

    /// Token for fetching the next page of a chunked list
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
}
