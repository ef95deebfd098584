//! Type coordinates for Kubernetes resources.
use std::str::FromStr;

use crate::metadata::TypeMeta;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to parse group version: {0}")]
/// Failed to parse group version
pub struct ParseGroupVersionError(pub String);

/// Core information about an API resource.
///
/// The `plural` is optional; when absent the conventional
/// `lowercase(kind) + "s"` rule applies (see [`GroupVersionKind::plural_name`]).
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersionKind {
    /// API group; empty for the core group
    pub group: String,
    /// Version
    pub version: String,
    /// Kind
    pub kind: String,
    /// Plural collection name, when it deviates from `lowercase(kind) + "s"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
}

impl GroupVersionKind {
    /// Construct from explicit group, version, and kind
    pub fn gvk(group_: &str, version_: &str, kind_: &str) -> Self {
        Self {
            group: group_.to_string(),
            version: version_.to_string(),
            kind: kind_.to_string(),
            plural: None,
        }
    }

    /// Override the plural collection name
    #[must_use]
    pub fn plural(mut self, plural: &str) -> Self {
        self.plural = Some(plural.to_string());
        self
    }

    /// The URL path segment for this kind's collection
    pub fn plural_name(&self) -> String {
        self.plural
            .clone()
            .unwrap_or_else(|| format!("{}s", self.kind.to_ascii_lowercase()))
    }

    /// Generate the apiVersion string used in a kind's yaml
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl TryFrom<&TypeMeta> for GroupVersionKind {
    type Error = ParseGroupVersionError;

    fn try_from(tm: &TypeMeta) -> Result<Self, Self::Error> {
        Ok(GroupVersion::from_str(&tm.api_version)?.with_kind(&tm.kind))
    }
}

/// Core information about a family of API resources
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupVersion {
    /// API group
    pub group: String,
    /// Version
    pub version: String,
}

impl GroupVersion {
    /// Construct from explicit group and version
    pub fn gv(group_: &str, version_: &str) -> Self {
        Self {
            group: group_.to_string(),
            version: version_.to_string(),
        }
    }

    /// Upgrade a GroupVersion to a GroupVersionKind
    pub fn with_kind(self, kind: &str) -> GroupVersionKind {
        GroupVersionKind {
            group: self.group,
            version: self.version,
            kind: kind.into(),
            plural: None,
        }
    }

    /// Generate the apiVersion string used in a kind's yaml
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }
}

impl FromStr for GroupVersion {
    type Err = ParseGroupVersionError;

    fn from_str(gv: &str) -> Result<Self, Self::Err> {
        let gvsplit = gv.splitn(2, '/').collect::<Vec<_>>();
        let (group, version) = match *gvsplit.as_slice() {
            [g, v] => (g.to_string(), v.to_string()), // standard case
            [v] => ("".to_string(), v.to_string()),   // core v1 case
            _ => return Err(ParseGroupVersionError(gv.into())),
        };
        Ok(Self { group, version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gvk_from_type_meta() {
        let tm = TypeMeta {
            api_version: "apps/v1".into(),
            kind: "Deployment".into(),
        };
        let gvk = GroupVersionKind::try_from(&tm).unwrap();
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");

        let core = TypeMeta {
            api_version: "v1".into(),
            kind: "Pod".into(),
        };
        let gvk = GroupVersionKind::try_from(&core).unwrap();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.api_version(), "v1");
    }

    #[test]
    fn plural_defaulting() {
        let pod = GroupVersionKind::gvk("", "v1", "Pod");
        assert_eq!(pod.plural_name(), "pods");

        let ingress = GroupVersionKind::gvk("networking.k8s.io", "v1", "Ingress").plural("ingresses");
        assert_eq!(ingress.plural_name(), "ingresses");
    }
}
