//! The accumulating filter set behind a fluent chain.

use std::collections::BTreeMap;

use crate::{Error, Result};

/// Selectors and addressing accumulated by a fluent chain.
///
/// Field and label selectors live in ordered maps so that rendered query
/// parameters are deterministic. `name` and `namespace` are single-shot:
/// setting either twice is an error rather than an overwrite.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    /// Field selector entries, rendered as a comma-joined `k=v` list
    pub fields: BTreeMap<String, String>,
    /// Label selector entries; an empty value renders as the bare key
    pub labels: BTreeMap<String, String>,
    /// Object name, when the chain addresses a single object
    pub name: Option<String>,
    /// Namespace for namespaced collections
    pub namespace: Option<String>,
}

impl Filter {
    /// Add a field selector entry; a repeated key overwrites
    #[must_use]
    pub fn field(mut self, key: &str, value: &str) -> Self {
        self.fields.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a label selector entry; an empty value means set-based "Exists"
    #[must_use]
    pub fn label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    /// Scope the chain to a namespace
    pub fn within(mut self, namespace: &str) -> Result<Self> {
        if self.namespace.is_some() {
            return Err(Error::NamespaceAlreadySet);
        }
        self.namespace = Some(namespace.to_string());
        Ok(self)
    }

    /// Address a single object by name
    pub fn named(mut self, name: &str) -> Result<Self> {
        if self.name.is_some() {
            return Err(Error::NameAlreadySet);
        }
        self.name = Some(name.to_string());
        Ok(self)
    }

    /// Render the `fieldSelector` query value, if any fields are set
    pub fn field_selector(&self) -> Option<String> {
        if self.fields.is_empty() {
            return None;
        }
        Some(
            self.fields
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Render the `labelSelector` query value, if any labels are set
    pub fn label_selector(&self) -> Option<String> {
        if self.labels.is_empty() {
            return None;
        }
        Some(
            self.labels
                .iter()
                .map(|(k, v)| {
                    if v.is_empty() {
                        k.clone()
                    } else {
                        format!("{k}={v}")
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selectors_render_in_key_order() {
        let f = Filter::default()
            .field("status.phase", "Running")
            .field("metadata.name", "blog")
            .label("app", "nginx")
            .label("tier", "web");
        assert_eq!(
            f.field_selector().unwrap(),
            "metadata.name=blog,status.phase=Running"
        );
        assert_eq!(f.label_selector().unwrap(), "app=nginx,tier=web");
    }

    #[test]
    fn empty_label_value_is_bare_key() {
        let f = Filter::default().label("critical", "").label("app", "db");
        assert_eq!(f.label_selector().unwrap(), "app=db,critical");
    }

    #[test]
    fn repeated_keys_overwrite() {
        let f = Filter::default().label("app", "a").label("app", "b");
        assert_eq!(f.label_selector().unwrap(), "app=b");
    }

    #[test]
    fn name_and_namespace_are_single_shot() {
        let f = Filter::default().within("default").unwrap();
        assert!(matches!(
            f.clone().within("other"),
            Err(Error::NamespaceAlreadySet)
        ));
        let f = f.named("pod-a").unwrap();
        assert!(matches!(f.named("pod-b"), Err(Error::NameAlreadySet)));
    }

    #[test]
    fn empty_filter_renders_nothing() {
        let f = Filter::default();
        assert_eq!(f.field_selector(), None);
        assert_eq!(f.label_selector(), None);
    }
}
