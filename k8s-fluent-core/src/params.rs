//! Request parameter types for list/watch/apply/log calls.
use serde::Serialize;

use crate::{Error, Result};

/// The fieldManager identifier sent on server-side apply when the caller
/// does not choose their own
pub const DEFAULT_FIELD_MANAGER: &str = "k8s-fluent";

/// Common query parameters used in list and watch calls on collections
#[derive(Clone, Debug, Default)]
pub struct ListParams {
    /// A selector to restrict the list of returned objects by their labels.
    ///
    /// Defaults to everything if `None`.
    pub label_selector: Option<String>,

    /// A selector to restrict the list of returned objects by their fields.
    ///
    /// Defaults to everything if `None`.
    pub field_selector: Option<String>,

    /// Limit the number of results.
    ///
    /// If there are more results, the server will respond with a continue token
    /// which can be used to fetch another page of results.
    pub limit: Option<u32>,

    /// Fetch a second page of results.
    ///
    /// After listing results with a limit, a continue token can be used to
    /// fetch another page of results.
    pub continue_token: Option<String>,
}

impl ListParams {
    /// Configure the selector to restrict returned objects by their fields
    #[must_use]
    pub fn fields(mut self, field_selector: &str) -> Self {
        self.field_selector = Some(field_selector.to_string());
        self
    }

    /// Configure the selector to restrict returned objects by their labels
    #[must_use]
    pub fn labels(mut self, label_selector: &str) -> Self {
        self.label_selector = Some(label_selector.to_string());
        self
    }

    /// Sets a result limit
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets a continue token
    #[must_use]
    pub fn continue_token(mut self, token: &str) -> Self {
        self.continue_token = Some(token.to_string());
        self
    }

    pub(crate) fn populate_qp(&self, qp: &mut form_urlencoded::Serializer<String>) {
        if let Some(fields) = &self.field_selector {
            qp.append_pair("fieldSelector", fields);
        }
        if let Some(labels) = &self.label_selector {
            qp.append_pair("labelSelector", labels);
        }
        if let Some(limit) = &self.limit {
            qp.append_pair("limit", &limit.to_string());
        }
        if let Some(token) = &self.continue_token {
            qp.append_pair("continue", token);
        }
    }
}

/// Query parameters for server-side apply
#[derive(Clone, Debug)]
pub struct ApplyParams {
    /// The name of the actor making these changes
    pub field_manager: String,
    /// Force the apply through on field-manager conflicts
    pub force: bool,
}

impl Default for ApplyParams {
    fn default() -> Self {
        Self {
            field_manager: DEFAULT_FIELD_MANAGER.to_string(),
            force: false,
        }
    }
}

impl ApplyParams {
    /// Use a caller-chosen field manager
    #[must_use]
    pub fn manager(mut self, manager: &str) -> Self {
        self.field_manager = manager.to_string();
        self
    }

    /// Force the result through on conflicts
    #[must_use]
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.field_manager.len() > 128 {
            return Err(Error::Validation(
                "ApplyParams::field_manager must be at most 128 characters".into(),
            ));
        }
        Ok(())
    }

    pub(crate) fn populate_qp(&self, qp: &mut form_urlencoded::Serializer<String>) {
        qp.append_pair("fieldManager", &self.field_manager);
        qp.append_pair("fieldValidation", "Strict");
        if self.force {
            qp.append_pair("force", "true");
        }
    }
}

/// Describes changes that should be applied to a resource
///
/// The variant dictates the `Content-Type` the server dispatches on:
/// server-side apply is `application/apply-patch+yaml` (a JSON payload is
/// valid YAML), [`Patch::Json`] is an RFC 6902 document, and [`Patch::Merge`]
/// is an RFC 7386 merge patch.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum Patch<T: Serialize> {
    /// Server-side apply of a full object
    Apply(T),
    /// JSON patch operations
    Json(json_patch::Patch),
    /// JSON merge patch
    Merge(T),
}

impl<T: Serialize> Patch<T> {
    pub(crate) fn content_type(&self) -> &'static str {
        match &self {
            Self::Apply(_) => "application/apply-patch+yaml",
            Self::Json(_) => "application/json-patch+json",
            Self::Merge(_) => "application/merge-patch+json",
        }
    }

    pub(crate) fn serialize(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Apply(p) => serde_json::to_vec(p),
            Self::Json(p) => serde_json::to_vec(p),
            Self::Merge(p) => serde_json::to_vec(p),
        }
    }
}

/// Params for log fetching
#[derive(Default, Clone, Debug)]
pub struct LogParams {
    /// The container for which to fetch logs. Defaults to the only container
    /// if there is one container in the pod.
    pub container: Option<String>,
    /// Follow the log stream of the pod. Defaults to `false`.
    pub follow: bool,
    /// If set, the number of bytes to read from the server before terminating
    /// the log output.
    pub limit_bytes: Option<i64>,
    /// If `true`, then the output is pretty printed.
    pub pretty: bool,
    /// Return previous terminated container logs. Defaults to `false`.
    pub previous: bool,
    /// A relative time in seconds before the current time from which to show logs.
    pub since_seconds: Option<i64>,
    /// If set, the number of lines from the end of the logs to show.
    pub tail_lines: Option<i64>,
    /// If `true`, add an RFC3339 timestamp at the beginning of every line.
    pub timestamps: bool,
}

impl LogParams {
    pub(crate) fn populate_qp(&self, qp: &mut form_urlencoded::Serializer<String>) {
        if let Some(container) = &self.container {
            qp.append_pair("container", container);
        }
        if self.follow {
            qp.append_pair("follow", "true");
        }
        if let Some(lb) = &self.limit_bytes {
            qp.append_pair("limitBytes", &lb.to_string());
        }
        if self.pretty {
            qp.append_pair("pretty", "true");
        }
        if self.previous {
            qp.append_pair("previous", "true");
        }
        if let Some(ss) = &self.since_seconds {
            qp.append_pair("sinceSeconds", &ss.to_string());
        }
        if let Some(tl) = &self.tail_lines {
            qp.append_pair("tailLines", &tl.to_string());
        }
        if self.timestamps {
            qp.append_pair("timestamps", "true");
        }
    }
}
