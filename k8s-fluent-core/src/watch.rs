//! Wire types for the watch api
//!
//! A watch response body is newline-delimited JSON; each line decodes to one
//! [`WatchEvent`].

use crate::{error::ErrorResponse, metadata::TypeMeta};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// A raw event returned from a watch query
#[derive(Deserialize, Serialize, Clone)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
pub enum WatchEvent<K> {
    /// Resource was added
    Added(K),
    /// Resource was modified
    Modified(K),
    /// Resource was deleted
    Deleted(K),
    /// Resource bookmark carrying only an updated resource version
    Bookmark(Bookmark),
    /// There was some kind of error.
    ///
    /// An error with `code == 410` means the requested resource version has
    /// been purged and the consumer must relist.
    Error(ErrorResponse),
}

impl<K> Debug for WatchEvent<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match &self {
            WatchEvent::Added(_) => write!(f, "Added event"),
            WatchEvent::Modified(_) => write!(f, "Modified event"),
            WatchEvent::Deleted(_) => write!(f, "Deleted event"),
            WatchEvent::Bookmark(_) => write!(f, "Bookmark event"),
            WatchEvent::Error(e) => write!(f, "Error event: {e:?}"),
        }
    }
}

/// Slimmed down object payload for [`WatchEvent::Bookmark`].
///
/// Bookmarks contain apiVersion + kind + basically empty metadata; only the
/// resource version can be relied upon.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Bookmark {
    /// apiVersion + kind
    #[serde(flatten)]
    pub types: TypeMeta,

    /// Basically empty metadata
    pub metadata: BookmarkMeta,
}

/// Slimmed down metadata for [`WatchEvent::Bookmark`]
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkMeta {
    /// The only field that can be relied upon on a bookmark
    pub resource_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::DynamicObject;

    #[test]
    fn decodes_tagged_events() {
        let line = r#"{"type":"ADDED","object":{"apiVersion":"v1","kind":"Pod","metadata":{"name":"a","uid":"u1","resourceVersion":"1"}}}"#;
        match serde_json::from_str::<WatchEvent<DynamicObject>>(line).unwrap() {
            WatchEvent::Added(obj) => assert_eq!(obj.uid(), Some("u1")),
            other => panic!("expected Added, got {other:?}"),
        }
    }

    #[test]
    fn decodes_bookmark() {
        let line = r#"{"type":"BOOKMARK","object":{"apiVersion":"v1","kind":"Pod","metadata":{"resourceVersion":"123"}}}"#;
        match serde_json::from_str::<WatchEvent<DynamicObject>>(line).unwrap() {
            WatchEvent::Bookmark(bm) => assert_eq!(bm.metadata.resource_version, "123"),
            other => panic!("expected Bookmark, got {other:?}"),
        }
    }

    #[test]
    fn decodes_gone_error() {
        let line = r#"{"type":"ERROR","object":{"kind":"Status","status":"Failure","message":"too old resource version","reason":"Expired","code":410}}"#;
        match serde_json::from_str::<WatchEvent<DynamicObject>>(line).unwrap() {
            WatchEvent::Error(e) => assert_eq!(e.code, 410),
            other => panic!("expected Error, got {other:?}"),
        }
    }
}
