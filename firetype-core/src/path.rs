//! Slash-separated addresses for collections and documents, and dotted field paths.
//!
//! Paths are plain values: building one never touches the backend and never fails.
//! A collection path has an odd number of segments (`users`, `users/fleker/posts`), a
//! document path an even number (`users/fleker`). No segment validation happens here;
//! malformed addresses are rejected by the backend when used.

use bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Field path that denotes the document id in filters and orderings.
pub const FIELD_DOCUMENT_ID: &str = "__name__";

/// The address of a collection, top-level or nested under a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Creates a collection path from its full slash-separated form.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the last segment of the path.
    pub fn id(&self) -> &str {
        last_segment(&self.0)
    }

    /// Returns the full path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the document owning this collection, or `None` for a top-level collection.
    pub fn parent(&self) -> Option<DocumentPath> {
        self.0
            .rsplit_once('/')
            .map(|(parent, _)| DocumentPath::new(parent))
    }

    /// Addresses a document directly inside this collection.
    pub fn doc(&self, id: &str) -> DocumentPath {
        DocumentPath::new(format!("{}/{}", self.0, id))
    }

    /// Whether `path` addresses a document directly inside this collection.
    pub fn contains(&self, path: &DocumentPath) -> bool {
        path.as_str()
            .strip_prefix(self.0.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|id| !id.is_empty() && !id.contains('/'))
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CollectionPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// The address of a single document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath(String);

impl DocumentPath {
    /// Creates a document path from its full slash-separated form.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Returns the document id, the last segment of the path.
    pub fn id(&self) -> &str {
        last_segment(&self.0)
    }

    /// Returns the full path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the collection containing this document.
    pub fn parent(&self) -> CollectionPath {
        match self.0.rsplit_once('/') {
            Some((parent, _)) => CollectionPath::new(parent),
            None => CollectionPath::new(""),
        }
    }

    /// Addresses a sub-collection of this document.
    pub fn collection(&self, name: &str) -> CollectionPath {
        CollectionPath::new(format!("{}/{}", self.0, name))
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Reads the value at a dotted field path such as `address.city`.
pub fn lookup_field<'a>(fields: &'a Document, field_path: &str) -> Option<&'a Bson> {
    let mut segments = field_path.split('.');
    let mut current = fields.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Writes `value` at a dotted field path, creating intermediate maps as needed.
///
/// A non-map value sitting on an intermediate segment is replaced by a map.
pub fn set_field(fields: &mut Document, field_path: &str, value: Bson) {
    match field_path.split_once('.') {
        None => {
            fields.insert(field_path, value);
        }
        Some((head, rest)) => {
            if !matches!(fields.get(head), Some(Bson::Document(_))) {
                fields.insert(head, Document::new());
            }

            if let Some(Bson::Document(child)) = fields.get_mut(head) {
                set_field(child, rest, value);
            }
        }
    }
}
