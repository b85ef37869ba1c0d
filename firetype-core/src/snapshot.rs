//! Point-in-time document reads, untyped and typed.
//!
//! Backends return [`RawSnapshot`] and [`RawQuerySnapshot`]. The typed wrappers
//! [`DocumentSnapshot<T>`], [`QueryDocument<T>`] and [`QuerySnapshot<T>`] are projections
//! over them: `T` has no runtime representation and only shapes what the accessors decode.

use bson::{Bson, Document, de::deserialize_from_bson};
use serde::de::DeserializeOwned;
use std::{fmt, marker::PhantomData, sync::Arc};

use crate::{
    backend::DynDatabaseBackend,
    document::from_fields,
    error::{DatabaseError, DatabaseResult},
    path::{DocumentPath, FIELD_DOCUMENT_ID, lookup_field},
    query::Query,
    reference::DocumentRef,
    timestamp::Timestamp,
};

/// An untyped point-in-time read of one document, as produced by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSnapshot {
    path: DocumentPath,
    fields: Option<Document>,
    create_time: Option<Timestamp>,
    update_time: Option<Timestamp>,
    read_time: Timestamp,
}

impl RawSnapshot {
    /// A snapshot of an existing document.
    pub fn found(
        path: DocumentPath,
        fields: Document,
        create_time: Timestamp,
        update_time: Timestamp,
        read_time: Timestamp,
    ) -> Self {
        Self {
            path,
            fields: Some(fields),
            create_time: Some(create_time),
            update_time: Some(update_time),
            read_time,
        }
    }

    /// A snapshot recording that no document exists at `path`.
    pub fn missing(path: DocumentPath, read_time: Timestamp) -> Self {
        Self {
            path,
            fields: None,
            create_time: None,
            update_time: None,
            read_time,
        }
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.fields.is_some()
    }

    /// The stored fields, or `None` if the document does not exist.
    pub fn data(&self) -> Option<&Document> {
        self.fields.as_ref()
    }

    pub fn into_data(self) -> Option<Document> {
        self.fields
    }

    /// Reads one field by dotted path. `__name__` yields the document id.
    pub fn get(&self, field_path: &str) -> Option<Bson> {
        if field_path == FIELD_DOCUMENT_ID {
            return self
                .exists()
                .then(|| Bson::String(self.id().to_string()));
        }

        self.fields
            .as_ref()
            .and_then(|fields| lookup_field(fields, field_path))
            .cloned()
    }

    pub fn create_time(&self) -> Option<Timestamp> {
        self.create_time
    }

    pub fn update_time(&self) -> Option<Timestamp> {
        self.update_time
    }

    pub fn read_time(&self) -> Timestamp {
        self.read_time
    }

    /// Whether both snapshots describe the same document state.
    ///
    /// Path, existence, update time and fields are compared; the read time is not.
    pub fn is_equal(&self, other: &RawSnapshot) -> bool {
        self.path == other.path
            && self.update_time == other.update_time
            && self.fields == other.fields
    }
}

/// The untyped result of a query, as produced by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawQuerySnapshot {
    /// Matching documents, in result order.
    pub docs: Vec<RawSnapshot>,
    /// The time the query was evaluated.
    pub read_time: Timestamp,
}

/// A typed point-in-time read of one document.
pub struct DocumentSnapshot<T> {
    raw: RawSnapshot,
    backend: Arc<dyn DynDatabaseBackend>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DocumentSnapshot<T> {
    pub(crate) fn new(raw: RawSnapshot, backend: Arc<dyn DynDatabaseBackend>) -> Self {
        Self {
            raw,
            backend,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        self.raw.id()
    }

    pub fn exists(&self) -> bool {
        self.raw.exists()
    }

    /// The reference of the document this snapshot was read from.
    pub fn reference(&self) -> DocumentRef {
        DocumentRef::new(self.backend.clone(), self.raw.path().clone())
    }

    pub fn read_time(&self) -> Timestamp {
        self.raw.read_time()
    }

    /// The untyped snapshot returned by the backend.
    pub fn raw(&self) -> &RawSnapshot {
        &self.raw
    }

    pub fn into_raw(self) -> RawSnapshot {
        self.raw
    }
}

impl<T: DeserializeOwned> DocumentSnapshot<T> {
    /// Decodes the document, or returns `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Serialization`](crate::error::DatabaseError::Serialization)
    /// if the stored fields do not match `T`.
    pub fn data(&self) -> DatabaseResult<Option<T>> {
        self.raw
            .data()
            .map(|fields| from_fields(fields.clone()))
            .transpose()
    }
}

impl<T> Clone for DocumentSnapshot<T> {
    fn clone(&self) -> Self {
        Self::new(self.raw.clone(), self.backend.clone())
    }
}

impl<T> fmt::Debug for DocumentSnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSnapshot")
            .field("raw", &self.raw)
            .finish()
    }
}

/// One document within a query result. It always exists.
pub struct QueryDocument<T> {
    raw: RawSnapshot,
    backend: Arc<dyn DynDatabaseBackend>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> QueryDocument<T> {
    pub(crate) fn new(raw: RawSnapshot, backend: Arc<dyn DynDatabaseBackend>) -> Self {
        Self {
            raw,
            backend,
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        self.raw.id()
    }

    pub fn exists(&self) -> bool {
        self.raw.exists()
    }

    pub fn create_time(&self) -> Option<Timestamp> {
        self.raw.create_time()
    }

    pub fn update_time(&self) -> Option<Timestamp> {
        self.raw.update_time()
    }

    pub fn read_time(&self) -> Timestamp {
        self.raw.read_time()
    }

    pub fn reference(&self) -> DocumentRef {
        DocumentRef::new(self.backend.clone(), self.raw.path().clone())
    }

    pub fn raw(&self) -> &RawSnapshot {
        &self.raw
    }

    /// Reads one field by dotted path without decoding it.
    pub fn get_raw(&self, field_path: &str) -> Option<Bson> {
        self.raw.get(field_path)
    }

    /// Reads and decodes one field by dotted path.
    ///
    /// Returns `None` if the field is absent, or if it holds null and `V` cannot represent it.
    pub fn get<V: DeserializeOwned>(&self, field_path: &str) -> DatabaseResult<Option<V>> {
        match self.raw.get(field_path) {
            None => Ok(None),
            Some(Bson::Null) => Ok(deserialize_from_bson::<V>(Bson::Null).ok()),
            Some(value) => deserialize_from_bson::<V>(value)
                .map(Some)
                .map_err(DatabaseError::from),
        }
    }

    /// Whether both documents describe the same stored state; not a comparison of `T`.
    pub fn is_equal(&self, other: &QueryDocument<T>) -> bool {
        self.raw.is_equal(&other.raw)
    }
}

impl<T: DeserializeOwned> QueryDocument<T> {
    /// Decodes the whole document.
    pub fn data(&self) -> DatabaseResult<T> {
        from_fields(self.raw.data().cloned().unwrap_or_default())
    }
}

impl<T> PartialEq for QueryDocument<T> {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl<T> Clone for QueryDocument<T> {
    fn clone(&self) -> Self {
        Self::new(self.raw.clone(), self.backend.clone())
    }
}

impl<T> fmt::Debug for QueryDocument<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryDocument")
            .field("raw", &self.raw)
            .finish()
    }
}

/// The typed result of a terminal `get` on a collection.
pub struct QuerySnapshot<T> {
    docs: Vec<QueryDocument<T>>,
    read_time: Timestamp,
    query: Query,
}

impl<T> QuerySnapshot<T> {
    pub(crate) fn new(
        raw: RawQuerySnapshot,
        query: Query,
        backend: Arc<dyn DynDatabaseBackend>,
    ) -> Self {
        let docs = raw
            .docs
            .into_iter()
            .map(|doc| QueryDocument::new(doc, backend.clone()))
            .collect();

        Self {
            docs,
            read_time: raw.read_time,
            query,
        }
    }

    pub fn docs(&self) -> &[QueryDocument<T>] {
        &self.docs
    }

    pub fn iter(&self) -> std::slice::Iter<'_, QueryDocument<T>> {
        self.docs.iter()
    }

    /// Calls `callback` with each document, its index, and the full result set.
    pub fn for_each<F>(&self, mut callback: F)
    where
        F: FnMut(&QueryDocument<T>, usize, &[QueryDocument<T>]),
    {
        for (index, doc) in self.docs.iter().enumerate() {
            callback(doc, index, &self.docs);
        }
    }

    pub fn size(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn read_time(&self) -> Timestamp {
        self.read_time
    }

    /// The query that produced this result.
    pub fn query(&self) -> &Query {
        &self.query
    }
}

impl<T> IntoIterator for QuerySnapshot<T> {
    type Item = QueryDocument<T>;
    type IntoIter = std::vec::IntoIter<QueryDocument<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a QuerySnapshot<T> {
    type Item = &'a QueryDocument<T>;
    type IntoIter = std::slice::Iter<'a, QueryDocument<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}

impl<T> fmt::Debug for QuerySnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySnapshot")
            .field("docs", &self.docs)
            .field("read_time", &self.read_time)
            .field("query", &self.query)
            .finish()
    }
}
