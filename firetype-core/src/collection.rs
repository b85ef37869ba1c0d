//! Typed handle to a collection and its query builder.
//!
//! A [`CollectionRef`] addresses a collection and carries a [`Query`] value. Query-building
//! methods never modify the handle they are called on; each returns a new handle holding
//! the refined query, so intermediate handles can be shared and reused freely.
//!
//! # Example
//!
//! ```ignore
//! use firetype::query::Direction;
//!
//! let top_two = db
//!     .collection("scores")
//!     .where_("season", "==", 1)
//!     .order_by("points", Direction::Desc)
//!     .limit(2)
//!     .get::<Score>()
//!     .await?;
//!
//! top_two.for_each(|doc, index, _| println!("{index}: {}", doc.id()));
//! ```

use bson::Bson;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, sync::Arc};
use tracing::debug;

use crate::{
    backend::DynDatabaseBackend,
    document::to_fields,
    error::DatabaseResult,
    path::CollectionPath,
    query::{Direction, Expr, FieldOp, Query},
    reference::DocumentRef,
    snapshot::QuerySnapshot,
};

/// A handle addressing a collection, with the query constraints accumulated so far.
#[derive(Clone)]
pub struct CollectionRef {
    backend: Arc<dyn DynDatabaseBackend>,
    path: CollectionPath,
    query: Query,
}

impl CollectionRef {
    pub(crate) fn new(backend: Arc<dyn DynDatabaseBackend>, path: CollectionPath) -> Self {
        Self {
            backend,
            path,
            query: Query::default(),
        }
    }

    fn with_query(&self, query: Query) -> Self {
        Self {
            backend: self.backend.clone(),
            path: self.path.clone(),
            query,
        }
    }

    /// The last segment of the collection path.
    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn path(&self) -> &CollectionPath {
        &self.path
    }

    /// The document owning this collection, or `None` for a top-level collection.
    pub fn parent(&self) -> Option<DocumentRef> {
        self.path
            .parent()
            .map(|path| DocumentRef::new(self.backend.clone(), path))
    }

    /// The constraints accumulated on this handle.
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn raw(&self) -> &dyn DynDatabaseBackend {
        self.backend.as_ref()
    }

    /// Addresses a document directly inside this collection.
    pub fn doc(&self, id: &str) -> DocumentRef {
        DocumentRef::new(self.backend.clone(), self.path.doc(id))
    }

    /// Adds a document with a backend-generated id and returns its reference.
    pub async fn add<T: Serialize>(&self, data: &T) -> DatabaseResult<DocumentRef> {
        let fields = to_fields(data)?;
        debug!(target: "firetype::collection", collection = %self.path, "Adding document");

        let path = self
            .backend
            .add_document(&self.path, fields)
            .await?;

        Ok(DocumentRef::new(self.backend.clone(), path))
    }

    /// Adds a field filter. The operator string is not checked here; an unsupported
    /// operator is rejected by the backend when the query runs.
    pub fn where_(
        &self,
        field: impl Into<String>,
        op: impl Into<FieldOp>,
        value: impl Into<Bson>,
    ) -> Self {
        self.where_filter(Expr::field(field, op, value))
    }

    /// Adds a filter expression, which may be an `And`/`Or` composite.
    pub fn where_filter(&self, filter: Expr) -> Self {
        self.with_query(self.query.clone().with_filter(filter))
    }

    /// Orders results by `field`. `None` orders ascending.
    pub fn order_by(&self, field: impl Into<String>, direction: impl Into<Option<Direction>>) -> Self {
        let direction = direction.into().unwrap_or_default();
        self.with_query(self.query.clone().with_order(field, direction))
    }

    pub fn limit(&self, limit: usize) -> Self {
        self.with_query(self.query.clone().with_limit(limit))
    }

    pub fn offset(&self, offset: usize) -> Self {
        self.with_query(self.query.clone().with_offset(offset))
    }

    /// Starts the result set at the given order-by values, inclusive.
    pub fn start_at(&self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        self.with_query(self.query.clone().with_start(cursor_values(values), true))
    }

    /// Starts the result set after the given order-by values.
    pub fn start_after(&self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        self.with_query(self.query.clone().with_start(cursor_values(values), false))
    }

    /// Ends the result set at the given order-by values, inclusive.
    pub fn end_at(&self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        self.with_query(self.query.clone().with_end(cursor_values(values), true))
    }

    /// Ends the result set before the given order-by values.
    pub fn end_before(&self, values: impl IntoIterator<Item = impl Into<Bson>>) -> Self {
        self.with_query(self.query.clone().with_end(cursor_values(values), false))
    }

    /// Executes the accumulated query.
    pub async fn get<T: DeserializeOwned>(&self) -> DatabaseResult<QuerySnapshot<T>> {
        debug!(
            target: "firetype::collection",
            collection = %self.path,
            filters = self.query.filters.len(),
            orders = self.query.orders.len(),
            "Running query"
        );

        let raw = self
            .backend
            .run_query(&self.path, &self.query)
            .await?;

        Ok(QuerySnapshot::new(raw, self.query.clone(), self.backend.clone()))
    }
}

fn cursor_values(values: impl IntoIterator<Item = impl Into<Bson>>) -> Vec<Bson> {
    values.into_iter().map(Into::into).collect()
}

impl fmt::Debug for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionRef")
            .field("path", &self.path)
            .field("query", &self.query)
            .finish()
    }
}
