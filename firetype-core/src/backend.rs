//! Database backend abstraction.
//!
//! This module defines the contract between the typed wrappers and the underlying document
//! database client. The wrappers never store data, evaluate queries, or retry anything; each
//! of their operations forwards to exactly one call on these traits and re-types the result.
//!
//! # Traits
//!
//! - [`DatabaseBackend`]: The connection to a document database
//! - [`DynDatabaseBackend`]: Object-safe, downcastable form of a backend
//! - [`BackendTransaction`]: One attempt of an atomic read/write unit
//! - [`TransactionRunner`]: The callback a backend drives for each transaction attempt
//! - [`DatabaseBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use firetype::backend::DatabaseBackend;
//! use firetype::path::DocumentPath;
//! use bson::doc;
//!
//! let backend = MyBackendImpl::new();
//! let path = DocumentPath::new("users/fleker");
//!
//! backend.set_document(&path, doc! { "required": false }).await?;
//! let snapshot = backend.get_document(&path).await?;
//! assert!(snapshot.exists());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use async_trait::async_trait;
use bson::Document;
use std::{any::Any, fmt::Debug, sync::Arc};

use crate::{
    error::DatabaseResult,
    path::{CollectionPath, DocumentPath},
    query::Query,
    snapshot::{RawQuerySnapshot, RawSnapshot},
    timestamp::Timestamp,
};

/// The outcome of a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteResult {
    /// The commit time of the write.
    pub write_time: Timestamp,
}

/// Abstract interface for document database connections.
///
/// Implementers own every database semantic the wrappers expose: storage, consistency,
/// query execution, transaction isolation and retry-on-contention.
///
/// # Thread Safety
///
/// All implementations must be thread-safe and support concurrent access from multiple
/// async tasks.
///
/// # Error Handling
///
/// Operations return [`DatabaseResult<T>`](crate::error::DatabaseResult). The wrappers
/// forward these errors unchanged, so implementers should use the
/// [`DatabaseError`](crate::error::DatabaseError) variant matching the service status.
#[async_trait]
pub trait DatabaseBackend: Send + Sync + Debug {
    /// Reads a single document.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the document
    ///
    /// # Returns
    ///
    /// Returns the snapshot read at the current time. A missing document is not an error:
    /// the snapshot reports `exists() == false`.
    async fn get_document(&self, path: &DocumentPath) -> DatabaseResult<RawSnapshot>;

    /// Creates a document.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the new document
    /// * `fields` - The document content
    ///
    /// # Returns
    ///
    /// Returns the commit time, or `AlreadyExists` if a document is present at `path`.
    async fn create_document(
        &self,
        path: &DocumentPath,
        fields: Document,
    ) -> DatabaseResult<WriteResult>;

    /// Writes a document, replacing any existing content.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the document, created if missing
    /// * `fields` - The new document content
    ///
    /// # Returns
    ///
    /// Returns the commit time of the write.
    async fn set_document(&self, path: &DocumentPath, fields: Document)
    -> DatabaseResult<WriteResult>;

    /// Merges `fields` into an existing document.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the document
    /// * `fields` - Values keyed by field path; dotted keys address nested fields. Fields not
    ///   named are preserved.
    ///
    /// # Returns
    ///
    /// Returns the commit time, or `NotFound` if the document does not exist.
    async fn update_document(
        &self,
        path: &DocumentPath,
        fields: Document,
    ) -> DatabaseResult<WriteResult>;

    /// Deletes a document.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the document
    ///
    /// # Returns
    ///
    /// Returns the commit time. Deleting a missing document succeeds.
    async fn delete_document(&self, path: &DocumentPath) -> DatabaseResult<WriteResult>;

    /// Creates a document with a backend-generated id.
    ///
    /// # Arguments
    ///
    /// * `collection` - The collection to add the document to
    /// * `fields` - The document content
    ///
    /// # Returns
    ///
    /// Returns the full path of the new document.
    async fn add_document(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> DatabaseResult<DocumentPath>;

    /// Executes a query over the documents directly inside `collection`.
    ///
    /// # Arguments
    ///
    /// * `collection` - The collection to query; sub-collection documents are not included
    /// * `query` - Filters, orderings, cursors and pagination to apply
    ///
    /// # Returns
    ///
    /// Returns the matching documents in result order. Unsupported operators or malformed
    /// constraints are rejected here with `InvalidArgument`, not when the query was built.
    async fn run_query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> DatabaseResult<RawQuerySnapshot>;

    /// Runs a transaction.
    ///
    /// The backend opens an attempt, hands it to [`TransactionRunner::attempt`], and commits
    /// when the runner succeeds. Whether and how often a contended attempt is retried is up
    /// to the backend.
    ///
    /// # Arguments
    ///
    /// * `runner` - The callback invoked once per attempt
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once an attempt commits. An error returned by the runner rolls the
    /// attempt back and is returned unchanged; exhausted retries yield `Aborted`.
    async fn run_transaction(&self, runner: &mut dyn TransactionRunner) -> DatabaseResult<()>;

    /// Cleanly shuts down the backend, releasing all resources.
    ///
    /// The default implementation is a no-op, but backends with external connections
    /// should override this.
    async fn shutdown(self) -> DatabaseResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// One attempt of a transaction, as opened by the backend.
///
/// Reads are expected before writes; backends reject violations. Writes are buffered and
/// only take effect when the attempt commits. The attempt is only valid while
/// [`TransactionRunner::attempt`] is running; later calls fail with `FailedPrecondition`.
#[async_trait]
pub trait BackendTransaction: Send + Sync + Debug {
    /// Reads a document within the attempt.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the document
    ///
    /// # Returns
    ///
    /// Returns the snapshot, which reports `exists() == false` for a missing document. The
    /// read is validated again at commit.
    async fn get(&self, path: &DocumentPath) -> DatabaseResult<RawSnapshot>;

    /// Reads several documents within the attempt.
    ///
    /// # Arguments
    ///
    /// * `paths` - The full paths of the documents
    ///
    /// # Returns
    ///
    /// Returns one snapshot per path, in the order of `paths`, whether or not each
    /// document exists.
    async fn get_all(&self, paths: &[DocumentPath]) -> DatabaseResult<Vec<RawSnapshot>>;

    /// Buffers the creation of a document.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the new document
    /// * `fields` - The document content
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once buffered. The commit fails with `AlreadyExists` if the document
    /// exists by then.
    async fn create(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<()>;

    /// Buffers a full overwrite of a document.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the document, created if missing
    /// * `fields` - The new document content
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once buffered.
    async fn set(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<()>;

    /// Buffers a merge of `fields` into a document.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the document
    /// * `fields` - Values keyed by field path
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once buffered. The commit fails with `NotFound` if the document is
    /// missing by then.
    async fn update(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<()>;

    /// Buffers the deletion of a document.
    ///
    /// # Arguments
    ///
    /// * `path` - The full path of the document
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` once buffered. Deleting a missing document succeeds.
    async fn delete(&self, path: &DocumentPath) -> DatabaseResult<()>;
}

/// Callback invoked by the backend once per transaction attempt.
#[async_trait]
pub trait TransactionRunner: Send {
    /// Runs the caller's work against one attempt.
    ///
    /// # Arguments
    ///
    /// * `transaction` - The attempt opened by the backend
    ///
    /// # Returns
    ///
    /// Returns `Ok(())` if the attempt should be committed. Any error makes the backend roll
    /// the attempt back and return that error.
    async fn attempt(&mut self, transaction: Arc<dyn BackendTransaction>) -> DatabaseResult<()>;
}

/// Object-safe form of [`DatabaseBackend`], blanket-implemented for every backend.
///
/// The wrappers hold an `Arc<dyn DynDatabaseBackend>` so that the concrete backend type
/// never appears in their signatures. [`as_any`](Self::as_any) recovers it.
#[async_trait]
pub trait DynDatabaseBackend: Send + Sync + Debug {
    async fn get_document(&self, path: &DocumentPath) -> DatabaseResult<RawSnapshot>;
    async fn create_document(
        &self,
        path: &DocumentPath,
        fields: Document,
    ) -> DatabaseResult<WriteResult>;
    async fn set_document(&self, path: &DocumentPath, fields: Document)
    -> DatabaseResult<WriteResult>;
    async fn update_document(
        &self,
        path: &DocumentPath,
        fields: Document,
    ) -> DatabaseResult<WriteResult>;
    async fn delete_document(&self, path: &DocumentPath) -> DatabaseResult<WriteResult>;
    async fn add_document(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> DatabaseResult<DocumentPath>;
    async fn run_query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> DatabaseResult<RawQuerySnapshot>;
    async fn run_transaction(&self, runner: &mut dyn TransactionRunner) -> DatabaseResult<()>;
    /// Shuts the backend down if `self` is its last handle; otherwise does nothing.
    async fn shutdown_shared(self: Arc<Self>) -> DatabaseResult<()>;

    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: DatabaseBackend + 'static> DynDatabaseBackend for B {
    async fn get_document(&self, path: &DocumentPath) -> DatabaseResult<RawSnapshot> {
        DatabaseBackend::get_document(self, path).await
    }

    async fn create_document(
        &self,
        path: &DocumentPath,
        fields: Document,
    ) -> DatabaseResult<WriteResult> {
        DatabaseBackend::create_document(self, path, fields).await
    }

    async fn set_document(
        &self,
        path: &DocumentPath,
        fields: Document,
    ) -> DatabaseResult<WriteResult> {
        DatabaseBackend::set_document(self, path, fields).await
    }

    async fn update_document(
        &self,
        path: &DocumentPath,
        fields: Document,
    ) -> DatabaseResult<WriteResult> {
        DatabaseBackend::update_document(self, path, fields).await
    }

    async fn delete_document(&self, path: &DocumentPath) -> DatabaseResult<WriteResult> {
        DatabaseBackend::delete_document(self, path).await
    }

    async fn add_document(
        &self,
        collection: &CollectionPath,
        fields: Document,
    ) -> DatabaseResult<DocumentPath> {
        DatabaseBackend::add_document(self, collection, fields).await
    }

    async fn run_query(
        &self,
        collection: &CollectionPath,
        query: &Query,
    ) -> DatabaseResult<RawQuerySnapshot> {
        DatabaseBackend::run_query(self, collection, query).await
    }

    async fn run_transaction(&self, runner: &mut dyn TransactionRunner) -> DatabaseResult<()> {
        DatabaseBackend::run_transaction(self, runner).await
    }

    async fn shutdown_shared(self: Arc<Self>) -> DatabaseResult<()> {
        match Arc::try_unwrap(self) {
            Ok(backend) => DatabaseBackend::shutdown(backend).await,
            Err(_) => Ok(()),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory trait for creating backend instances.
#[async_trait]
pub trait DatabaseBackendBuilder {
    /// The backend this builder produces.
    type Backend: DatabaseBackend;

    /// Builds the backend, connecting it if it needs a connection.
    ///
    /// # Returns
    ///
    /// Returns the ready backend, or the error that prevented it from starting.
    async fn build(self) -> DatabaseResult<Self::Backend>;
}
