//! Typed handle to a single document.

use bson::Document;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, sync::Arc};
use tracing::debug;

use crate::{
    backend::{DynDatabaseBackend, WriteResult},
    collection::CollectionRef,
    document::to_fields,
    error::DatabaseResult,
    path::DocumentPath,
    snapshot::DocumentSnapshot,
};

/// A handle addressing one document.
///
/// Creating a reference performs no I/O; the document may or may not exist. Every
/// operation forwards to one backend call with the document's path.
///
/// # Example
///
/// ```ignore
/// let fleker = db.collection("users").doc("fleker");
/// fleker.create(&Profile { required: false, optional: None }).await?;
///
/// let snapshot = fleker.get::<Profile>().await?;
/// assert!(snapshot.exists());
/// ```
#[derive(Clone)]
pub struct DocumentRef {
    backend: Arc<dyn DynDatabaseBackend>,
    path: DocumentPath,
}

impl DocumentRef {
    pub(crate) fn new(backend: Arc<dyn DynDatabaseBackend>, path: DocumentPath) -> Self {
        Self { backend, path }
    }

    pub fn id(&self) -> &str {
        self.path.id()
    }

    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    /// The connection this reference forwards to.
    pub fn raw(&self) -> &dyn DynDatabaseBackend {
        self.backend.as_ref()
    }

    /// The collection containing this document.
    pub fn parent(&self) -> CollectionRef {
        CollectionRef::new(self.backend.clone(), self.path.parent())
    }

    /// Addresses a sub-collection of this document.
    pub fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef::new(self.backend.clone(), self.path.collection(name))
    }

    /// Creates the document.
    ///
    /// # Errors
    ///
    /// Fails with [`DatabaseError::AlreadyExists`](crate::error::DatabaseError::AlreadyExists)
    /// if a document already exists at this address.
    pub async fn create<T: Serialize>(&self, data: &T) -> DatabaseResult<()> {
        let fields = to_fields(data)?;
        debug!(target: "firetype::document", path = %self.path, "Creating document");

        self.backend
            .create_document(&self.path, fields)
            .await?;

        Ok(())
    }

    /// Reads the document. A missing document yields a snapshot with `exists() == false`.
    pub async fn get<T: DeserializeOwned>(&self) -> DatabaseResult<DocumentSnapshot<T>> {
        debug!(target: "firetype::document", path = %self.path, "Reading document");

        let raw = self.backend.get_document(&self.path).await?;
        Ok(DocumentSnapshot::new(raw, self.backend.clone()))
    }

    /// Overwrites the document with `data`, creating it if missing.
    pub async fn set<T: Serialize>(&self, data: &T) -> DatabaseResult<WriteResult> {
        let fields = to_fields(data)?;
        debug!(target: "firetype::document", path = %self.path, "Setting document");

        self.backend.set_document(&self.path, fields).await
    }

    /// Merges the keys present in `partial` into the document.
    ///
    /// Keys may be dotted field paths. Fields not named are preserved, and so are fields
    /// whose value in `partial` is `None`; see [`update_fields`](Self::update_fields) to
    /// write nulls.
    ///
    /// # Errors
    ///
    /// Fails with [`DatabaseError::NotFound`](crate::error::DatabaseError::NotFound) if the
    /// document does not exist.
    pub async fn update<P: Serialize + ?Sized>(&self, partial: &P) -> DatabaseResult<WriteResult> {
        let fields = to_fields(partial)?;
        debug!(target: "firetype::document", path = %self.path, fields = fields.len(), "Updating document");

        self.backend.update_document(&self.path, fields).await
    }

    /// Merges `fields` into the document exactly as given, null values included.
    ///
    /// # Errors
    ///
    /// Fails with [`DatabaseError::NotFound`](crate::error::DatabaseError::NotFound) if the
    /// document does not exist.
    pub async fn update_fields(&self, fields: Document) -> DatabaseResult<WriteResult> {
        debug!(target: "firetype::document", path = %self.path, fields = fields.len(), "Updating document fields");

        self.backend.update_document(&self.path, fields).await
    }

    /// Deletes the document and returns this same reference. Deleting a missing document
    /// succeeds.
    pub async fn delete(&self) -> DatabaseResult<&Self> {
        debug!(target: "firetype::document", path = %self.path, "Deleting document");

        self.backend.delete_document(&self.path).await?;
        Ok(self)
    }
}

impl PartialEq for DocumentRef {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && Arc::ptr_eq(&self.backend, &other.backend)
    }
}

impl fmt::Debug for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentRef")
            .field("path", &self.path)
            .finish()
    }
}
