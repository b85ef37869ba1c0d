//! Typed handle to one transaction attempt.

use bson::Document;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt, sync::Arc};
use tracing::debug;

use crate::{
    backend::{BackendTransaction, DynDatabaseBackend},
    document::to_fields,
    error::DatabaseResult,
    path::DocumentPath,
    reference::DocumentRef,
    snapshot::DocumentSnapshot,
};

/// A transaction attempt handed to the update function of
/// [`Database::run_transaction`](crate::database::Database::run_transaction).
///
/// Operations take the [`DocumentRef`] they act on. All reads must be issued before any
/// write; the backend rejects the attempt otherwise. Writes are buffered by the backend
/// and committed together when the update function returns successfully.
#[derive(Clone)]
pub struct Transaction {
    backend: Arc<dyn DynDatabaseBackend>,
    inner: Arc<dyn BackendTransaction>,
}

impl Transaction {
    pub(crate) fn new(
        backend: Arc<dyn DynDatabaseBackend>,
        inner: Arc<dyn BackendTransaction>,
    ) -> Self {
        Self { backend, inner }
    }

    /// The backend's transaction attempt.
    pub fn raw(&self) -> &dyn BackendTransaction {
        self.inner.as_ref()
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        reference: &DocumentRef,
    ) -> DatabaseResult<DocumentSnapshot<T>> {
        debug!(target: "firetype::transaction", path = %reference.path(), "Transactional read");

        let raw = self.inner.get(reference.path()).await?;
        Ok(DocumentSnapshot::new(raw, self.backend.clone()))
    }

    /// Reads several documents. Snapshots come back in the order of `references`, whether
    /// or not each document exists.
    pub async fn get_all<'a, T, I>(&self, references: I) -> DatabaseResult<Vec<DocumentSnapshot<T>>>
    where
        T: DeserializeOwned,
        I: IntoIterator<Item = &'a DocumentRef>,
    {
        let paths = references
            .into_iter()
            .map(|reference| reference.path().clone())
            .collect::<Vec<DocumentPath>>();
        debug!(target: "firetype::transaction", count = paths.len(), "Transactional batch read");

        Ok(self
            .inner
            .get_all(&paths)
            .await?
            .into_iter()
            .map(|raw| DocumentSnapshot::new(raw, self.backend.clone()))
            .collect())
    }

    /// Creates the document when the transaction commits; the commit fails if it exists.
    pub async fn create<T: Serialize>(
        &self,
        reference: &DocumentRef,
        data: &T,
    ) -> DatabaseResult<&Self> {
        let fields = to_fields(data)?;
        debug!(target: "firetype::transaction", path = %reference.path(), "Transactional create");

        self.inner.create(reference.path(), fields).await?;
        Ok(self)
    }

    pub async fn set<T: Serialize>(&self, reference: &DocumentRef, data: &T) -> DatabaseResult<&Self> {
        let fields = to_fields(data)?;
        debug!(target: "firetype::transaction", path = %reference.path(), "Transactional set");

        self.inner.set(reference.path(), fields).await?;
        Ok(self)
    }

    /// Merges the keys of `partial` into the document; the commit fails if it is missing.
    pub async fn update<P: Serialize + ?Sized>(
        &self,
        reference: &DocumentRef,
        partial: &P,
    ) -> DatabaseResult<&Self> {
        let fields = to_fields(partial)?;
        debug!(target: "firetype::transaction", path = %reference.path(), "Transactional update");

        self.inner.update(reference.path(), fields).await?;
        Ok(self)
    }

    /// Merges `fields` into the document exactly as given, null values included.
    pub async fn update_fields(&self, reference: &DocumentRef, fields: Document) -> DatabaseResult<&Self> {
        debug!(target: "firetype::transaction", path = %reference.path(), "Transactional field update");

        self.inner.update(reference.path(), fields).await?;
        Ok(self)
    }

    pub async fn delete(&self, reference: &DocumentRef) -> DatabaseResult<&Self> {
        debug!(target: "firetype::transaction", path = %reference.path(), "Transactional delete");

        self.inner.delete(reference.path()).await?;
        Ok(self)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("inner", &self.inner)
            .finish()
    }
}
