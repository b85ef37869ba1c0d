//! The root handle and the process-wide default connection.
//!
//! [`Database`] wraps a connection and is the entry point for navigation: collections and
//! documents are addressed from it, and transactions are run through it.
//!
//! # Connections
//!
//! A handle is built either from an explicit backend ([`Database::new`],
//! [`Database::from_connection`]) or through [`database`], which falls back to the default
//! connection installed with [`install_default_connection`]. Nothing is ever installed
//! implicitly.
//!
//! # Example
//!
//! ```ignore
//! use firetype::{database, install_default_connection, memory::InMemoryDatabase};
//! use std::sync::Arc;
//!
//! install_default_connection(Arc::new(InMemoryDatabase::new()))?;
//! let db = database(None)?;
//!
//! let total = db
//!     .run_transaction(|tx| {
//!         let counter = db.doc("counters/visits");
//!         async move {
//!             let current = tx.get::<Counter>(&counter).await?.data()?.map_or(0, |c| c.value);
//!             tx.set(&counter, &Counter { value: current + 1 }).await?;
//!             Ok(current + 1)
//!         }
//!     })
//!     .await?;
//! ```

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::{fmt, future::Future, marker::PhantomData, sync::Arc};
use tracing::{debug, info};

use crate::{
    backend::{BackendTransaction, DatabaseBackend, DynDatabaseBackend, TransactionRunner},
    collection::CollectionRef,
    error::{DatabaseError, DatabaseResult},
    path::{CollectionPath, DocumentPath},
    reference::DocumentRef,
    transaction::Transaction,
};

static DEFAULT_CONNECTION: OnceCell<Arc<dyn DynDatabaseBackend>> = OnceCell::new();

/// Installs the process-wide default connection used by [`database`] when no connection
/// is given.
///
/// # Errors
///
/// Returns [`DatabaseError::Initialization`] if a default connection is already installed.
pub fn install_default_connection(connection: Arc<dyn DynDatabaseBackend>) -> DatabaseResult<()> {
    DEFAULT_CONNECTION
        .set(connection)
        .map_err(|_| DatabaseError::Initialization("a default connection is already installed".to_string()))?;

    info!(target: "firetype::database", "Installed default connection");
    Ok(())
}

/// The process-wide default connection, if one was installed.
pub fn default_connection() -> Option<Arc<dyn DynDatabaseBackend>> {
    DEFAULT_CONNECTION.get().cloned()
}

/// Builds a root handle from `connection`, or from the default connection when `None`.
///
/// # Errors
///
/// Returns [`DatabaseError::Initialization`] if no connection is given and no default
/// connection is installed.
pub fn database(connection: Option<Arc<dyn DynDatabaseBackend>>) -> DatabaseResult<Database> {
    match connection.or_else(default_connection) {
        Some(connection) => Ok(Database::from_connection(connection)),
        None => Err(DatabaseError::Initialization(
            "no connection given and no default connection installed".to_string(),
        )),
    }
}

/// The root handle over a database connection.
///
/// Cloning is cheap; clones share the connection.
#[derive(Clone)]
pub struct Database {
    backend: Arc<dyn DynDatabaseBackend>,
}

impl Database {
    /// Creates a new root handle that owns `backend`.
    pub fn new<B: DatabaseBackend + 'static>(backend: B) -> Self {
        Self::from_connection(Arc::new(backend))
    }

    /// Creates a root handle over an existing shared connection.
    pub fn from_connection(backend: Arc<dyn DynDatabaseBackend>) -> Self {
        Self { backend }
    }

    /// Addresses a top-level collection.
    pub fn collection(&self, name: &str) -> CollectionRef {
        CollectionRef::new(self.backend.clone(), CollectionPath::new(name))
    }

    /// Addresses a document by its full path, e.g. `users/fleker`.
    pub fn doc(&self, path: &str) -> DocumentRef {
        DocumentRef::new(self.backend.clone(), DocumentPath::new(path))
    }

    /// The connection, for operations the wrappers do not cover.
    pub fn raw(&self) -> &dyn DynDatabaseBackend {
        self.backend.as_ref()
    }

    pub fn connection(&self) -> &Arc<dyn DynDatabaseBackend> {
        &self.backend
    }

    /// Attempts to downcast the connection to a concrete backend type.
    ///
    /// Returns `Some(&B)` if the connection is a `B`, otherwise `None`.
    pub fn raw_as<B: DatabaseBackend + 'static>(&self) -> Option<&B> {
        self.backend
            .as_any()
            .downcast_ref::<B>()
    }

    /// Runs `update` inside a transaction and returns the value of the committed attempt.
    ///
    /// The backend calls `update` once per attempt with a fresh [`Transaction`]; a backend
    /// that retries contended transactions will call it again. No retry is added here. An
    /// error returned by `update` aborts the transaction and is returned unchanged.
    pub async fn run_transaction<F, Fut, R>(&self, update: F) -> DatabaseResult<R>
    where
        F: FnMut(Transaction) -> Fut + Send,
        Fut: Future<Output = DatabaseResult<R>> + Send,
        R: Send,
    {
        let mut runner = UpdateRunner {
            backend: self.backend.clone(),
            update,
            attempts: 0,
            output: None,
            _future: PhantomData,
        };

        self.backend.run_transaction(&mut runner).await?;
        debug!(target: "firetype::database", attempts = runner.attempts, "Transaction completed");

        runner.output.ok_or_else(|| {
            DatabaseError::Internal("transaction committed without running the update function".to_string())
        })
    }

    /// Shuts the connection down once no other handle shares it.
    pub async fn shutdown(self) -> DatabaseResult<()> {
        debug!(
            target: "firetype::database",
            handles = Arc::strong_count(&self.backend),
            "Shutting down connection"
        );

        self.backend.shutdown_shared().await
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.backend)
            .finish()
    }
}

struct UpdateRunner<F, Fut, R> {
    backend: Arc<dyn DynDatabaseBackend>,
    update: F,
    attempts: usize,
    output: Option<R>,
    _future: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut, R> TransactionRunner for UpdateRunner<F, Fut, R>
where
    F: FnMut(Transaction) -> Fut + Send,
    Fut: Future<Output = DatabaseResult<R>> + Send,
    R: Send,
{
    async fn attempt(&mut self, transaction: Arc<dyn BackendTransaction>) -> DatabaseResult<()> {
        self.attempts += 1;
        self.output = None;

        let output = (self.update)(Transaction::new(self.backend.clone(), transaction)).await?;
        self.output = Some(output);

        Ok(())
    }
}
