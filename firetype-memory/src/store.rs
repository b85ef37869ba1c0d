//! In-memory storage implementation of the database backend.
//!
//! Documents are kept in one ordered map keyed by full document path, behind an async-safe
//! read-write lock. Sub-collection documents are independent entries of the same map.

use async_trait::async_trait;
use bson::Document;
use mea::rwlock::RwLock;
use rand::{Rng, distributions::Alphanumeric};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use tracing::{debug, warn};

use firetype_core::{
    backend::{DatabaseBackend, DatabaseBackendBuilder, TransactionRunner, WriteResult},
    error::{DatabaseError, DatabaseResult},
    path::{CollectionPath, DocumentPath, set_field},
    query::Query,
    snapshot::{RawQuerySnapshot, RawSnapshot},
    timestamp::Timestamp,
};

use crate::{
    evaluator::{self, Candidate},
    transaction::MemoryTransaction,
};

const DEFAULT_MAX_ATTEMPTS: usize = 5;
const AUTO_ID_LENGTH: usize = 20;

/// A stored document and its version timestamps.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StoredDocument {
    pub fields: Document,
    pub create_time: Timestamp,
    pub update_time: Timestamp,
}

pub(crate) type DocumentMap = BTreeMap<DocumentPath, StoredDocument>;

/// A buffered or immediate write.
#[derive(Debug, Clone)]
pub(crate) enum WriteOp {
    Create(Document),
    Set(Document),
    Update(Document),
    Delete,
}

#[derive(Debug, Clone)]
pub(crate) struct PendingWrite {
    pub path: DocumentPath,
    pub op: WriteOp,
}

/// Applies one write at `commit_time`, enforcing its precondition.
pub(crate) fn apply_write(
    documents: &mut DocumentMap,
    write: PendingWrite,
    commit_time: Timestamp,
) -> DatabaseResult<()> {
    let PendingWrite { path, op } = write;

    match op {
        WriteOp::Create(fields) => {
            if documents.contains_key(&path) {
                return Err(DatabaseError::AlreadyExists(path.to_string()));
            }

            documents.insert(
                path,
                StoredDocument {
                    fields,
                    create_time: commit_time,
                    update_time: commit_time,
                },
            );
        }
        WriteOp::Set(fields) => {
            let create_time = documents
                .get(&path)
                .map(|existing| existing.create_time)
                .unwrap_or(commit_time);

            documents.insert(
                path,
                StoredDocument {
                    fields,
                    create_time,
                    update_time: commit_time,
                },
            );
        }
        WriteOp::Update(fields) => {
            let existing = documents
                .get_mut(&path)
                .ok_or_else(|| DatabaseError::NotFound(path.to_string()))?;

            for (field_path, value) in fields {
                set_field(&mut existing.fields, &field_path, value);
            }
            existing.update_time = commit_time;
        }
        WriteOp::Delete => {
            documents.remove(&path);
        }
    }

    Ok(())
}

pub(crate) fn snapshot(documents: &DocumentMap, path: &DocumentPath, read_time: Timestamp) -> RawSnapshot {
    match documents.get(path) {
        Some(stored) => RawSnapshot::found(
            path.clone(),
            stored.fields.clone(),
            stored.create_time,
            stored.update_time,
            read_time,
        ),
        None => RawSnapshot::missing(path.clone(), read_time),
    }
}

fn auto_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(AUTO_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Thread-safe in-memory document database.
///
/// This struct implements the [`DatabaseBackend`] trait with the semantics of a managed
/// document database: create/update preconditions, field-path merges, query evaluation and
/// optimistic transactions retried on contention.
///
/// # Thread Safety
///
/// `InMemoryDatabase` is cloneable and uses `Arc`-wrapped internal state, allowing it to
/// be safely shared across async tasks. Multiple clones of the same instance share the
/// same underlying data.
///
/// # Example
///
/// ```ignore
/// use firetype_memory::InMemoryDatabase;
/// use firetype::backend::DatabaseBackend;
/// use firetype::path::DocumentPath;
/// use bson::doc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let db = InMemoryDatabase::new();
///     let path = DocumentPath::new("users/alice");
///
///     db.create_document(&path, doc! { "name": "Alice" }).await?;
///     assert!(db.get_document(&path).await?.exists());
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryDatabase {
    /// All documents, keyed by full path
    documents: Arc<RwLock<DocumentMap>>,
    /// Last timestamp handed out, in nanoseconds since the epoch
    clock: Arc<AtomicI64>,
    max_attempts: usize,
}

impl Default for InMemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDatabase {
    /// Creates a new empty in-memory database.
    pub fn new() -> Self {
        Self {
            documents: Arc::new(RwLock::new(DocumentMap::new())),
            clock: Arc::new(AtomicI64::new(0)),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Creates a builder for constructing an `InMemoryDatabase` with custom options.
    pub fn builder() -> InMemoryDatabaseBuilder {
        InMemoryDatabaseBuilder::default()
    }

    /// How many attempts a contended transaction gets before failing with `Aborted`.
    pub fn max_transaction_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Number of stored documents across all collections.
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    /// A timestamp strictly later than every timestamp handed out before.
    pub(crate) fn tick(&self) -> Timestamp {
        let now = Timestamp::now().as_nanos();
        let previous = self
            .clock
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
            .unwrap_or_else(|last| last);

        Timestamp::from_nanos(now.max(previous + 1))
    }

    pub(crate) fn documents(&self) -> &RwLock<DocumentMap> {
        &self.documents
    }

    async fn write(&self, write: PendingWrite) -> DatabaseResult<WriteResult> {
        let mut documents = self.documents.write().await;
        let write_time = self.tick();

        apply_write(&mut documents, write, write_time)?;

        Ok(WriteResult { write_time })
    }
}

#[async_trait]
impl DatabaseBackend for InMemoryDatabase {
    async fn get_document(&self, path: &DocumentPath) -> DatabaseResult<RawSnapshot> {
        let documents = self.documents.read().await;

        Ok(snapshot(&documents, path, self.tick()))
    }

    async fn create_document(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<WriteResult> {
        self.write(PendingWrite { path: path.clone(), op: WriteOp::Create(fields) })
            .await
    }

    async fn set_document(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<WriteResult> {
        self.write(PendingWrite { path: path.clone(), op: WriteOp::Set(fields) })
            .await
    }

    async fn update_document(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<WriteResult> {
        self.write(PendingWrite { path: path.clone(), op: WriteOp::Update(fields) })
            .await
    }

    async fn delete_document(&self, path: &DocumentPath) -> DatabaseResult<WriteResult> {
        self.write(PendingWrite { path: path.clone(), op: WriteOp::Delete })
            .await
    }

    async fn add_document(&self, collection: &CollectionPath, fields: Document) -> DatabaseResult<DocumentPath> {
        let mut documents = self.documents.write().await;

        let path = loop {
            let candidate = collection.doc(&auto_id());
            if !documents.contains_key(&candidate) {
                break candidate;
            }
        };

        let write_time = self.tick();
        apply_write(
            &mut documents,
            PendingWrite { path: path.clone(), op: WriteOp::Create(fields) },
            write_time,
        )?;
        debug!(target: "firetype::memory", path = %path, "Added document");

        Ok(path)
    }

    async fn run_query(&self, collection: &CollectionPath, query: &Query) -> DatabaseResult<RawQuerySnapshot> {
        let documents = self.documents.read().await;
        let read_time = self.tick();

        // Direct children share the "<collection>/" prefix and sort contiguously.
        let prefix = format!("{}/", collection);
        let candidates = documents
            .range(DocumentPath::new(prefix.as_str())..)
            .take_while(|(path, _)| path.as_str().starts_with(&prefix))
            .filter(|(path, _)| collection.contains(path))
            .map(|(path, stored)| Candidate { path, fields: &stored.fields });

        let docs = evaluator::execute(candidates, query)?
            .into_iter()
            .map(|candidate| snapshot(&documents, candidate.path, read_time))
            .collect();

        Ok(RawQuerySnapshot { docs, read_time })
    }

    async fn run_transaction(&self, runner: &mut dyn TransactionRunner) -> DatabaseResult<()> {
        for attempt in 1..=self.max_attempts {
            let transaction = Arc::new(MemoryTransaction::new(self.clone()));
            debug!(target: "firetype::memory", transaction_id = %transaction.id(), attempt, "Transaction started");

            if let Err(err) = runner.attempt(transaction.clone()).await {
                transaction.rollback().await;
                debug!(target: "firetype::memory", transaction_id = %transaction.id(), error = %err, "Transaction rolled back");

                return Err(err);
            }

            match transaction.commit().await {
                Ok(commit_time) => {
                    debug!(target: "firetype::memory", transaction_id = %transaction.id(), %commit_time, "Transaction committed");
                    return Ok(());
                }
                Err(DatabaseError::Aborted(reason)) if attempt < self.max_attempts => {
                    warn!(target: "firetype::memory", transaction_id = %transaction.id(), attempt, %reason, "Transaction aborted, retrying");
                }
                Err(err) => return Err(err),
            }
        }

        Err(DatabaseError::Aborted(format!(
            "transaction failed after {} attempts",
            self.max_attempts
        )))
    }
}

/// Builder for constructing [`InMemoryDatabase`] instances.
///
/// # Example
///
/// ```ignore
/// use firetype_memory::InMemoryDatabase;
/// use firetype::backend::DatabaseBackendBuilder;
///
/// #[tokio::main]
/// async fn main() {
///     let db = InMemoryDatabase::builder()
///         .with_max_transaction_attempts(3)
///         .build()
///         .await
///         .unwrap();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryDatabaseBuilder {
    max_attempts: usize,
}

impl Default for InMemoryDatabaseBuilder {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

impl InMemoryDatabaseBuilder {
    /// Sets how many attempts a contended transaction gets. Values below 1 are raised to 1.
    pub fn with_max_transaction_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

#[async_trait]
impl DatabaseBackendBuilder for InMemoryDatabaseBuilder {
    type Backend = InMemoryDatabase;

    /// Builds and returns a new [`InMemoryDatabase`] instance.
    ///
    /// This always succeeds and returns a freshly initialized database.
    async fn build(self) -> DatabaseResult<Self::Backend> {
        Ok(InMemoryDatabase {
            max_attempts: self.max_attempts,
            ..InMemoryDatabase::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_auto_id_shape() {
        let id = auto_id();
        assert_eq!(id.len(), AUTO_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_clock_strictly_increases() {
        let db = InMemoryDatabase::new();
        let first = db.tick();
        let second = db.tick();
        assert!(second > first);
    }

    #[test]
    fn test_apply_update_merges_field_paths() {
        let path = DocumentPath::new("users/a");
        let t1 = Timestamp::from_nanos(1);
        let t2 = Timestamp::from_nanos(2);
        let mut documents = DocumentMap::new();

        apply_write(&mut documents, PendingWrite { path: path.clone(), op: WriteOp::Create(doc! { "required": false, "address": { "city": "Paris" } }) }, t1).unwrap();
        apply_write(&mut documents, PendingWrite { path: path.clone(), op: WriteOp::Update(doc! { "optional": true, "address.zip": "75001" }) }, t2).unwrap();

        let stored = &documents[&path];
        assert_eq!(
            stored.fields,
            doc! { "required": false, "address": { "city": "Paris", "zip": "75001" }, "optional": true }
        );
        assert_eq!(stored.create_time, t1);
        assert_eq!(stored.update_time, t2);
    }

    #[test]
    fn test_apply_preconditions() {
        let path = DocumentPath::new("users/a");
        let now = Timestamp::from_nanos(1);
        let mut documents = DocumentMap::new();

        let missing = apply_write(&mut documents, PendingWrite { path: path.clone(), op: WriteOp::Update(doc! { "x": 1 }) }, now);
        assert!(matches!(missing, Err(DatabaseError::NotFound(_))));

        apply_write(&mut documents, PendingWrite { path: path.clone(), op: WriteOp::Create(doc! {}) }, now).unwrap();
        let duplicate = apply_write(&mut documents, PendingWrite { path: path.clone(), op: WriteOp::Create(doc! {}) }, now);
        assert!(matches!(duplicate, Err(DatabaseError::AlreadyExists(_))));

        apply_write(&mut documents, PendingWrite { path: path.clone(), op: WriteOp::Delete }, now).unwrap();
        apply_write(&mut documents, PendingWrite { path, op: WriteOp::Delete }, now).unwrap();
        assert!(documents.is_empty());
    }

    #[tokio::test]
    async fn test_set_keeps_create_time() {
        let db = InMemoryDatabase::new();
        let path = DocumentPath::new("users/a");

        let first = db.set_document(&path, doc! { "n": 1 }).await.unwrap();
        let second = db.set_document(&path, doc! { "n": 2 }).await.unwrap();
        let snapshot = db.get_document(&path).await.unwrap();

        assert_eq!(snapshot.create_time(), Some(first.write_time));
        assert_eq!(snapshot.update_time(), Some(second.write_time));
        assert_eq!(snapshot.data(), Some(&doc! { "n": 2 }));
    }

    #[tokio::test]
    async fn test_query_only_sees_direct_children() {
        let db = InMemoryDatabase::new();
        db.set_document(&DocumentPath::new("users/a"), doc! { "n": 1 }).await.unwrap();
        db.set_document(&DocumentPath::new("users/a/posts/p"), doc! { "n": 2 }).await.unwrap();
        db.set_document(&DocumentPath::new("users_archive/b"), doc! { "n": 3 }).await.unwrap();

        let users = db.run_query(&CollectionPath::new("users"), &Query::new()).await.unwrap();
        assert_eq!(users.docs.len(), 1);
        assert_eq!(users.docs[0].id(), "a");

        let posts = db.run_query(&CollectionPath::new("users/a/posts"), &Query::new()).await.unwrap();
        assert_eq!(posts.docs.len(), 1);
        assert_eq!(db.document_count().await, 3);
    }

    #[tokio::test]
    async fn test_add_document_generates_id() {
        let db = InMemoryDatabase::new();
        let users = CollectionPath::new("users");

        let path = db.add_document(&users, doc! { "name": "x" }).await.unwrap();
        assert_eq!(path.parent(), users);
        assert_eq!(path.id().len(), AUTO_ID_LENGTH);
        assert!(db.get_document(&path).await.unwrap().exists());
    }

    #[tokio::test]
    async fn test_builder_clamps_attempts() {
        let db = InMemoryDatabase::builder()
            .with_max_transaction_attempts(0)
            .build()
            .await
            .unwrap();
        assert_eq!(db.max_transaction_attempts(), 1);
        assert_eq!(InMemoryDatabase::new().max_transaction_attempts(), DEFAULT_MAX_ATTEMPTS);
    }
}
