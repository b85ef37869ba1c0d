//! Optimistic transactions for the in-memory database.
//!
//! An attempt records the update time of every document it reads and buffers its writes.
//! At commit the read versions are checked against the store; any change aborts the
//! attempt. Otherwise all buffered writes are applied together with a single commit time.
//! Lock order is attempt state, then store.

use async_trait::async_trait;
use bson::Document;
use mea::mutex::Mutex;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

use firetype_core::{
    backend::BackendTransaction,
    error::{DatabaseError, DatabaseResult},
    path::DocumentPath,
    snapshot::RawSnapshot,
    timestamp::Timestamp,
};

use crate::store::{DocumentMap, InMemoryDatabase, PendingWrite, WriteOp, apply_write, snapshot};

const READ_AFTER_WRITE: &str = "Firestore transactions require all reads to be executed before all writes";

#[derive(Debug, Default)]
struct AttemptState {
    /// Update time of each document as first read; `None` if it did not exist
    reads: HashMap<DocumentPath, Option<Timestamp>>,
    writes: Vec<PendingWrite>,
    finished: bool,
}

/// One attempt of an in-memory transaction.
#[derive(Debug)]
pub(crate) struct MemoryTransaction {
    id: Uuid,
    database: InMemoryDatabase,
    state: Mutex<AttemptState>,
}

impl MemoryTransaction {
    pub(crate) fn new(database: InMemoryDatabase) -> Self {
        Self {
            id: Uuid::new_v4(),
            database,
            state: Mutex::new(AttemptState::default()),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    fn ensure_open(&self, state: &AttemptState) -> DatabaseResult<()> {
        if state.finished {
            return Err(DatabaseError::FailedPrecondition(format!(
                "transaction {} has already finished",
                self.id
            )));
        }

        Ok(())
    }

    async fn read(&self, paths: &[DocumentPath]) -> DatabaseResult<Vec<RawSnapshot>> {
        let mut state = self.state.lock().await;
        self.ensure_open(&state)?;

        if !state.writes.is_empty() {
            return Err(DatabaseError::InvalidArgument(READ_AFTER_WRITE.to_string()));
        }

        let documents = self.database.documents().read().await;
        let read_time = self.database.tick();

        let snapshots = paths
            .iter()
            .map(|path| snapshot(&documents, path, read_time))
            .collect::<Vec<_>>();

        for read in &snapshots {
            state
                .reads
                .entry(read.path().clone())
                .or_insert(read.update_time());
        }

        Ok(snapshots)
    }

    async fn buffer(&self, path: &DocumentPath, op: WriteOp) -> DatabaseResult<()> {
        let mut state = self.state.lock().await;
        self.ensure_open(&state)?;

        state.writes.push(PendingWrite { path: path.clone(), op });
        Ok(())
    }

    /// Validates the read set and applies the buffered writes atomically.
    ///
    /// Returns the commit time. Fails with `Aborted` if a document read by this attempt
    /// changed since it was read; no write is applied in that case, nor when any write's
    /// precondition fails.
    pub(crate) async fn commit(&self) -> DatabaseResult<Timestamp> {
        let mut state = self.state.lock().await;
        self.ensure_open(&state)?;
        state.finished = true;

        let reads = std::mem::take(&mut state.reads);
        let writes = std::mem::take(&mut state.writes);

        let mut documents = self.database.documents().write().await;

        for (path, read_version) in &reads {
            let current = documents.get(path).map(|stored| stored.update_time);
            if current != *read_version {
                return Err(DatabaseError::Aborted(format!(
                    "document {} changed since it was read",
                    path
                )));
            }
        }

        let commit_time = self.database.tick();

        // Writes go to a staging copy of the touched documents first, so a failed
        // precondition leaves the store untouched.
        let mut staged = DocumentMap::new();
        for write in &writes {
            if let Some(stored) = documents.get(&write.path) {
                staged.insert(write.path.clone(), stored.clone());
            }
        }

        let touched = writes
            .iter()
            .map(|write| write.path.clone())
            .collect::<BTreeSet<_>>();

        for write in writes {
            apply_write(&mut staged, write, commit_time)?;
        }

        for path in touched {
            match staged.remove(&path) {
                Some(stored) => {
                    documents.insert(path, stored);
                }
                None => {
                    documents.remove(&path);
                }
            }
        }

        Ok(commit_time)
    }

    /// Discards the buffered writes and closes the attempt.
    pub(crate) async fn rollback(&self) {
        let mut state = self.state.lock().await;
        state.finished = true;
        state.writes.clear();
        state.reads.clear();
    }
}

#[async_trait]
impl BackendTransaction for MemoryTransaction {
    async fn get(&self, path: &DocumentPath) -> DatabaseResult<RawSnapshot> {
        let mut snapshots = self.read(std::slice::from_ref(path)).await?;

        snapshots
            .pop()
            .ok_or_else(|| DatabaseError::Internal(format!("no snapshot read for {}", path)))
    }

    async fn get_all(&self, paths: &[DocumentPath]) -> DatabaseResult<Vec<RawSnapshot>> {
        self.read(paths).await
    }

    async fn create(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<()> {
        self.buffer(path, WriteOp::Create(fields)).await
    }

    async fn set(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<()> {
        self.buffer(path, WriteOp::Set(fields)).await
    }

    async fn update(&self, path: &DocumentPath, fields: Document) -> DatabaseResult<()> {
        self.buffer(path, WriteOp::Update(fields)).await
    }

    async fn delete(&self, path: &DocumentPath) -> DatabaseResult<()> {
        self.buffer(path, WriteOp::Delete).await
    }
}
