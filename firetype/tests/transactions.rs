use async_trait::async_trait;
use bson::Document;
use firetype::{
    backend::{DatabaseBackend, TransactionRunner},
    memory::InMemoryDatabase,
    path::{CollectionPath, DocumentPath},
    prelude::*,
    query::Query,
    snapshot::{RawQuerySnapshot, RawSnapshot},
};
use serde::{Deserialize, Serialize};
use std::sync::{
    Mutex,
    atomic::{AtomicUsize, Ordering},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Counter {
    value: i64,
}

async fn counter_value(db: &Database, path: &str) -> Option<i64> {
    db.doc(path)
        .get::<Counter>()
        .await
        .unwrap()
        .data()
        .unwrap()
        .map(|counter| counter.value)
}

#[tokio::test]
async fn test_transaction_commits_and_returns_value() {
    let db = Database::new(InMemoryDatabase::new());
    let counter = db.doc("counters/visits");

    let value = db
        .run_transaction(|tx| {
            let counter = counter.clone();
            async move {
                let current = tx.get::<Counter>(&counter).await?.data()?.map_or(0, |c| c.value);
                tx.set(&counter, &Counter { value: current + 1 }).await?;
                Ok(current + 1)
            }
        })
        .await
        .unwrap();

    assert_eq!(value, 1);
    assert_eq!(counter_value(&db, "counters/visits").await, Some(1));
}

#[tokio::test]
async fn test_contended_attempt_is_retried() {
    let db = Database::new(InMemoryDatabase::new());
    let counter = db.doc("counters/visits");
    counter.set(&Counter { value: 1 }).await.unwrap();

    let attempts = AtomicUsize::new(0);
    let attempts = &attempts;

    let value = db
        .run_transaction(|tx| {
            let counter = counter.clone();
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                let current = tx.get::<Counter>(&counter).await?.data()?.map_or(0, |c| c.value);

                if attempt == 1 {
                    // A write outside the transaction invalidates this attempt's read
                    counter.set(&Counter { value: 10 }).await?;
                }

                tx.set(&counter, &Counter { value: current + 1 }).await?;
                Ok(current + 1)
            }
        })
        .await
        .unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(value, 11);
    assert_eq!(counter_value(&db, "counters/visits").await, Some(11));
}

#[tokio::test]
async fn test_retries_are_bounded() {
    let backend = InMemoryDatabase::builder()
        .with_max_transaction_attempts(3)
        .build()
        .await
        .unwrap();
    let db = Database::new(backend);
    let counter = db.doc("counters/visits");

    let attempts = AtomicUsize::new(0);
    let attempts = &attempts;

    let err = db
        .run_transaction(|tx| {
            let counter = counter.clone();
            async move {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) as i64 + 1;
                tx.get::<Counter>(&counter).await?;
                counter.set(&Counter { value: attempt }).await?;
                tx.set(&counter, &Counter { value: -1 }).await?;
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DatabaseError::Aborted(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(counter_value(&db, "counters/visits").await, Some(3));
}

#[tokio::test]
async fn test_failing_update_rolls_back() {
    let db = Database::new(InMemoryDatabase::new());
    let counter = db.doc("counters/visits");

    let attempts = AtomicUsize::new(0);
    let attempts = &attempts;

    let err = db
        .run_transaction(|tx| {
            let counter = counter.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                tx.set(&counter, &Counter { value: 5 }).await?;
                Err::<(), _>(DatabaseError::Unauthenticated("token expired".to_string()))
            }
        })
        .await
        .unwrap_err();

    assert_eq!(err, DatabaseError::Unauthenticated("token expired".to_string()));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(counter_value(&db, "counters/visits").await, None);
}

#[tokio::test]
async fn test_write_precondition_failure_surfaces() {
    let db = Database::new(InMemoryDatabase::new());
    let existing = db.doc("counters/existing");
    existing.set(&Counter { value: 1 }).await.unwrap();

    let err = db
        .run_transaction(|tx| {
            let existing = existing.clone();
            async move {
                tx.create(&existing, &Counter { value: 2 }).await?;
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DatabaseError::AlreadyExists(_)));
    assert_eq!(counter_value(&db, "counters/existing").await, Some(1));
}

#[tokio::test]
async fn test_read_after_write_is_rejected() {
    let db = Database::new(InMemoryDatabase::new());
    let counter = db.doc("counters/visits");

    let err = db
        .run_transaction(|tx| {
            let counter = counter.clone();
            async move {
                tx.set(&counter, &Counter { value: 1 }).await?;
                tx.get::<Counter>(&counter).await?;
                Ok(())
            }
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DatabaseError::InvalidArgument(_)));
    assert_eq!(counter_value(&db, "counters/visits").await, None);
}

#[tokio::test]
async fn test_get_all_preserves_order() {
    let db = Database::new(InMemoryDatabase::new());
    let a = db.doc("counters/a");
    let b = db.doc("counters/b");
    let c = db.doc("counters/c");
    a.set(&Counter { value: 1 }).await.unwrap();
    c.set(&Counter { value: 3 }).await.unwrap();

    let values = db
        .run_transaction(|tx| {
            let refs = vec![c.clone(), b.clone(), a.clone()];
            async move {
                let snapshots: Vec<DocumentSnapshot<Counter>> = tx.get_all(&refs).await?;
                let mut values = Vec::new();
                for snapshot in &snapshots {
                    values.push((snapshot.id().to_string(), snapshot.data()?.map(|c| c.value)));
                }
                Ok(values)
            }
        })
        .await
        .unwrap();

    assert_eq!(
        values,
        vec![
            ("c".to_string(), Some(3)),
            ("b".to_string(), None),
            ("a".to_string(), Some(1)),
        ]
    );
}

#[tokio::test]
async fn test_transaction_writes_chain() {
    let db = Database::new(InMemoryDatabase::new());
    let a = db.doc("counters/a");
    let b = db.doc("counters/b");
    b.set(&Counter { value: 1 }).await.unwrap();

    db.run_transaction(|tx| {
        let (a, b) = (a.clone(), b.clone());
        async move {
            tx.create(&a, &Counter { value: 1 })
                .await?
                .update(&b, &bson::doc! { "value": 2_i64 })
                .await?
                .update_fields(&b, bson::doc! { "note": bson::Bson::Null })
                .await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(counter_value(&db, "counters/a").await, Some(1));
    assert_eq!(counter_value(&db, "counters/b").await, Some(2));
    let stored = b.get::<Document>().await.unwrap().data().unwrap();
    assert_eq!(stored, Some(bson::doc! { "value": 2_i64, "note": bson::Bson::Null }));

    db.run_transaction(|tx| {
        let a = a.clone();
        async move {
            tx.delete(&a).await?;
            Ok(())
        }
    })
    .await
    .unwrap();

    assert_eq!(counter_value(&db, "counters/a").await, None);
}

#[tokio::test]
async fn test_handle_is_invalid_after_attempt() {
    let db = Database::new(InMemoryDatabase::new());
    let counter = db.doc("counters/visits");
    let leaked = Mutex::new(None);
    let leaked_ref = &leaked;

    db.run_transaction(|tx| async move {
        *leaked_ref.lock().unwrap() = Some(tx.clone());
        Ok(())
    })
    .await
    .unwrap();

    let tx = leaked.lock().unwrap().take().unwrap();
    let err = tx.get::<Counter>(&counter).await.unwrap_err();
    assert!(matches!(err, DatabaseError::FailedPrecondition(_)));
}

async fn increment(db: &Database, counter: &DocumentRef) -> DatabaseResult<()> {
    db.run_transaction(|tx| {
        let counter = counter.clone();
        async move {
            let current = tx.get::<Counter>(&counter).await?.data()?.map_or(0, |c| c.value);
            tokio::task::yield_now().await;
            tx.set(&counter, &Counter { value: current + 1 }).await?;
            Ok(())
        }
    })
    .await
}

#[tokio::test]
async fn test_concurrent_increments_serialize() {
    let db = Database::new(InMemoryDatabase::new());
    let counter = db.doc("counters/visits");

    let (first, second) = futures::join!(increment(&db, &counter), increment(&db, &counter));
    first.unwrap();
    second.unwrap();

    assert_eq!(counter_value(&db, "counters/visits").await, Some(2));
}

#[derive(Debug)]
struct RejectingBackend;

fn denied() -> DatabaseError {
    DatabaseError::PermissionDenied("missing or insufficient permissions".to_string())
}

#[async_trait]
impl DatabaseBackend for RejectingBackend {
    async fn get_document(&self, _path: &DocumentPath) -> DatabaseResult<RawSnapshot> {
        Err(denied())
    }

    async fn create_document(&self, _path: &DocumentPath, _fields: Document) -> DatabaseResult<WriteResult> {
        Err(denied())
    }

    async fn set_document(&self, _path: &DocumentPath, _fields: Document) -> DatabaseResult<WriteResult> {
        Err(denied())
    }

    async fn update_document(&self, _path: &DocumentPath, _fields: Document) -> DatabaseResult<WriteResult> {
        Err(denied())
    }

    async fn delete_document(&self, _path: &DocumentPath) -> DatabaseResult<WriteResult> {
        Err(denied())
    }

    async fn add_document(&self, _collection: &CollectionPath, _fields: Document) -> DatabaseResult<DocumentPath> {
        Err(denied())
    }

    async fn run_query(&self, _collection: &CollectionPath, _query: &Query) -> DatabaseResult<RawQuerySnapshot> {
        Err(denied())
    }

    async fn run_transaction(&self, _runner: &mut dyn TransactionRunner) -> DatabaseResult<()> {
        Err(denied())
    }
}

#[tokio::test]
async fn test_backend_errors_pass_through_unchanged() {
    let db = Database::new(RejectingBackend);
    let doc = db.doc("users/fleker");
    let data = Counter { value: 1 };

    assert_eq!(doc.get::<Counter>().await.unwrap_err(), denied());
    assert_eq!(doc.create(&data).await.unwrap_err(), denied());
    assert_eq!(doc.set(&data).await.unwrap_err(), denied());
    assert_eq!(doc.update(&bson::doc! { "value": 2 }).await.unwrap_err(), denied());
    assert_eq!(doc.delete().await.unwrap_err(), denied());
    assert_eq!(db.collection("users").add(&data).await.unwrap_err(), denied());
    assert_eq!(
        db.collection("users").where_("value", ">", 0).get::<Counter>().await.unwrap_err(),
        denied()
    );

    let err = db
        .run_transaction(|_tx| async move { Ok(()) })
        .await
        .unwrap_err();
    assert_eq!(err, denied());

    assert!(db.raw_as::<InMemoryDatabase>().is_none());
    assert!(db.raw_as::<RejectingBackend>().is_some());
}
