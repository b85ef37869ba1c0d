use firetype::{database, default_connection, install_default_connection, memory::InMemoryDatabase, prelude::*};
use std::sync::Arc;

// The default connection is process-wide, so its whole lifecycle is exercised by one test.
#[tokio::test]
async fn test_default_connection_lifecycle() {
    assert!(default_connection().is_none());
    assert!(matches!(database(None), Err(DatabaseError::Initialization(_))));

    // An explicit connection works without a default
    let explicit = database(Some(Arc::new(InMemoryDatabase::new()))).unwrap();
    explicit.doc("users/explicit").set(&bson::doc! { "n": 1 }).await.unwrap();

    install_default_connection(Arc::new(InMemoryDatabase::new())).unwrap();

    let first = database(None).unwrap();
    let second = database(None).unwrap();
    first.doc("users/fleker").set(&bson::doc! { "required": true }).await.unwrap();

    // Handles built from the default share one connection
    let snapshot = second.doc("users/fleker").get::<bson::Document>().await.unwrap();
    assert!(snapshot.exists());
    assert!(!second.doc("users/explicit").get::<bson::Document>().await.unwrap().exists());

    let err = install_default_connection(Arc::new(InMemoryDatabase::new())).unwrap_err();
    assert!(matches!(err, DatabaseError::Initialization(_)));

    // Shutting down a shared handle leaves the others usable
    first.shutdown().await.unwrap();
    assert!(second.doc("users/fleker").get::<bson::Document>().await.unwrap().exists());
}
