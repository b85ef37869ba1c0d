use firetype::{memory::InMemoryDatabase, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    required: bool,
    optional: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct ProfileUpdate {
    required: Option<bool>,
    optional: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Post {
    title: String,
    likes: i64,
}

fn database() -> Database {
    Database::new(InMemoryDatabase::new())
}

#[tokio::test]
async fn test_profile_lifecycle() {
    let db = database();
    let fleker = db.collection("users").doc("fleker");

    fleker
        .create(&Profile { required: false, optional: None })
        .await
        .unwrap();

    let err = fleker
        .create(&Profile { required: true, optional: None })
        .await
        .unwrap_err();
    assert!(matches!(err, DatabaseError::AlreadyExists(_)));

    fleker.update(&bson::doc! { "optional": true }).await.unwrap();

    let snapshot = fleker.get::<Profile>().await.unwrap();
    assert!(snapshot.exists());
    assert_eq!(snapshot.id(), "fleker");
    assert_eq!(
        snapshot.data().unwrap(),
        Some(Profile { required: false, optional: Some(true) })
    );

    let required = db
        .collection("users")
        .where_("required", "==", false)
        .get::<Profile>()
        .await
        .unwrap();
    assert_eq!(required.size(), 1);
    assert_eq!(required.docs()[0].id(), "fleker");
    assert_eq!(required.docs()[0].get::<bool>("optional").unwrap(), Some(true));
}

#[tokio::test]
async fn test_set_then_get_returns_data() {
    let db = database();
    let post = db.doc("posts/hello");
    let data = Post { title: "Hello".to_string(), likes: 3 };

    let written = post.set(&data).await.unwrap();
    let snapshot = post.get::<Post>().await.unwrap();

    assert_eq!(snapshot.data().unwrap(), Some(data));
    assert_eq!(snapshot.raw().update_time(), Some(written.write_time));
    assert!(snapshot.read_time() > written.write_time);
    assert_eq!(snapshot.reference(), post);
}

#[tokio::test]
async fn test_set_replaces_whole_document() {
    let db = database();
    let post = db.doc("posts/hello");

    post.set(&bson::doc! { "title": "Hello", "draft": true }).await.unwrap();
    post.set(&Post { title: "Hi".to_string(), likes: 0 }).await.unwrap();

    let snapshot = post.get::<bson::Document>().await.unwrap();
    assert_eq!(
        snapshot.data().unwrap(),
        Some(bson::doc! { "title": "Hi", "likes": 0_i64 })
    );
}

#[tokio::test]
async fn test_update_merges_nested_fields() {
    let db = database();
    let user = db.doc("users/ada");

    user.set(&bson::doc! { "name": "Ada", "address": { "city": "London", "zip": "N1" } })
        .await
        .unwrap();
    user.update(&bson::doc! { "address.city": "Cambridge" }).await.unwrap();

    let snapshot = user.get::<bson::Document>().await.unwrap();
    assert_eq!(
        snapshot.data().unwrap(),
        Some(bson::doc! { "name": "Ada", "address": { "city": "Cambridge", "zip": "N1" } })
    );
}

#[tokio::test]
async fn test_partial_update_keeps_unset_fields() {
    let db = database();
    let fleker = db.doc("users/fleker");
    fleker
        .create(&Profile { required: false, optional: None })
        .await
        .unwrap();

    fleker
        .update(&ProfileUpdate { optional: Some(true), ..Default::default() })
        .await
        .unwrap();

    let stored = fleker.get::<bson::Document>().await.unwrap().data().unwrap();
    assert_eq!(stored, Some(bson::doc! { "required": false, "optional": true }));
    assert_eq!(
        fleker.get::<Profile>().await.unwrap().data().unwrap(),
        Some(Profile { required: false, optional: Some(true) })
    );
}

#[tokio::test]
async fn test_none_fields_are_not_stored() {
    let db = database();
    let users = db.collection("users");
    users
        .doc("fleker")
        .create(&Profile { required: false, optional: None })
        .await
        .unwrap();

    let stored = users.doc("fleker").get::<bson::Document>().await.unwrap().data().unwrap();
    assert_eq!(stored, Some(bson::doc! { "required": false }));

    let all = users.get::<Profile>().await.unwrap();
    assert_eq!(all.docs()[0].get::<bool>("optional").unwrap(), None);

    let null_optional = users.where_("optional", "==", bson::Bson::Null).get::<Profile>().await.unwrap();
    assert!(null_optional.is_empty());
}

#[tokio::test]
async fn test_explicit_null_fields() {
    let db = database();
    let users = db.collection("users");
    let fleker = users.doc("fleker");
    fleker
        .create(&Profile { required: false, optional: Some(true) })
        .await
        .unwrap();

    fleker
        .update_fields(bson::doc! { "optional": bson::Bson::Null })
        .await
        .unwrap();

    let null_optional = users.where_("optional", "==", bson::Bson::Null).get::<Profile>().await.unwrap();
    assert_eq!(null_optional.size(), 1);

    let doc = &null_optional.docs()[0];
    assert_eq!(doc.get::<bool>("optional").unwrap(), None);
    assert_eq!(doc.get::<Option<bool>>("optional").unwrap(), Some(None));
    assert_eq!(doc.data().unwrap(), Profile { required: false, optional: None });
}

#[tokio::test]
async fn test_update_missing_document_fails() {
    let db = database();
    let err = db
        .doc("users/nobody")
        .update(&bson::doc! { "optional": true })
        .await
        .unwrap_err();

    assert!(matches!(err, DatabaseError::NotFound(_)));
    assert!(!db.doc("users/nobody").get::<Profile>().await.unwrap().exists());
}

#[tokio::test]
async fn test_missing_document_snapshot() {
    let db = database();
    let snapshot = db.doc("users/ghost").get::<Profile>().await.unwrap();

    assert!(!snapshot.exists());
    assert_eq!(snapshot.id(), "ghost");
    assert_eq!(snapshot.data().unwrap(), None);
}

#[tokio::test]
async fn test_data_shape_mismatch_is_serialization_error() {
    let db = database();
    let post = db.doc("posts/odd");
    post.set(&bson::doc! { "title": 7 }).await.unwrap();

    let snapshot = post.get::<Post>().await.unwrap();
    assert!(matches!(snapshot.data(), Err(DatabaseError::Serialization(_))));
}

#[tokio::test]
async fn test_delete_returns_same_reference() {
    let db = database();
    let post = db.doc("posts/bye");
    post.set(&Post { title: "Bye".to_string(), likes: 1 }).await.unwrap();

    let returned = post.delete().await.unwrap();
    assert!(std::ptr::eq(returned, &post));
    assert!(!post.get::<Post>().await.unwrap().exists());

    // Deleting again is not an error
    post.delete().await.unwrap();
}

#[tokio::test]
async fn test_add_generates_unique_ids() {
    let db = database();
    let posts = db.collection("posts");

    let first = posts.add(&Post { title: "A".to_string(), likes: 0 }).await.unwrap();
    let second = posts.add(&Post { title: "B".to_string(), likes: 0 }).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert_eq!(first.id().len(), 20);
    assert_eq!(first.parent().path(), posts.path());

    let stored = first.get::<Post>().await.unwrap().data().unwrap();
    assert_eq!(stored.map(|post| post.title), Some("A".to_string()));
}

#[tokio::test]
async fn test_non_map_data_is_rejected() {
    let db = database();
    let err = db.doc("values/number").set(&42).await.unwrap_err();

    assert!(matches!(err, DatabaseError::InvalidArgument(_)));
}

#[tokio::test]
async fn test_sub_collection_navigation() {
    let db = database();
    let user = db.collection("users").doc("fleker");
    let comments = user.collection("comments");
    let comment = comments.doc("first");

    assert_eq!(comment.path().as_str(), "users/fleker/comments/first");
    assert_eq!(comments.parent(), Some(user.clone()));
    assert_eq!(comment.parent().parent(), Some(user.clone()));
    assert!(db.collection("users").parent().is_none());
    assert_eq!(db.doc("users/fleker/comments/first"), comment);

    comment.set(&bson::doc! { "text": "hi" }).await.unwrap();
    user.set(&Profile { required: true, optional: None }).await.unwrap();

    // Queries only see documents directly inside the collection
    let users = db.collection("users").get::<bson::Document>().await.unwrap();
    assert_eq!(users.size(), 1);
    let nested = comments.get::<bson::Document>().await.unwrap();
    assert_eq!(nested.iter().map(|doc| doc.id()).collect::<Vec<_>>(), vec!["first"]);
}

#[tokio::test]
async fn test_raw_connection_access() {
    let db = database();

    assert!(db.raw_as::<InMemoryDatabase>().is_some());

    let path = firetype::path::DocumentPath::new("users/raw");
    db.raw()
        .set_document(&path, bson::doc! { "required": true })
        .await
        .unwrap();

    let snapshot = db.doc("users/raw").get::<Profile>().await.unwrap();
    assert_eq!(
        snapshot.data().unwrap(),
        Some(Profile { required: true, optional: None })
    );
}
