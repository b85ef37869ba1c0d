//! Main firetype crate: generic-typed handles over a document database connection.
//!
//! This crate is the primary entry point for users of firetype. It re-exports the core
//! handles and traits from the sub-crates and provides access to the bundled backends.
//!
//! # Features
//!
//! - **Typed reads and writes** - Define document shapes with Serde; `T` lives only at compile time
//! - **Pass-through semantics** - Every operation forwards to one backend call, errors unchanged
//! - **Immutable query builder** - `where_`, `order_by`, `limit`, cursors, each returning a new handle
//! - **Transactions** - Typed transactional reads and writes, retried by the backend on contention
//!
//! # Quick Start
//!
//! ```ignore
//! use firetype::{prelude::*, memory::InMemoryDatabase};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Profile {
//!     pub required: bool,
//!     pub optional: Option<bool>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DatabaseResult<()> {
//!     let db = Database::new(InMemoryDatabase::builder().build().await?);
//!     let fleker = db.collection("users").doc("fleker");
//!
//!     // Create the document; a second create would fail with `AlreadyExists`
//!     fleker.create(&Profile { required: false, optional: None }).await?;
//!
//!     // Merge a partial update into it
//!     fleker.update(&bson::doc! { "optional": true }).await?;
//!
//!     let snapshot = fleker.get::<Profile>().await?;
//!     println!("{:?}", snapshot.data()?);
//!
//!     // Query with accumulated constraints
//!     let required = db
//!         .collection("users")
//!         .where_("required", "==", false)
//!         .order_by("__name__", Direction::Desc)
//!         .limit(10)
//!         .get::<Profile>()
//!         .await?;
//!     println!("{} matching profiles", required.size());
//!
//!     db.shutdown().await
//! }
//! ```
//!
//! # Default Connection
//!
//! [`database`] builds a root handle from an explicit connection or, given `None`, from the
//! process-wide default installed once with [`install_default_connection`].
//!
//! ```ignore
//! use firetype::{database, install_default_connection, memory::InMemoryDatabase};
//! use std::sync::Arc;
//!
//! install_default_connection(Arc::new(InMemoryDatabase::new()))?;
//! let db = database(None)?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - In-memory database for development and testing

pub mod prelude;

pub use firetype_core::{
    backend, collection, database, document, error, path, query, reference, snapshot, timestamp,
    transaction,
};

pub use firetype_core::database::{Database, database, default_connection, install_default_connection};
pub use firetype_core::error::{DatabaseError, DatabaseResult};

// Re-export BSON types for convenience
pub use bson;

/// In-memory database backend implementations.
pub mod memory {
    pub use firetype_memory::{InMemoryDatabase, InMemoryDatabaseBuilder};
}
