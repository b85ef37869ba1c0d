//! In-memory database backend for firetype.
//!
//! This crate provides a thread-safe, in-memory implementation of the `DatabaseBackend`
//! trait that models a managed document database. It is the backend used in development
//! and tests.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using async-aware locks
//! - **Path-addressed storage** - Documents and sub-collection documents keyed by full path
//! - **Full query support** - Filters, composite filters, orderings, cursors and pagination
//! - **Optimistic transactions** - Read versions validated at commit, retried on contention
//!
//! # Quick Start
//!
//! ```ignore
//! use firetype::{Database, memory::InMemoryDatabase};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = InMemoryDatabase::builder().build().await?;
//!     let db = Database::new(backend);
//!
//!     let alice = db.collection("users").add(&User { name: "Alice".to_string() }).await?;
//!     println!("created {}", alice.id());
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as firetype_memory;

pub mod store;
pub mod evaluator;
mod transaction;

pub use store::{InMemoryDatabase, InMemoryDatabaseBuilder};
