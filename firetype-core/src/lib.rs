//! Generic-typed wrappers over a document database connection.
//!
//! This crate is the core of the firetype project and provides:
//!
//! - **Backend abstraction** ([`backend`]) - Traits implemented by database connections
//! - **Root handle** ([`database`]) - Connection wrapper, default connection, transactions
//! - **Collections** ([`collection`]) - Collection references and query building
//! - **Documents** ([`reference`]) - Document references and typed reads and writes
//! - **Transactions** ([`transaction`]) - Typed operations scoped to one transaction attempt
//! - **Snapshots** ([`snapshot`]) - Typed point-in-time reads and query results
//! - **Queries** ([`query`]) - Filter expressions, orderings and cursors
//! - **Paths** ([`path`]) - Collection, document and field addressing
//! - **Conversion** ([`document`]) - Typed values to and from document fields
//! - **Error handling** ([`error`]) - The error taxonomy of the backend contract
//!
//! Every wrapper operation forwards to exactly one backend call. The type parameter `T`
//! on reads and writes exists only at compile time: values are converted with serde, and
//! no schema is checked beyond what that conversion enforces.
//!
//! # Example
//!
//! ```ignore
//! use firetype::{Database, memory::InMemoryDatabase};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Profile {
//!     pub required: bool,
//!     pub optional: Option<bool>,
//! }
//!
//! let db = Database::new(InMemoryDatabase::new());
//! let fleker = db.collection("users").doc("fleker");
//!
//! fleker.create(&Profile { required: false, optional: None }).await?;
//! let profile = fleker.get::<Profile>().await?.data()?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as firetype_core;

pub mod backend;
pub mod collection;
pub mod database;
pub mod document;
pub mod error;
pub mod path;
pub mod query;
pub mod reference;
pub mod snapshot;
pub mod timestamp;
pub mod transaction;
