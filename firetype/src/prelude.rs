//! Convenient re-exports of commonly used types from firetype.
//!
//! Import this prelude module to quickly access the most frequently used types
//! and traits without needing to import from multiple sub-modules:
//!
//! ```ignore
//! use firetype::prelude::*;
//! ```
//!
//! This provides access to:
//! - The root handle and the default connection
//! - Collection, document and transaction handles
//! - Typed snapshots and query results
//! - Query construction and filtering
//! - Error types

pub use firetype_core::{
    database::{Database, install_default_connection},
    collection::CollectionRef,
    reference::DocumentRef,
    transaction::Transaction,
    snapshot::{DocumentSnapshot, QueryDocument, QuerySnapshot},
    document::DocumentExt,
    backend::{DynDatabaseBackend, DatabaseBackendBuilder, WriteResult},
    query::{Query, Expr, Filter, FieldOp, Direction},
    path::FIELD_DOCUMENT_ID,
    timestamp::Timestamp,
    error::{DatabaseError, DatabaseResult},
};

pub use crate::database;
