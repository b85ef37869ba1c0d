//! Error types and result types for database operations.
//!
//! The wrappers in this crate define no failure modes of their own: every error a caller
//! observes was raised by the backend (or by serde while converting typed data) and is
//! propagated unchanged. [`DatabaseError`] is therefore the failure taxonomy of the backend
//! contract, and its variants mirror the status codes of a managed document database.
//!
//! Use [`DatabaseResult<T>`] as the return type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a database backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DatabaseError {
    /// The operation was cancelled by the caller or the service.
    #[error("Cancelled: {0}")]
    Cancelled(String),
    /// An error the service could not classify.
    #[error("Unknown error: {0}")]
    Unknown(String),
    /// The request was malformed, e.g. an invalid query operator or non-map document data.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The deadline expired before the operation could complete.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),
    /// The addressed document does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
    /// A document already exists at the addressed location.
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    /// The caller is not allowed to perform the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// A quota or resource limit was hit.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),
    /// The system is not in a state required for the operation.
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),
    /// The operation was aborted, typically because of transaction contention.
    #[error("Aborted: {0}")]
    Aborted(String),
    /// The operation was attempted past the valid range.
    #[error("Out of range: {0}")]
    OutOfRange(String),
    /// The operation is not supported by the backend.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
    /// An invariant inside the backend was broken.
    #[error("Internal error: {0}")]
    Internal(String),
    /// The service is currently unavailable.
    #[error("Unavailable: {0}")]
    Unavailable(String),
    /// Unrecoverable data loss or corruption.
    #[error("Data loss: {0}")]
    DataLoss(String),
    /// The request has no valid credentials.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    /// Typed data could not be converted to or from document fields.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// No connection was available to build a database handle.
    #[error("Initialization error: {0}")]
    Initialization(String),
}

/// A specialized `Result` type for database operations.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

impl DatabaseError {
    /// Returns the numeric status code of this error.
    ///
    /// Codes follow the canonical RPC status numbering used by managed document databases.
    /// [`Serialization`](Self::Serialization) and [`Initialization`](Self::Initialization) are
    /// raised locally and report `3` (invalid argument) and `9` (failed precondition).
    pub fn code(&self) -> i32 {
        match self {
            Self::Cancelled(_) => 1,
            Self::Unknown(_) => 2,
            Self::InvalidArgument(_) | Self::Serialization(_) => 3,
            Self::DeadlineExceeded(_) => 4,
            Self::NotFound(_) => 5,
            Self::AlreadyExists(_) => 6,
            Self::PermissionDenied(_) => 7,
            Self::ResourceExhausted(_) => 8,
            Self::FailedPrecondition(_) | Self::Initialization(_) => 9,
            Self::Aborted(_) => 10,
            Self::OutOfRange(_) => 11,
            Self::Unimplemented(_) => 12,
            Self::Internal(_) => 13,
            Self::Unavailable(_) => 14,
            Self::DataLoss(_) => 15,
            Self::Unauthenticated(_) => 16,
        }
    }

    /// Builds an error from a service status code and message.
    ///
    /// Unrecognized codes map to [`Unknown`](Self::Unknown).
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();

        match code {
            1 => Self::Cancelled(message),
            3 => Self::InvalidArgument(message),
            4 => Self::DeadlineExceeded(message),
            5 => Self::NotFound(message),
            6 => Self::AlreadyExists(message),
            7 => Self::PermissionDenied(message),
            8 => Self::ResourceExhausted(message),
            9 => Self::FailedPrecondition(message),
            10 => Self::Aborted(message),
            11 => Self::OutOfRange(message),
            12 => Self::Unimplemented(message),
            13 => Self::Internal(message),
            14 => Self::Unavailable(message),
            15 => Self::DataLoss(message),
            16 => Self::Unauthenticated(message),
            _ => Self::Unknown(message),
        }
    }

    /// Whether a backend may safely retry the operation that produced this error.
    ///
    /// The wrappers never act on this; it is offered to backends and callers.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Aborted(_)
                | Self::Unavailable(_)
                | Self::DeadlineExceeded(_)
                | Self::ResourceExhausted(_)
        )
    }
}

impl From<BsonError> for DatabaseError {
    fn from(err: BsonError) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DatabaseError {
    fn from(err: SerdeJsonError) -> Self {
        DatabaseError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_roundtrip() {
        for code in 1..=16 {
            if code == 2 {
                continue;
            }
            assert_eq!(DatabaseError::from_code(code, "x").code(), code);
        }
    }

    #[test]
    fn test_unrecognized_code_is_unknown() {
        assert_eq!(
            DatabaseError::from_code(42, "mystery"),
            DatabaseError::Unknown("mystery".to_string())
        );
        assert_eq!(DatabaseError::from_code(2, "x").code(), 2);
    }

    #[test]
    fn test_is_retryable() {
        assert!(DatabaseError::Aborted("contention".into()).is_retryable());
        assert!(DatabaseError::Unavailable("down".into()).is_retryable());
        assert!(!DatabaseError::NotFound("users/a".into()).is_retryable());
        assert!(!DatabaseError::AlreadyExists("users/a".into()).is_retryable());
    }

    #[test]
    fn test_json_error_is_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(DatabaseError::from(err), DatabaseError::Serialization(_)));
    }

    #[test]
    fn test_display() {
        let err = DatabaseError::AlreadyExists("users/fleker".into());
        assert_eq!(err.to_string(), "Already exists: users/fleker");
    }
}
