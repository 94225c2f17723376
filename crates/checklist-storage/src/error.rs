//! Storage error types.

use std::time::Duration;

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No checklist matches the `(user_id, checklist_id)` pair.
    #[error("checklist not found: user {user_id}, id {checklist_id}")]
    ChecklistNotFound { user_id: u64, checklist_id: String },

    /// Database connection error.
    #[error("database connection error: {message}")]
    ConnectionError { message: String },

    /// Database query error.
    #[error("database query error: {message}")]
    QueryError { message: String },

    /// Serialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },

    /// The operation did not finish within the configured timeout.
    #[error("query timeout after {timeout:?}: {operation}")]
    QueryTimeout { operation: String, timeout: Duration },

    /// The caller cancelled the operation before it completed.
    #[error("operation cancelled: {operation}")]
    Cancelled { operation: String },
}

impl StorageError {
    /// Returns true for errors that describe a missing checklist rather than
    /// a failure of the backend.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::ChecklistNotFound { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::SerializationError {
            message: err.to_string(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
