//! Storage error types
//!
//! Defines all errors that can occur in the storage layer.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite reported an error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Fields encoding/decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filter or sort names a field that is not a stored column
    #[error("Invalid field: {0}")]
    InvalidField(String),

    /// Timeline bucket width must be positive
    #[error("Invalid bucket width: {0}")]
    InvalidBucket(i64),

    /// Requested record does not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Store was closed
    #[error("Storage is closed")]
    Closed,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::NotFound("line_7".to_string());
        assert_eq!(err.to_string(), "Record not found: line_7");

        let err = StorageError::InvalidField("user".to_string());
        assert_eq!(err.to_string(), "Invalid field: user");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let storage_err: StorageError = io_err.into();
        assert!(matches!(storage_err, StorageError::Io(_)));
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let storage_err: StorageError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(storage_err, StorageError::Database(_)));
    }
}
