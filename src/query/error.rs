//! Query error types
//!
//! Defines all error conditions that can occur while building filters,
//! validating queries and executing them.

use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query failed validation before execution
    #[error("Invalid query: {0}")]
    Validation(String),

    /// Filter condition could not be compiled
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// Unknown or malformed aggregation
    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Query execution failed
    #[error("Execution error: {0}")]
    Execution(String),
}

impl From<tokio::task::JoinError> for QueryError {
    fn from(err: tokio::task::JoinError) -> Self {
        QueryError::Execution(err.to_string())
    }
}

/// Result type for query operations
///
/// Named apart from [`crate::types::QueryResult`], the page returned to callers.
pub type EngineResult<T> = Result<T, QueryError>;
