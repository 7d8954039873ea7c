//! Query error types
//!
//! Defines all error conditions that can occur while answering a history query.

use crate::table::TableError;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Invalid time window specified
    #[error("Invalid time window: {0}")]
    InvalidWindow(String),

    /// Table or storage layer error
    #[error("Table error: {0}")]
    Table(#[from] TableError),

    /// Result could not be rendered
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A blocking query task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),
}

impl QueryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, QueryError::Table(e) if e.is_not_found())
    }
}

impl From<crate::storage::KvError> for QueryError {
    fn from(err: crate::storage::KvError) -> Self {
        QueryError::Table(err.into())
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
