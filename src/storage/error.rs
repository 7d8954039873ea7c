//! Key-value adapter error types
//!
//! `NotFound` is an expected outcome and is kept apart from engine failures so
//! callers can branch on it without string matching.

use std::error::Error as StdError;
use thiserror::Error;

/// Errors that can occur in the key-value adapter
#[derive(Error, Debug)]
pub enum KvError {
    /// The requested key does not exist
    #[error("Key not found")]
    NotFound,

    /// The engine failed while executing an operation
    #[error("Engine error during {op} (key: {key}): {source}")]
    Engine {
        op: &'static str,
        key: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl KvError {
    /// Wrap an engine failure with the operation and key it happened on
    pub fn engine(
        op: &'static str,
        key: &[u8],
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        KvError::Engine {
            op,
            key: display_key(key),
            source: source.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::NotFound)
    }
}

/// Printable form of a raw key for log and error messages
pub fn display_key(key: &[u8]) -> String {
    key.iter()
        .flat_map(|b| std::ascii::escape_default(*b))
        .map(char::from)
        .collect()
}

/// Result type alias for adapter operations
pub type KvResult<T> = Result<T, KvError>;
