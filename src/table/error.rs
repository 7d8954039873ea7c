//! Table error types

use crate::storage::KvError;
use thiserror::Error;

/// Errors that can occur in the typed table layer
#[derive(Error, Debug)]
pub enum TableError {
    /// Requested key does not exist (or no earlier key matched)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Key or value bytes could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Value could not be encoded for storage
    #[error("Encode error: {0}")]
    Encode(String),

    /// Adapter or engine failure
    #[error("Storage error: {0}")]
    Kv(#[source] KvError),
}

impl TableError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TableError::NotFound(_))
    }
}

impl From<KvError> for TableError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::NotFound => TableError::NotFound("key".to_string()),
            other => TableError::Kv(other),
        }
    }
}

impl From<bincode::Error> for TableError {
    fn from(err: bincode::Error) -> Self {
        TableError::Decode(err.to_string())
    }
}

/// Result type alias for table operations
pub type TableResult<T> = Result<T, TableError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_not_found_maps_to_not_found() {
        let err: TableError = KvError::NotFound.into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_engine_error_stays_engine_error() {
        let err: TableError = KvError::Lock("poisoned".to_string()).into();
        assert!(!err.is_not_found());
        assert!(matches!(err, TableError::Kv(KvError::Lock(_))));
    }

    #[test]
    fn test_engine_error_is_in_source_chain() {
        use std::error::Error as _;

        let err: TableError = KvError::engine("get", b"k", "disk on fire").into();
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source, Some(KvError::engine("get", b"k", "disk on fire").to_string()));
        assert!(err.source().and_then(|s| s.source()).is_some());
    }

    #[test]
    fn test_error_display() {
        let err = TableError::Decode("truncated key".to_string());
        assert_eq!(err.to_string(), "Decode error: truncated key");
    }
}
