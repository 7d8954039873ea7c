//! Kubetrail Storage Adapter
//!
//! The transactional key-value layer the rest of the crate is written
//! against:
//!
//! - **kv**: Capability traits (`KvStore`, `ReadTxn`, `WriteTxn`) and `KvIter`
//! - **sqlite**: SQLite-backed engine for on-disk stores
//! - **memory**: In-memory engine for tests and benches
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Table / Query code
//!        ↓  (&dyn ReadTxn / &dyn WriteTxn only)
//! KvStore::view / KvStore::update
//!        ↓
//! SqliteKv | MemoryKv
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use kubetrail::storage::{KvError, KvStore, SqliteConfig, SqliteKv};
//!
//! fn main() -> Result<(), KvError> {
//!     let kv = SqliteKv::open(SqliteConfig::new("./data"))?;
//!
//!     kv.update(|txn| txn.set(b"key", b"value"))?;
//!     let value = kv.view(|txn| txn.get(b"key"))?;
//!     assert_eq!(value, b"value");
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod kv;
pub mod memory;
pub mod sqlite;

// Re-export commonly used types
pub use error::{display_key, KvError, KvResult};
pub use kv::{
    key_successor, prefix_successor, Direction, KeyRange, KvIter, KvPair, KvStore, ReadTxn,
    WriteTxn, DEFAULT_PAGE_SIZE,
};
pub use memory::MemoryKv;
pub use sqlite::{SqliteConfig, SqliteKv, DB_FILE_NAME};
