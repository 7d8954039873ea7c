//! Typed, time-partitioned tables
//!
//! Layers on top of the key-value adapter:
//!
//! - **codec**: Order-preserving key components and framed values
//! - **partition**: Time buckets, partition discovery and deletion
//! - **table**: Generic `Table<K, V>` with get / range read / previous-key seek
//! - **watch**: The watch history table (resource payloads over time)
//! - **retention**: Partition-level eviction policy
//! - **stats**: Range read counters
//!
//! # Example
//!
//! ```rust
//! use kubetrail::storage::{KvStore, MemoryKv};
//! use kubetrail::table::{Tables, TimeWindow, WatchKeyComparator, RangeReadStats};
//!
//! let tables = Tables::new(MemoryKv::new(), Default::default());
//! tables.record("Pod", "default", "web-0", 10, Default::default(), "{}").unwrap();
//!
//! let comparator = WatchKeyComparator::new("Pod", "default", "web-0");
//! let mut stats = RangeReadStats::default();
//! let rows = tables
//!     .db()
//!     .view(|txn| {
//!         tables
//!             .watch_table()
//!             .range_read(txn, &comparator, None, None, TimeWindow::new(0, 20), &mut stats)
//!     })
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

pub mod codec;
pub mod error;
pub mod partition;
pub mod retention;
pub mod stats;
#[allow(clippy::module_inception)]
pub mod table;
pub mod watch;

pub use error::{TableError, TableResult};
pub use partition::{
    all_partitions, delete_partition, existing_partitions, now_nanos, partition_at_or_before,
    PartitionId, PartitionScheme, TimeWindow, DEFAULT_PARTITION_DURATION, NANOS_PER_SEC,
};
pub use retention::{EvictionReport, RetentionPolicy};
pub use stats::RangeReadStats;
pub use table::{KeyComparator, KeyPredicate, Table, TableKey, TableValue, ValuePredicate};
pub use watch::{WatchKey, WatchKeyComparator, WatchTable, WatchType, WatchValue, WATCH_TABLE};

use crate::config::Config;
use crate::storage::{KvStore, SqliteKv};

/// The set of tables sharing one key-value store
pub struct Tables<S> {
    db: S,
    scheme: PartitionScheme,
    watch: WatchTable,
}

impl Tables<SqliteKv> {
    /// Open the on-disk store described by `config`
    pub fn open(config: &Config) -> TableResult<Self> {
        let db = SqliteKv::open(config.storage.sqlite())?;
        Ok(Self::new(db, config.partition.scheme()))
    }
}

impl<S: KvStore> Tables<S> {
    pub fn new(db: S, scheme: PartitionScheme) -> Self {
        Self {
            db,
            scheme,
            watch: Table::new(scheme),
        }
    }

    pub fn db(&self) -> &S {
        &self.db
    }

    pub fn scheme(&self) -> &PartitionScheme {
        &self.scheme
    }

    pub fn watch_table(&self) -> &WatchTable {
        &self.watch
    }

    /// Write one watch record in its own transaction
    pub fn record_watch(&self, key: &WatchKey, value: &WatchValue) -> TableResult<()> {
        self.db.update(|txn| self.watch.set(txn, key, value))?;
        tracing::debug!(key = %key, "Recorded watch");
        Ok(())
    }

    /// Record a resource state observed at `timestamp` (nanoseconds)
    pub fn record(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        timestamp: i64,
        watch_type: WatchType,
        payload: &str,
    ) -> TableResult<WatchKey> {
        let key = WatchKey::at(&self.scheme, kind, namespace, name, timestamp);
        let value = WatchValue::new(timestamp, kind, payload).watch_type(watch_type);
        self.record_watch(&key, &value)?;
        Ok(key)
    }

    /// Partitions of the watch table that hold data
    pub fn all_partitions(&self) -> TableResult<Vec<PartitionId>> {
        self.db.view(|txn| all_partitions(txn, WATCH_TABLE))
    }

    /// Delete watch partitions the policy no longer keeps
    pub fn evict_expired(&self, now: i64, policy: &RetentionPolicy) -> TableResult<EvictionReport> {
        if policy.is_unbounded() {
            return Ok(EvictionReport {
                table_name: WATCH_TABLE.to_string(),
                partitions_remaining: self.all_partitions()?.len(),
                ..Default::default()
            });
        }
        self.db
            .update(|txn| retention::evict(txn, WATCH_TABLE, &self.scheme, policy, now))
    }
}
