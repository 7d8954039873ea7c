//! # kubetrail
//!
//! Historical store for cluster workload state - records resource snapshots
//! over time and answers "what did this resource look like between t0 and
//! t1" queries.
//!
//! ## Features
//!
//! - **Order-preserving keys**: composite keys whose bytes sort like their fields
//! - **Time partitions**: bounded scans and whole-bucket eviction
//! - **Pluggable engines**: SQLite on disk, or an in-memory map for tests
//! - **Change logs**: unchanged snapshots collapse into a compact history
//!
//! ## Modules
//!
//! - [`storage`]: Transactional key-value adapter and engines
//! - [`table`]: Typed, time-partitioned tables
//! - [`query`]: Resource payload history queries
//! - [`service`]: Async facade for servers and the CLI
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kubetrail::config::Config;
//! use kubetrail::query::ResourceSelector;
//! use kubetrail::service::{HistoryService, WatchRecord};
//! use kubetrail::table::{Tables, TimeWindow, WatchType};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Open the on-disk store
//!     let service = HistoryService::new(Tables::open(&Config::load_default())?);
//!
//!     // Record two states of a pod
//!     for (timestamp, payload) in [(10, r#"{"phase":"Pending"}"#), (30, r#"{"phase":"Running"}"#)] {
//!         service
//!             .record(WatchRecord {
//!                 kind: "Pod".into(),
//!                 namespace: "default".into(),
//!                 name: "web-0".into(),
//!                 timestamp,
//!                 watch_type: WatchType::Update,
//!                 payload: payload.into(),
//!             })
//!             .await?;
//!     }
//!
//!     // Ask for its history
//!     let json = service
//!         .resource_payload_json(
//!             ResourceSelector::new("Pod", "default", "web-0"),
//!             TimeWindow::new(0, 60),
//!             None,
//!         )
//!         .await?;
//!     println!("{}", json);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod query;
pub mod service;
pub mod storage;
pub mod table;
pub mod telemetry;

// Re-export top-level types for convenience
pub use storage::{KvError, KvResult, KvStore, MemoryKv, SqliteConfig, SqliteKv};

pub use table::{
    PartitionId, PartitionScheme, RangeReadStats, RetentionPolicy, TableError, TableResult,
    Tables, TimeWindow, WatchKey, WatchKeyComparator, WatchType, WatchValue,
};

pub use query::{PayloadOutput, QueryError, QueryResult, ResourceSelector};

pub use service::{HistoryService, WatchRecord};
