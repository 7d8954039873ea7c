//! kubetrail Query Engine
//!
//! Read-only queries over the watch history:
//!
//! - **payload**: Resource payload history (range read + prior state + merge)
//! - **compact**: Collapse unchanged payloads into a change log
//! - **kinds**: Cluster-scoped resource kinds
//!
//! # Example
//!
//! ```rust
//! use kubetrail::query::{resource_payload_json, ResourceSelector};
//! use kubetrail::storage::MemoryKv;
//! use kubetrail::table::{Tables, TimeWindow, WatchType};
//!
//! let tables = Tables::new(MemoryKv::new(), Default::default());
//! tables.record("Pod", "ns1", "foo", 5, WatchType::Add, "A").unwrap();
//! tables.record("Pod", "ns1", "foo", 30, WatchType::Update, "B").unwrap();
//!
//! let selector = ResourceSelector::new("Pod", "ns1", "foo");
//! let json = resource_payload_json(&tables, &selector, TimeWindow::new(15, 35), "req-1").unwrap();
//! assert!(json.contains("\"payloadTime\": 30"));
//! ```

mod compact;
mod error;
mod kinds;
mod payload;

pub use compact::compact_payloads;
pub use error::{QueryError, QueryResult};
pub use kinds::is_cluster_scoped;
pub use payload::{
    read_payload_history, render_json, resource_payload_history, resource_payload_json, seek_key,
    to_outputs, PayloadOutput, ResourceSelector,
};
