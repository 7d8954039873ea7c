//! Per-query range read counters

use std::fmt;
use std::time::Duration;

/// Counters collected while a range read runs; logged, never persisted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeReadStats {
    pub table_name: String,
    /// Partitions actually scanned
    pub partition_count: usize,
    /// Keys read from the engine
    pub rows_visited: u64,
    /// Keys that matched the comparator, window and key predicate
    pub rows_passed_key_predicate: u64,
    /// Keys whose value also passed the value predicate
    pub rows_passed_value_predicate: u64,
    pub elapsed: Duration,
}

impl RangeReadStats {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    /// Emit the counters tagged with a request id
    pub fn log(&self, request_id: &str) {
        tracing::info!(
            request_id = %request_id,
            table = %self.table_name,
            partitions = self.partition_count,
            rows_visited = self.rows_visited,
            rows_passed_key_predicate = self.rows_passed_key_predicate,
            rows_passed_value_predicate = self.rows_passed_value_predicate,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Range read stats"
        );
    }
}

impl fmt::Display for RangeReadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Table: {}, Partitions: {}, Visited: {}, Key matches: {}, Value matches: {}, Elapsed: {:?}",
            self.table_name,
            self.partition_count,
            self.rows_visited,
            self.rows_passed_key_predicate,
            self.rows_passed_value_predicate,
            self.elapsed
        )
    }
}
