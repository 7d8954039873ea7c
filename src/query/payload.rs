//! Resource payload history
//!
//! Answers "what did this resource look like between t0 and t1":
//!
//! 1. Range read the watch table over the window.
//! 2. Seek back from t0 for the last state recorded before the window, so the
//!    caller knows what was in effect when the window opened.
//! 3. Merge, order, and compact the result into a change log.
//!
//! Steps 1 and 2 share one read transaction.

use crate::query::compact::compact_payloads;
use crate::query::error::{QueryError, QueryResult};
use crate::query::kinds::is_cluster_scoped;
use crate::storage::{KvStore, ReadTxn};
use crate::table::{
    PartitionScheme, RangeReadStats, TableKey, Tables, TimeWindow, WatchKey, WatchKeyComparator,
    WatchTable, WatchValue,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which resource to look up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSelector {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceSelector {
    pub fn new(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Comparator for this selector; cluster-scoped kinds ignore the namespace
    pub fn key_comparator(&self) -> WatchKeyComparator {
        let namespace = if is_cluster_scoped(&self.kind) {
            String::new()
        } else {
            self.namespace.clone()
        };
        WatchKeyComparator::new(self.kind.clone(), namespace, self.name.clone())
    }
}

/// Key to seek back from when looking for the state before `start`
pub fn seek_key(scheme: &PartitionScheme, comparator: &WatchKeyComparator, start: i64) -> WatchKey {
    WatchKey::at(
        scheme,
        comparator.kind.clone(),
        comparator.namespace.clone(),
        comparator.name.clone(),
        start,
    )
}

/// One entry of the rendered history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadOutput {
    pub payload_key: String,
    /// Nanoseconds since the epoch
    pub payload_time: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payload: String,
}

/// Raw history of one resource in a window plus the state before it
///
/// Runs inside the caller's transaction. A missing predecessor is not an
/// error; any other failure aborts the whole read.
pub fn read_payload_history<T>(
    txn: &T,
    table: &WatchTable,
    comparator: &WatchKeyComparator,
    window: TimeWindow,
    stats: &mut RangeReadStats,
) -> QueryResult<HashMap<WatchKey, WatchValue>>
where
    T: ReadTxn + ?Sized,
{
    let in_window = |value: &WatchValue| window.contains(value.timestamp);
    let mut rows = table.range_read(txn, comparator, None, Some(&in_window), window, stats)?;
    tracing::debug!(comparator = %comparator, found = rows.len(), "Range read finished");

    let seek = seek_key(table.scheme(), comparator, window.start);
    match previous_state(txn, table, &seek, comparator)? {
        Some((key, value)) => {
            tracing::debug!(previous = %key, "Merged state preceding window");
            rows.insert(key, value);
        }
        None => {
            tracing::debug!(seek = %seek, "No state recorded before window");
        }
    }

    Ok(rows)
}

/// The last record before `seek`, if any
fn previous_state<T>(
    txn: &T,
    table: &WatchTable,
    seek: &WatchKey,
    comparator: &WatchKeyComparator,
) -> QueryResult<Option<(WatchKey, WatchValue)>>
where
    T: ReadTxn + ?Sized,
{
    let key = match table.get_previous_key(txn, seek, comparator) {
        Ok(key) => key,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match table.get(txn, &key) {
        Ok(value) => Ok(Some((key, value))),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Turn raw rows into output entries in encoded-key order
///
/// Encoded-key order makes the input to compaction deterministic; entries
/// sharing a timestamp then tie-break by namespace, then name.
pub fn to_outputs(rows: HashMap<WatchKey, WatchValue>) -> Vec<PayloadOutput> {
    let mut rows: Vec<(Vec<u8>, WatchKey, WatchValue)> = rows
        .into_iter()
        .map(|(key, value)| (key.encode(), key, value))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    rows.into_iter()
        .map(|(_, key, value)| PayloadOutput {
            payload_key: key.to_string(),
            payload_time: key.timestamp,
            payload: value.payload,
        })
        .collect()
}

/// Compacted payload history of one resource
pub fn resource_payload_history<S: KvStore>(
    tables: &Tables<S>,
    selector: &ResourceSelector,
    window: TimeWindow,
    request_id: &str,
) -> QueryResult<Vec<PayloadOutput>> {
    if window.is_empty() {
        return Err(QueryError::InvalidWindow(format!(
            "start {} is after end {}",
            window.start, window.end
        )));
    }

    let comparator = selector.key_comparator();
    tracing::debug!(
        request_id = %request_id,
        comparator = %comparator,
        start = window.start,
        end = window.end,
        "Resource payload query"
    );

    let mut stats = RangeReadStats::default();
    let result = tables.db().view(|txn| {
        read_payload_history(txn, tables.watch_table(), &comparator, window, &mut stats)
    });
    stats.log(request_id);

    let history = compact_payloads(to_outputs(result?));
    tracing::debug!(
        request_id = %request_id,
        entries = history.len(),
        "Resource payload history ready"
    );
    Ok(history)
}

/// Render entries as a JSON array indented by one space
pub fn render_json(entries: &[PayloadOutput]) -> QueryResult<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    entries.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| QueryError::Task(format!("non utf-8 output: {}", e)))
}

/// Compacted payload history rendered as JSON
pub fn resource_payload_json<S: KvStore>(
    tables: &Tables<S>,
    selector: &ResourceSelector,
    window: TimeWindow,
    request_id: &str,
) -> QueryResult<String> {
    let history = resource_payload_history(tables, selector, window, request_id)?;
    render_json(&history)
}
