//! Time-bucket partitions
//!
//! Every key starts with its table name followed by the partition id, so all
//! keys of one partition form one contiguous region of the keyspace:
//!
//! ```text
//! watch | 0000478123 | Pod | ns1 | foo | t1
//! watch | 0000478123 | Pod | ns1 | foo | t2
//! watch | 0000478123 | Pod | ns2 | bar | t1
//! watch | 0000478124 | Pod | ns1 | foo | t3    ← next hour
//! ```
//!
//! A partition id is `floor(timestamp / duration)`, so ids grow with time. A
//! scan over a window touches only the buckets the window overlaps, and
//! expiring old data is a single range delete per bucket.

use crate::storage::{Direction, KeyRange, KvIter, ReadTxn, WriteTxn};
use crate::table::codec::{put_str, put_u64, KeyReader};
use crate::table::error::TableResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Nanoseconds per second
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Default partition width (one hour)
pub const DEFAULT_PARTITION_DURATION: Duration = Duration::from_secs(3600);

/// Identifier of a time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub u64);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:010}", self.0)
    }
}

impl PartitionId {
    pub fn next(self) -> Option<PartitionId> {
        self.0.checked_add(1).map(PartitionId)
    }

    pub fn prev(self) -> Option<PartitionId> {
        self.0.checked_sub(1).map(PartitionId)
    }
}

/// Inclusive time window `[start, end]` in nanoseconds since the epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

impl TimeWindow {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Window ending now and spanning `duration`
    pub fn last(duration: Duration) -> Self {
        let end = now_nanos();
        let span = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self {
            start: end.saturating_sub(span),
            end,
        }
    }

    /// Check if a timestamp falls in the window (both ends inclusive)
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// True when start is after end
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    /// Check if two windows share at least one instant
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// Current time in nanoseconds since the epoch
pub fn now_nanos() -> i64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX)
}

/// Maps timestamps to fixed-width partitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionScheme {
    width: i64,
}

impl Default for PartitionScheme {
    fn default() -> Self {
        Self::new(DEFAULT_PARTITION_DURATION)
    }
}

impl PartitionScheme {
    /// Create a scheme with the given bucket width (clamped to at least 1ns)
    pub fn new(duration: Duration) -> Self {
        let width = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX).max(1);
        Self { width }
    }

    /// Bucket width
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.width as u64)
    }

    /// Partition holding `timestamp`; timestamps before the epoch land in
    /// partition 0
    pub fn partition_id(&self, timestamp: i64) -> PartitionId {
        PartitionId((timestamp.max(0) / self.width) as u64)
    }

    /// Every partition that could hold a timestamp in `[start, end]`, in time
    /// order; empty when `start > end`
    pub fn partitions_overlapping(&self, start: i64, end: i64) -> Vec<PartitionId> {
        if start > end {
            return Vec::new();
        }
        let first = self.partition_id(start).0;
        let last = self.partition_id(end).0;
        (first..=last).map(PartitionId).collect()
    }

    /// The time window covered by a partition
    pub fn partition_window(&self, id: PartitionId) -> TimeWindow {
        let start = (id.0 as i64).saturating_mul(self.width);
        TimeWindow {
            start,
            end: start.saturating_add(self.width - 1),
        }
    }
}

/// Key prefix shared by every key of a table
pub fn table_prefix(table: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(table.len() + 2);
    put_str(&mut buf, table);
    buf
}

/// Key prefix shared by every key of one partition of a table
pub fn partition_prefix(table: &str, id: PartitionId) -> Vec<u8> {
    let mut buf = table_prefix(table);
    put_u64(&mut buf, id.0);
    buf
}

/// Read the table name and partition id from the front of an encoded key
pub fn decode_partition(key: &[u8]) -> TableResult<(String, PartitionId)> {
    let mut reader = KeyReader::new(key);
    let table = reader.take_str()?;
    let id = reader.take_u64()?;
    Ok((table, PartitionId(id)))
}

/// Partitions of `table` that hold at least one key, between `from` and `to`
/// inclusive, in ascending order
///
/// Skip-scans the keyspace: one seek per partition found, regardless of how
/// many keys each holds.
pub fn existing_partitions<T>(
    txn: &T,
    table: &str,
    from: PartitionId,
    to: PartitionId,
) -> TableResult<Vec<PartitionId>>
where
    T: ReadTxn + ?Sized,
{
    let mut found = Vec::new();
    if from > to {
        return Ok(found);
    }

    let upper = match to.next() {
        Some(next) => KeyRange::new(partition_prefix(table, from), partition_prefix(table, next)),
        None => KeyRange::prefix(&table_prefix(table)).intersect(&KeyRange {
            start: Some(partition_prefix(table, from)),
            end: None,
        }),
    };

    let mut iter = KvIter::new(txn, upper, Direction::Forward).page_size(1);
    iter.rewind()?;
    while let Some(key) = iter.key() {
        let (_, id) = decode_partition(key)?;
        found.push(id);
        match id.next() {
            Some(next) => iter.seek(&partition_prefix(table, next))?,
            None => break,
        }
    }

    Ok(found)
}

/// The newest partition of `table` at or before `at` that holds a key
///
/// A single reverse seek, so callers can walk partitions newest-first and
/// stop early.
pub fn partition_at_or_before<T>(
    txn: &T,
    table: &str,
    at: PartitionId,
) -> TableResult<Option<PartitionId>>
where
    T: ReadTxn + ?Sized,
{
    let mut bounds = KeyRange::prefix(&table_prefix(table));
    if let Some(next) = at.next() {
        bounds = bounds.intersect(&KeyRange {
            start: None,
            end: Some(partition_prefix(table, next)),
        });
    }

    let mut iter = KvIter::new(txn, bounds, Direction::Reverse).page_size(1);
    iter.rewind()?;
    match iter.key() {
        Some(key) => Ok(Some(decode_partition(key)?.1)),
        None => Ok(None),
    }
}

/// Every partition of `table` that holds at least one key
pub fn all_partitions<T>(txn: &T, table: &str) -> TableResult<Vec<PartitionId>>
where
    T: ReadTxn + ?Sized,
{
    existing_partitions(txn, table, PartitionId(0), PartitionId(u64::MAX))
}

/// Remove every key of one partition, returning how many keys were removed
pub fn delete_partition<T>(txn: &T, table: &str, id: PartitionId) -> TableResult<usize>
where
    T: WriteTxn + ?Sized,
{
    let removed = txn.delete_range(&KeyRange::prefix(&partition_prefix(table, id)))?;
    tracing::info!(table = table, partition = %id, removed, "Deleted partition");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KvError, KvStore, MemoryKv};

    fn hourly() -> PartitionScheme {
        PartitionScheme::new(Duration::from_secs(3600))
    }

    const HOUR: i64 = 3600 * NANOS_PER_SEC;

    #[test]
    fn test_partition_id_is_monotonic() {
        let scheme = hourly();
        let stamps = [0, 1, HOUR - 1, HOUR, 5 * HOUR + 7, 100 * HOUR];
        for pair in stamps.windows(2) {
            assert!(scheme.partition_id(pair[0]) <= scheme.partition_id(pair[1]));
        }
        assert_eq!(scheme.partition_id(HOUR - 1), PartitionId(0));
        assert_eq!(scheme.partition_id(HOUR), PartitionId(1));
    }

    #[test]
    fn test_negative_timestamps_normalize_to_zero() {
        assert_eq!(hourly().partition_id(-42), PartitionId(0));
    }

    #[test]
    fn test_partitions_overlapping_covers_boundaries() {
        let scheme = hourly();
        let start = HOUR + 10;
        let end = 3 * HOUR;

        let ids = scheme.partitions_overlapping(start, end);
        assert_eq!(ids, vec![PartitionId(1), PartitionId(2), PartitionId(3)]);
        assert!(ids.contains(&scheme.partition_id(start)));
        assert!(ids.contains(&scheme.partition_id(end)));

        let window = TimeWindow::new(start, end);
        for id in &ids {
            assert!(scheme.partition_window(*id).overlaps(&window));
        }
        assert!(!scheme.partition_window(PartitionId(0)).overlaps(&window));
        assert!(!scheme.partition_window(PartitionId(4)).overlaps(&window));
    }

    #[test]
    fn test_partitions_overlapping_inverted_window() {
        assert!(hourly().partitions_overlapping(10, 5).is_empty());
    }

    #[test]
    fn test_partition_display_is_padded() {
        assert_eq!(PartitionId(42).to_string(), "0000000042");
    }

    #[test]
    fn test_time_window_contains_both_ends() {
        let window = TimeWindow::new(10, 20);
        assert!(window.contains(10));
        assert!(window.contains(20));
        assert!(!window.contains(9));
        assert!(!window.contains(21));
        assert!(TimeWindow::new(5, 1).is_empty());
    }

    fn seed(kv: &MemoryKv, table: &str, partitions: &[u64]) {
        kv.update(|txn| {
            for &p in partitions {
                for suffix in [b"a", b"b"] {
                    let mut key = partition_prefix(table, PartitionId(p));
                    key.extend_from_slice(suffix);
                    txn.set(&key, b"v")?;
                }
            }
            Ok::<_, KvError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_all_partitions_skip_scan() {
        let kv = MemoryKv::new();
        seed(&kv, "watch", &[3, 7, 8, 20]);
        seed(&kv, "other", &[1, 5]);

        let ids = kv.view(|txn| all_partitions(txn, "watch")).unwrap();
        assert_eq!(ids, vec![PartitionId(3), PartitionId(7), PartitionId(8), PartitionId(20)]);

        let some = kv
            .view(|txn| existing_partitions(txn, "watch", PartitionId(4), PartitionId(8)))
            .unwrap();
        assert_eq!(some, vec![PartitionId(7), PartitionId(8)]);
    }

    #[test]
    fn test_partition_at_or_before() {
        let kv = MemoryKv::new();
        seed(&kv, "watch", &[3, 7, 8]);
        seed(&kv, "zzz", &[1, 5]);

        let at = |p: u64| {
            kv.view(|txn| partition_at_or_before(txn, "watch", PartitionId(p)))
                .unwrap()
        };
        assert_eq!(at(8), Some(PartitionId(8)));
        assert_eq!(at(6), Some(PartitionId(3)));
        assert_eq!(at(100), Some(PartitionId(8)));
        assert_eq!(at(2), None);
        assert_eq!(at(u64::MAX), Some(PartitionId(8)));
    }

    #[test]
    fn test_delete_partition() {
        let kv = MemoryKv::new();
        seed(&kv, "watch", &[1, 2]);

        let removed = kv
            .update(|txn| delete_partition(txn, "watch", PartitionId(1)))
            .unwrap();
        assert_eq!(removed, 2);

        let ids = kv.view(|txn| all_partitions(txn, "watch")).unwrap();
        assert_eq!(ids, vec![PartitionId(2)]);
    }
}
