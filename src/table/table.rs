//! Generic typed table
//!
//! `Table<K, V>` is one scan/lookup engine shared by every logical table. A
//! key type describes its encoding and how a partial key (its comparator)
//! narrows a scan; a value type describes its encoding. Everything else,
//! including partition walking, prefix-bounded iteration and backward seeks,
//! lives here once.

use crate::storage::{Direction, KeyRange, KvIter, ReadTxn, WriteTxn};
use crate::table::error::{TableError, TableResult};
use crate::table::partition::{
    existing_partitions, partition_at_or_before, PartitionId, PartitionScheme, TimeWindow,
};
use crate::table::stats::RangeReadStats;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::marker::PhantomData;
use std::time::Instant;

/// A fully-qualified, time-stamped table key
pub trait TableKey: Sized + Clone + Eq + Hash + Display {
    /// Partial key used to filter scans
    type Comparator: KeyComparator<Self>;

    /// Table name; the first component of every encoded key
    const TABLE: &'static str;

    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> TableResult<Self>;
    fn partition_id(&self) -> PartitionId;
    /// Nanoseconds since the epoch
    fn timestamp(&self) -> i64;
}

/// A partial key that fixes some leading components and leaves the timestamp
/// free
pub trait KeyComparator<K>: Display {
    /// Encoded bytes every matching key in `partition` starts with
    fn prefix(&self, partition: PartitionId) -> Vec<u8>;

    /// Check if a decoded key matches every fixed component
    fn matches(&self, key: &K) -> bool;

    /// True when every component is fixed, so matches within a partition are
    /// contiguous and ordered by timestamp
    fn is_exact(&self) -> bool;
}

/// A value stored in a table
pub trait TableValue: Sized {
    fn encode(&self) -> TableResult<Vec<u8>>;
    fn decode(bytes: &[u8]) -> TableResult<Self>;
}

/// Extra filter applied to decoded keys
pub type KeyPredicate<'a, K> = dyn Fn(&K) -> bool + 'a;

/// Extra filter applied to decoded values
pub type ValuePredicate<'a, V> = dyn Fn(&V) -> bool + 'a;

/// Typed view over one table of the key-value store
#[derive(Debug)]
pub struct Table<K, V> {
    scheme: PartitionScheme,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Self {
        Self {
            scheme: self.scheme,
            _marker: PhantomData,
        }
    }
}

impl<K: TableKey, V: TableValue> Table<K, V> {
    pub fn new(scheme: PartitionScheme) -> Self {
        Self {
            scheme,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        K::TABLE
    }

    pub fn scheme(&self) -> &PartitionScheme {
        &self.scheme
    }

    /// Exact lookup; a missing key is `TableError::NotFound`
    pub fn get<T>(&self, txn: &T, key: &K) -> TableResult<V>
    where
        T: ReadTxn + ?Sized,
    {
        let raw = txn.get(&key.encode()).map_err(|e| {
            if e.is_not_found() {
                TableError::NotFound(key.to_string())
            } else {
                TableError::Kv(e)
            }
        })?;
        V::decode(&raw)
    }

    /// Insert or overwrite one record
    pub fn set<T>(&self, txn: &T, key: &K, value: &V) -> TableResult<()>
    where
        T: WriteTxn + ?Sized,
    {
        txn.set(&key.encode(), &value.encode()?)?;
        Ok(())
    }

    /// All records matching `comparator` with a timestamp in `window`
    ///
    /// Only partitions overlapping the window are visited, and within each
    /// one only the comparator's prefix. `stats` is updated even when the
    /// read fails part way.
    pub fn range_read<T>(
        &self,
        txn: &T,
        comparator: &K::Comparator,
        key_predicate: Option<&KeyPredicate<'_, K>>,
        value_predicate: Option<&ValuePredicate<'_, V>>,
        window: TimeWindow,
        stats: &mut RangeReadStats,
    ) -> TableResult<HashMap<K, V>>
    where
        T: ReadTxn + ?Sized,
    {
        let started = Instant::now();
        stats.table_name = K::TABLE.to_string();

        let result = self.range_read_partitions(
            txn,
            comparator,
            key_predicate,
            value_predicate,
            window,
            stats,
        );

        stats.elapsed += started.elapsed();
        result
    }

    fn range_read_partitions<T>(
        &self,
        txn: &T,
        comparator: &K::Comparator,
        key_predicate: Option<&KeyPredicate<'_, K>>,
        value_predicate: Option<&ValuePredicate<'_, V>>,
        window: TimeWindow,
        stats: &mut RangeReadStats,
    ) -> TableResult<HashMap<K, V>>
    where
        T: ReadTxn + ?Sized,
    {
        let mut results = HashMap::new();
        if window.is_empty() {
            return Ok(results);
        }

        let first = self.scheme.partition_id(window.start);
        let last = self.scheme.partition_id(window.end);
        let partitions = existing_partitions(txn, K::TABLE, first, last)?;

        for partition in partitions {
            stats.partition_count += 1;

            let prefix = comparator.prefix(partition);
            let mut iter = KvIter::new(txn, KeyRange::prefix(&prefix), Direction::Forward);
            iter.rewind()?;

            while let Some((raw_key, raw_value)) = iter.current() {
                stats.rows_visited += 1;

                let key = K::decode(raw_key)?;
                let key_ok = comparator.matches(&key)
                    && window.contains(key.timestamp())
                    && key_predicate.map_or(true, |p| p(&key));

                if key_ok {
                    stats.rows_passed_key_predicate += 1;
                    let value = V::decode(raw_value)?;
                    if value_predicate.map_or(true, |p| p(&value)) {
                        stats.rows_passed_value_predicate += 1;
                        results.insert(key, value);
                    }
                }

                iter.advance()?;
            }
        }

        Ok(results)
    }

    /// The matching key with the greatest timestamp strictly before
    /// `seek_key`'s
    ///
    /// Walks partitions backwards starting at the seek key's own partition.
    /// Returns `TableError::NotFound` when no earlier key matches.
    pub fn get_previous_key<T>(
        &self,
        txn: &T,
        seek_key: &K,
        comparator: &K::Comparator,
    ) -> TableResult<K>
    where
        T: ReadTxn + ?Sized,
    {
        let seek_partition = seek_key.partition_id();
        let seek_ts = seek_key.timestamp();
        let mut next = partition_at_or_before(txn, K::TABLE, seek_partition)?;

        while let Some(partition) = next {
            let mut bounds = KeyRange::prefix(&comparator.prefix(partition));
            if comparator.is_exact() && partition == seek_partition {
                bounds.end = Some(seek_key.encode());
            }

            let mut iter = KvIter::new(txn, bounds, Direction::Reverse);
            iter.rewind()?;

            let mut best: Option<K> = None;
            while let Some(raw_key) = iter.key() {
                let key = K::decode(raw_key)?;
                if comparator.matches(&key) && key.timestamp() < seek_ts {
                    if comparator.is_exact() {
                        return Ok(key);
                    }
                    if best
                        .as_ref()
                        .map_or(true, |b| key.timestamp() > b.timestamp())
                    {
                        best = Some(key);
                    }
                }
                iter.advance()?;
            }

            if let Some(key) = best {
                return Ok(key);
            }

            next = match partition.prev() {
                Some(prev) => partition_at_or_before(txn, K::TABLE, prev)?,
                None => None,
            };
        }

        Err(TableError::NotFound(format!(
            "no key matching {} before {}",
            comparator, seek_key
        )))
    }
}
