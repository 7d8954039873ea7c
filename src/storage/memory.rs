//! In-memory engine
//!
//! A `BTreeMap` behind an `RwLock`. Views share the read lock, so they see a
//! stable snapshot; updates hold the write lock and keep an undo log that is
//! replayed if the transaction body fails.

use crate::storage::error::{KvError, KvResult};
use crate::storage::kv::{Direction, KeyRange, KvPair, KvStore, ReadTxn, WriteTxn};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::RwLock;

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory ordered key-value engine, mainly for tests and benches
#[derive(Debug, Default)]
pub struct MemoryKv {
    data: RwLock<Map>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KvStore for MemoryKv {
    fn view<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<R, E>,
        E: From<KvError>,
    {
        let guard = self
            .data
            .read()
            .map_err(|e| KvError::Lock(format!("Failed to acquire read lock: {}", e)))?;
        let txn = MemoryReadTxn { data: &guard };
        f(&txn)
    }

    fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn WriteTxn) -> Result<R, E>,
        E: From<KvError>,
    {
        let mut guard = self
            .data
            .write()
            .map_err(|e| KvError::Lock(format!("Failed to acquire write lock: {}", e)))?;
        let txn = MemoryWriteTxn {
            data: RefCell::new(&mut *guard),
            undo: RefCell::new(Vec::new()),
        };

        let result = f(&txn);
        if result.is_err() {
            txn.rollback();
        }
        result
    }

    fn engine_name(&self) -> &'static str {
        "memory"
    }
}

struct MemoryReadTxn<'a> {
    data: &'a Map,
}

impl ReadTxn for MemoryReadTxn<'_> {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>> {
        self.data.get(key).cloned().ok_or(KvError::NotFound)
    }

    fn exists(&self, key: &[u8]) -> KvResult<bool> {
        Ok(self.data.contains_key(key))
    }

    fn scan(&self, range: &KeyRange, direction: Direction, limit: usize) -> KvResult<Vec<KvPair>> {
        Ok(scan_map(self.data, range, direction, limit))
    }
}

enum Undo {
    Restore(Vec<u8>, Option<Vec<u8>>),
    Reinsert(Vec<KvPair>),
}

struct MemoryWriteTxn<'a> {
    data: RefCell<&'a mut Map>,
    undo: RefCell<Vec<Undo>>,
}

impl MemoryWriteTxn<'_> {
    fn rollback(&self) {
        let mut data = self.data.borrow_mut();
        let mut undo = self.undo.borrow_mut();
        while let Some(entry) = undo.pop() {
            match entry {
                Undo::Restore(key, Some(old)) => {
                    data.insert(key, old);
                }
                Undo::Restore(key, None) => {
                    data.remove(&key);
                }
                Undo::Reinsert(pairs) => data.extend(pairs),
            }
        }
    }
}

impl ReadTxn for MemoryWriteTxn<'_> {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>> {
        self.data
            .borrow()
            .get(key)
            .cloned()
            .ok_or(KvError::NotFound)
    }

    fn exists(&self, key: &[u8]) -> KvResult<bool> {
        Ok(self.data.borrow().contains_key(key))
    }

    fn scan(&self, range: &KeyRange, direction: Direction, limit: usize) -> KvResult<Vec<KvPair>> {
        Ok(scan_map(&self.data.borrow(), range, direction, limit))
    }
}

impl WriteTxn for MemoryWriteTxn<'_> {
    fn set(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        let old = self.data.borrow_mut().insert(key.to_vec(), value.to_vec());
        self.undo
            .borrow_mut()
            .push(Undo::Restore(key.to_vec(), old));
        Ok(())
    }

    fn delete_range(&self, range: &KeyRange) -> KvResult<usize> {
        if range.is_empty() {
            return Ok(0);
        }
        let mut data = self.data.borrow_mut();
        let doomed: Vec<Vec<u8>> = data
            .range::<[u8], _>(bounds(range))
            .map(|(k, _)| k.clone())
            .collect();

        let mut removed = Vec::with_capacity(doomed.len());
        for key in doomed {
            if let Some(value) = data.remove(&key) {
                removed.push((key, value));
            }
        }

        let count = removed.len();
        self.undo.borrow_mut().push(Undo::Reinsert(removed));
        Ok(count)
    }
}

fn bounds(range: &KeyRange) -> (Bound<&[u8]>, Bound<&[u8]>) {
    let start = range
        .start
        .as_deref()
        .map_or(Bound::Unbounded, Bound::Included);
    let end = range.end.as_deref().map_or(Bound::Unbounded, Bound::Excluded);
    (start, end)
}

fn scan_map(data: &Map, range: &KeyRange, direction: Direction, limit: usize) -> Vec<KvPair> {
    // BTreeMap::range panics on inverted bounds
    if range.is_empty() {
        return Vec::new();
    }

    let iter = data
        .range::<[u8], _>(bounds(range))
        .map(|(k, v)| (k.clone(), v.clone()));

    match direction {
        Direction::Forward => iter.take(limit).collect(),
        Direction::Reverse => iter.rev().take(limit).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_and_not_found() {
        let kv = MemoryKv::new();
        kv.update(|txn| txn.set(b"k1", b"v1")).unwrap();

        let value = kv.view(|txn| txn.get(b"k1")).unwrap();
        assert_eq!(value, b"v1");

        let missing = kv.view(|txn| txn.get(b"k2"));
        assert!(matches!(missing, Err(KvError::NotFound)));
        assert!(!kv.view(|txn| txn.exists(b"k2")).unwrap());
    }

    #[test]
    fn test_failed_update_rolls_back() {
        let kv = MemoryKv::new();
        kv.update(|txn| txn.set(b"keep", b"1")).unwrap();

        let result: KvResult<()> = kv.update(|txn| {
            txn.set(b"keep", b"2")?;
            txn.set(b"new", b"3")?;
            txn.delete_range(&KeyRange::all())?;
            Err(KvError::Lock("forced failure".to_string()))
        });
        assert!(result.is_err());

        assert_eq!(kv.len(), 1);
        assert_eq!(kv.view(|txn| txn.get(b"keep")).unwrap(), b"1");
    }

    #[test]
    fn test_delete_range() {
        let kv = MemoryKv::new();
        kv.update(|txn| {
            for key in ["p1/a", "p1/b", "p2/a"] {
                txn.set(key.as_bytes(), b"x")?;
            }
            Ok::<_, KvError>(())
        })
        .unwrap();

        let removed = kv
            .update(|txn| txn.delete_range(&KeyRange::prefix(b"p1/")))
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(kv.len(), 1);
    }

    #[test]
    fn test_delete_inverted_range_is_noop() {
        let kv = MemoryKv::new();
        kv.update(|txn| txn.set(b"a", b"x")).unwrap();

        let removed = kv
            .update(|txn| txn.delete_range(&KeyRange::new("b", "a")))
            .unwrap();
        assert_eq!(removed, 0);

        // Store is still usable afterwards
        assert!(kv.view(|txn| txn.exists(b"a")).unwrap());
        kv.update(|txn| txn.set(b"b", b"y")).unwrap();
        assert_eq!(kv.len(), 2);
    }

    #[test]
    fn test_scan_reverse_with_limit() {
        let kv = MemoryKv::new();
        kv.update(|txn| {
            for i in 0..10u8 {
                txn.set(&[i], &[i])?;
            }
            Ok::<_, KvError>(())
        })
        .unwrap();

        let page = kv
            .view(|txn| txn.scan(&KeyRange::new(vec![2], vec![8]), Direction::Reverse, 3))
            .unwrap();
        let keys: Vec<u8> = page.iter().map(|(k, _)| k[0]).collect();
        assert_eq!(keys, vec![7, 6, 5]);
    }
}
