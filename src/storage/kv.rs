//! Transactional key-value adapter
//!
//! The narrow interface every other component programs against. Engines
//! implement [`KvStore`] plus the two transaction traits; nothing above this
//! module touches engine-specific types.
//!
//! # Transactions
//!
//! ```text
//! view(f)   → read txn  → f(&dyn ReadTxn)  → released
//! update(f) → write txn → f(&dyn WriteTxn) → Ok: commit / Err: rollback
//! ```
//!
//! Iteration is page based: [`ReadTxn::scan`] returns a bounded batch of
//! pairs and [`KvIter`] turns those batches into a seekable cursor.

use crate::storage::error::KvResult;
use std::collections::VecDeque;

/// A raw key/value pair
pub type KvPair = (Vec<u8>, Vec<u8>);

/// Default number of pairs fetched per page by [`KvIter`]
pub const DEFAULT_PAGE_SIZE: usize = 128;

/// Iteration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Half-open byte range `[start, end)`; `None` means unbounded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Option<Vec<u8>>,
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Some(start.into()),
            end: Some(end.into()),
        }
    }

    /// The whole keyspace
    pub fn all() -> Self {
        Self::default()
    }

    /// Every key that starts with `prefix`
    pub fn prefix(prefix: &[u8]) -> Self {
        Self {
            start: Some(prefix.to_vec()),
            end: prefix_successor(prefix),
        }
    }

    /// Check if a key falls inside the range
    pub fn contains(&self, key: &[u8]) -> bool {
        let after_start = self.start.as_deref().map_or(true, |s| key >= s);
        let before_end = self.end.as_deref().map_or(true, |e| key < e);
        after_start && before_end
    }

    /// True when no key can satisfy both bounds
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Some(s), Some(e)) => s >= e,
            _ => false,
        }
    }

    /// Intersection of two ranges
    pub fn intersect(&self, other: &KeyRange) -> KeyRange {
        let start = match (&self.start, &other.start) {
            (Some(a), Some(b)) => Some(a.max(b).clone()),
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        let end = match (&self.end, &other.end) {
            (Some(a), Some(b)) => Some(a.min(b).clone()),
            (Some(a), None) | (None, Some(a)) => Some(a.clone()),
            (None, None) => None,
        };
        KeyRange { start, end }
    }
}

/// Smallest key greater than every key that starts with `prefix`
///
/// Returns `None` when the prefix is empty or all `0xFF`, in which case the
/// range is unbounded above.
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Smallest key strictly greater than `key`
pub fn key_successor(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}

/// Read operations available inside any transaction
pub trait ReadTxn {
    /// Exact lookup. Absence is reported as [`KvError::NotFound`](crate::storage::KvError::NotFound).
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>>;

    /// Check if a key exists
    fn exists(&self, key: &[u8]) -> KvResult<bool>;

    /// Return up to `limit` pairs inside `range`, ordered by `direction`
    fn scan(&self, range: &KeyRange, direction: Direction, limit: usize) -> KvResult<Vec<KvPair>>;
}

/// Write operations available inside an update transaction
pub trait WriteTxn: ReadTxn {
    /// Insert or overwrite a key
    fn set(&self, key: &[u8], value: &[u8]) -> KvResult<()>;

    /// Remove every key inside `range`, returning how many were removed
    fn delete_range(&self, range: &KeyRange) -> KvResult<usize>;
}

/// An ordered byte-oriented key-value engine with scoped transactions
pub trait KvStore: Send + Sync {
    /// Run `f` inside a read-only transaction with a consistent snapshot
    fn view<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<R, E>,
        E: From<crate::storage::KvError>;

    /// Run `f` inside a read-write transaction, committing only if it succeeds
    fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn WriteTxn) -> Result<R, E>,
        E: From<crate::storage::KvError>;

    /// Short engine name for logs
    fn engine_name(&self) -> &'static str;
}

/// Seekable cursor over a bounded key range
///
/// Works in either direction. In reverse mode `seek` positions at the last
/// key less than or equal to the target, which is what backward lookups need.
pub struct KvIter<'t, T: ReadTxn + ?Sized> {
    txn: &'t T,
    bounds: KeyRange,
    direction: Direction,
    page_size: usize,
    buffer: VecDeque<KvPair>,
    exhausted: bool,
}

impl<'t, T: ReadTxn + ?Sized> KvIter<'t, T> {
    /// Create an unpositioned cursor; call `rewind` or `seek` before reading
    pub fn new(txn: &'t T, bounds: KeyRange, direction: Direction) -> Self {
        Self {
            txn,
            bounds,
            direction,
            page_size: DEFAULT_PAGE_SIZE,
            buffer: VecDeque::new(),
            exhausted: true,
        }
    }

    /// Builder method: set the page size
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Position at the first key in iteration order
    pub fn rewind(&mut self) -> KvResult<()> {
        let window = self.bounds.clone();
        self.refill(window)
    }

    /// Position at `key`, or the nearest key after it in iteration order
    pub fn seek(&mut self, key: &[u8]) -> KvResult<()> {
        let window = match self.direction {
            Direction::Forward => KeyRange {
                start: Some(key.to_vec()),
                end: None,
            },
            Direction::Reverse => KeyRange {
                start: None,
                end: Some(key_successor(key)),
            },
        };
        let window = self.bounds.intersect(&window);
        self.refill(window)
    }

    /// True while the cursor points at a pair
    pub fn valid(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// The current pair
    pub fn current(&self) -> Option<(&[u8], &[u8])> {
        self.buffer
            .front()
            .map(|(k, v)| (k.as_slice(), v.as_slice()))
    }

    pub fn key(&self) -> Option<&[u8]> {
        self.buffer.front().map(|(k, _)| k.as_slice())
    }

    pub fn value(&self) -> Option<&[u8]> {
        self.buffer.front().map(|(_, v)| v.as_slice())
    }

    /// Step to the next pair in iteration order
    pub fn advance(&mut self) -> KvResult<()> {
        let Some((last_key, _)) = self.buffer.pop_front() else {
            return Ok(());
        };

        if self.buffer.is_empty() && !self.exhausted {
            let rest = match self.direction {
                Direction::Forward => KeyRange {
                    start: Some(key_successor(&last_key)),
                    end: None,
                },
                Direction::Reverse => KeyRange {
                    start: None,
                    end: Some(last_key),
                },
            };
            let window = self.bounds.intersect(&rest);
            self.refill(window)?;
        }

        Ok(())
    }

    fn refill(&mut self, window: KeyRange) -> KvResult<()> {
        self.buffer.clear();
        if window.is_empty() {
            self.exhausted = true;
            return Ok(());
        }

        let page = self.txn.scan(&window, self.direction, self.page_size)?;
        self.exhausted = page.len() < self.page_size;
        self.buffer.extend(page);
        Ok(())
    }
}
