//! SQLite engine
//!
//! Stores every pair in a single `WITHOUT ROWID` table keyed by a BLOB. SQLite
//! compares BLOBs with `memcmp`, so `ORDER BY key` is byte-lexicographic order,
//! which is all the layers above need.
//!
//! Each transaction checks a connection out of a small pool. In WAL mode a
//! deferred transaction reads from a single snapshot, so concurrent views never
//! block each other and never observe a half-applied update.

use crate::storage::error::{KvError, KvResult};
use crate::storage::kv::{Direction, KeyRange, KvPair, KvStore, ReadTxn, WriteTxn};
use rusqlite::types::Value;
use rusqlite::{
    params, params_from_iter, Connection, OpenFlags, OptionalExtension, Transaction,
    TransactionBehavior,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// File name of the database inside the data directory
pub const DB_FILE_NAME: &str = "kubetrail.db";

/// Configuration for the SQLite engine
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Directory holding the database file
    pub data_dir: PathBuf,
    /// Maximum number of idle connections kept around
    pub pool_size: usize,
    /// How long a writer waits for a competing writer
    pub busy_timeout: Duration,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("kubetrail_data"),
            pool_size: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl SqliteConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Get path to the database file
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

/// SQLite-backed ordered key-value engine
pub struct SqliteKv {
    path: PathBuf,
    config: SqliteConfig,
    pool: Mutex<Vec<Connection>>,
}

impl SqliteKv {
    /// Create or open the engine in `config.data_dir`
    pub fn open(config: SqliteConfig) -> KvResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let path = config.db_path();

        let conn = Self::connect(&path, config.busy_timeout)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key BLOB PRIMARY KEY NOT NULL,
                value BLOB NOT NULL
            ) WITHOUT ROWID",
            [],
        )
        .map_err(|e| KvError::engine("create_table", b"", e))?;

        tracing::info!("Opened SQLite store at {:?}", path);

        Ok(Self {
            path,
            config,
            pool: Mutex::new(vec![conn]),
        })
    }

    fn connect(path: &Path, busy_timeout: Duration) -> KvResult<Connection> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| KvError::engine("open", b"", e))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = 10000;
            PRAGMA temp_store = MEMORY;
            ",
        )
        .map_err(|e| KvError::engine("configure", b"", e))?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| KvError::engine("configure", b"", e))?;

        Ok(conn)
    }

    fn checkout(&self) -> KvResult<Connection> {
        let pooled = self
            .pool
            .lock()
            .map_err(|e| KvError::Lock(format!("Failed to acquire pool lock: {}", e)))?
            .pop();

        match pooled {
            Some(conn) => Ok(conn),
            None => Self::connect(&self.path, self.config.busy_timeout),
        }
    }

    fn checkin(&self, conn: Connection) {
        if let Ok(mut pool) = self.pool.lock() {
            if pool.len() < self.config.pool_size {
                pool.push(conn);
            }
        }
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force checkpoint for WAL mode
    pub fn checkpoint(&self) -> KvResult<()> {
        let conn = self.checkout()?;
        let result = conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(|e| KvError::engine("checkpoint", b"", e));
        self.checkin(conn);
        result
    }
}

impl KvStore for SqliteKv {
    fn view<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn ReadTxn) -> Result<R, E>,
        E: From<KvError>,
    {
        let mut conn = self.checkout()?;
        let result = match conn.transaction_with_behavior(TransactionBehavior::Deferred) {
            // Dropping the transaction rolls it back, which is all a read needs
            Ok(tx) => {
                let txn = SqliteTxn { tx: &tx };
                f(&txn)
            }
            Err(e) => Err(KvError::engine("begin_view", b"", e).into()),
        };
        self.checkin(conn);
        result
    }

    fn update<R, E, F>(&self, f: F) -> Result<R, E>
    where
        F: FnOnce(&dyn WriteTxn) -> Result<R, E>,
        E: From<KvError>,
    {
        let mut conn = self.checkout()?;
        let result = match conn.transaction_with_behavior(TransactionBehavior::Immediate) {
            Ok(tx) => {
                let outcome = f(&SqliteTxn { tx: &tx });
                match outcome {
                    Ok(value) => tx
                        .commit()
                        .map(|_| value)
                        .map_err(|e| KvError::engine("commit", b"", e).into()),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(KvError::engine("begin_update", b"", e).into()),
        };
        self.checkin(conn);
        result
    }

    fn engine_name(&self) -> &'static str {
        "sqlite"
    }
}

struct SqliteTxn<'a, 'c> {
    tx: &'a Transaction<'c>,
}

impl ReadTxn for SqliteTxn<'_, '_> {
    fn get(&self, key: &[u8]) -> KvResult<Vec<u8>> {
        self.tx
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()
            .map_err(|e| KvError::engine("get", key, e))?
            .ok_or(KvError::NotFound)
    }

    fn exists(&self, key: &[u8]) -> KvResult<bool> {
        let found = self
            .tx
            .query_row("SELECT 1 FROM kv WHERE key = ?1", params![key], |_| Ok(()))
            .optional()
            .map_err(|e| KvError::engine("exists", key, e))?;
        Ok(found.is_some())
    }

    fn scan(&self, range: &KeyRange, direction: Direction, limit: usize) -> KvResult<Vec<KvPair>> {
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let (clause, mut args) = where_clause(range);
        let order = match direction {
            Direction::Forward => "ASC",
            Direction::Reverse => "DESC",
        };
        let sql = format!(
            "SELECT key, value FROM kv{} ORDER BY key {} LIMIT ?",
            clause, order
        );
        args.push(Value::Integer(limit as i64));

        let anchor = range.start.as_deref().unwrap_or_default();
        let mut stmt = self
            .tx
            .prepare_cached(&sql)
            .map_err(|e| KvError::engine("scan", anchor, e))?;

        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok((row.get::<_, Vec<u8>>(0)?, row.get::<_, Vec<u8>>(1)?))
            })
            .map_err(|e| KvError::engine("scan", anchor, e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| KvError::engine("scan", anchor, e))
    }
}

impl WriteTxn for SqliteTxn<'_, '_> {
    fn set(&self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.tx
            .prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")
            .and_then(|mut stmt| stmt.execute(params![key, value]))
            .map_err(|e| KvError::engine("set", key, e))?;
        Ok(())
    }

    fn delete_range(&self, range: &KeyRange) -> KvResult<usize> {
        if range.is_empty() {
            return Ok(0);
        }

        let (clause, args) = where_clause(range);
        let anchor = range.start.as_deref().unwrap_or_default();
        self.tx
            .execute(&format!("DELETE FROM kv{}", clause), params_from_iter(args.iter()))
            .map_err(|e| KvError::engine("delete_range", anchor, e))
    }
}

fn where_clause(range: &KeyRange) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut args = Vec::new();

    if let Some(start) = &range.start {
        conditions.push("key >= ?");
        args.push(Value::Blob(start.clone()));
    }
    if let Some(end) = &range.end {
        conditions.push("key < ?");
        args.push(Value::Blob(end.clone()));
    }

    if conditions.is_empty() {
        (String::new(), args)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::kv::KvIter;
    use tempfile::tempdir;

    fn open_test_store() -> (SqliteKv, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let kv = SqliteKv::open(SqliteConfig::new(dir.path())).unwrap();
        (kv, dir)
    }

    #[test]
    fn test_sqlite_creation() {
        let (kv, dir) = open_test_store();
        assert_eq!(kv.path(), dir.path().join(DB_FILE_NAME));
        assert_eq!(kv.engine_name(), "sqlite");
    }

    #[test]
    fn test_set_get_not_found() {
        let (kv, _dir) = open_test_store();
        kv.update(|txn| txn.set(b"alpha", b"1")).unwrap();

        assert_eq!(kv.view(|txn| txn.get(b"alpha")).unwrap(), b"1");
        assert!(kv.view(|txn| txn.exists(b"alpha")).unwrap());

        let missing = kv.view(|txn| txn.get(b"beta"));
        assert!(matches!(missing, Err(KvError::NotFound)));
    }

    #[test]
    fn test_blob_order_is_bytewise() {
        let (kv, _dir) = open_test_store();
        kv.update(|txn| {
            txn.set(&[0x01, 0xFF], b"c")?;
            txn.set(&[0x01], b"a")?;
            txn.set(&[0x01, 0x00], b"b")?;
            txn.set(&[0x02], b"d")?;
            Ok::<_, KvError>(())
        })
        .unwrap();

        let values: Vec<Vec<u8>> = kv
            .view(|txn| txn.scan(&KeyRange::all(), Direction::Forward, 10))
            .unwrap()
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn test_reverse_iteration() {
        let (kv, _dir) = open_test_store();
        kv.update(|txn| {
            for i in 0..20u8 {
                txn.set(&[b'k', i], &[i])?;
            }
            Ok::<_, KvError>(())
        })
        .unwrap();

        let seen = kv
            .view(|txn| {
                let mut iter =
                    KvIter::new(txn, KeyRange::prefix(b"k"), Direction::Reverse).page_size(3);
                iter.seek(&[b'k', 9])?;
                let mut seen = Vec::new();
                while let Some(value) = iter.value() {
                    seen.push(value[0]);
                    iter.advance()?;
                }
                Ok::<_, KvError>(seen)
            })
            .unwrap();
        assert_eq!(seen, (0..=9u8).rev().collect::<Vec<_>>());
    }

    #[test]
    fn test_failed_update_is_rolled_back() {
        let (kv, _dir) = open_test_store();

        let result: KvResult<()> = kv.update(|txn| {
            txn.set(b"ghost", b"boo")?;
            Err(KvError::Lock("abort".to_string()))
        });
        assert!(result.is_err());
        assert!(!kv.view(|txn| txn.exists(b"ghost")).unwrap());
    }

    #[test]
    fn test_delete_range() {
        let (kv, _dir) = open_test_store();
        kv.update(|txn| {
            txn.set(b"a/1", b"x")?;
            txn.set(b"a/2", b"x")?;
            txn.set(b"b/1", b"x")?;
            Ok::<_, KvError>(())
        })
        .unwrap();

        let removed = kv
            .update(|txn| txn.delete_range(&KeyRange::prefix(b"a/")))
            .unwrap();
        assert_eq!(removed, 2);

        let left = kv
            .view(|txn| txn.scan(&KeyRange::all(), Direction::Forward, 10))
            .unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].0, b"b/1");
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        {
            let kv = SqliteKv::open(SqliteConfig::new(dir.path())).unwrap();
            kv.update(|txn| txn.set(b"durable", b"yes")).unwrap();
        }

        let kv = SqliteKv::open(SqliteConfig::new(dir.path())).unwrap();
        assert_eq!(kv.view(|txn| txn.get(b"durable")).unwrap(), b"yes");
    }
}
