//! Watch history table
//!
//! One record per observed state of a cluster resource:
//!
//! ```text
//! key   : watch | partition | kind | namespace | name | timestamp
//! value : { timestamp, kind, watch_type, payload }
//! ```
//!
//! Cluster-scoped resources are stored with an empty namespace.

use crate::table::codec::{decode_frame, encode_frame, put_i64, put_str, put_u64, KeyReader};
use crate::table::error::{TableError, TableResult};
use crate::table::partition::{partition_prefix, PartitionId, PartitionScheme};
use crate::table::table::{KeyComparator, Table, TableKey, TableValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of the watch table
pub const WATCH_TABLE: &str = "watch";

/// Table of raw watch results
pub type WatchTable = Table<WatchKey, WatchValue>;

/// Composite key of one recorded resource state
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey {
    pub partition_id: PartitionId,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// Nanoseconds since the epoch
    pub timestamp: i64,
}

impl WatchKey {
    pub fn new(
        partition_id: PartitionId,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            partition_id,
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
            timestamp,
        }
    }

    /// Build a key whose partition is derived from the timestamp
    pub fn at(
        scheme: &PartitionScheme,
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self::new(scheme.partition_id(timestamp), kind, namespace, name, timestamp)
    }
}

impl TableKey for WatchKey {
    type Comparator = WatchKeyComparator;

    const TABLE: &'static str = WATCH_TABLE;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            32 + self.kind.len() + self.namespace.len() + self.name.len(),
        );
        put_str(&mut buf, WATCH_TABLE);
        put_u64(&mut buf, self.partition_id.0);
        put_str(&mut buf, &self.kind);
        put_str(&mut buf, &self.namespace);
        put_str(&mut buf, &self.name);
        put_i64(&mut buf, self.timestamp);
        buf
    }

    fn decode(bytes: &[u8]) -> TableResult<Self> {
        let mut reader = KeyReader::new(bytes);
        let table = reader.take_str()?;
        if table != WATCH_TABLE {
            return Err(TableError::Decode(format!(
                "key belongs to table {:?}, expected {:?}",
                table, WATCH_TABLE
            )));
        }

        let key = Self {
            partition_id: PartitionId(reader.take_u64()?),
            kind: reader.take_str()?,
            namespace: reader.take_str()?,
            name: reader.take_str()?,
            timestamp: reader.take_i64()?,
        };
        reader.finish()?;
        Ok(key)
    }

    fn partition_id(&self) -> PartitionId {
        self.partition_id
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl fmt::Display for WatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/{}/{}/{}/{}/{}/{}",
            WATCH_TABLE, self.partition_id, self.kind, self.namespace, self.name, self.timestamp
        )
    }
}

impl FromStr for WatchKey {
    type Err = TableError;

    /// Parse the `/watch/<partition>/<kind>/<namespace>/<name>/<timestamp>` form
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() != 7 || !parts[0].is_empty() || parts[1] != WATCH_TABLE {
            return Err(TableError::Decode(format!("malformed watch key: {}", s)));
        }

        let partition = parts[2]
            .parse::<u64>()
            .map_err(|e| TableError::Decode(format!("bad partition in {}: {}", s, e)))?;
        let timestamp = parts[6]
            .parse::<i64>()
            .map_err(|e| TableError::Decode(format!("bad timestamp in {}: {}", s, e)))?;

        Ok(Self::new(
            PartitionId(partition),
            parts[3],
            parts[4],
            parts[5],
            timestamp,
        ))
    }
}

/// Partial watch key; an empty component matches anything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchKeyComparator {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl WatchKeyComparator {
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

    fn components(&self) -> [&str; 3] {
        [&self.kind, &self.namespace, &self.name]
    }
}

impl KeyComparator<WatchKey> for WatchKeyComparator {
    fn prefix(&self, partition: PartitionId) -> Vec<u8> {
        let mut buf = partition_prefix(WATCH_TABLE, partition);
        for component in self.components() {
            if component.is_empty() {
                break;
            }
            put_str(&mut buf, component);
        }
        buf
    }

    fn matches(&self, key: &WatchKey) -> bool {
        let fixed = |want: &str, have: &str| want.is_empty() || want == have;
        fixed(&self.kind, &key.kind)
            && fixed(&self.namespace, &key.namespace)
            && fixed(&self.name, &key.name)
    }

    fn is_exact(&self) -> bool {
        self.components().iter().all(|c| !c.is_empty())
    }
}

impl fmt::Display for WatchKeyComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |c: &str| if c.is_empty() { "*".to_string() } else { c.to_string() };
        write!(
            f,
            "/{}/*/{}/{}/{}/*",
            WATCH_TABLE,
            show(&self.kind),
            show(&self.namespace),
            show(&self.name)
        )
    }
}

/// Kind of change a watch event reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatchType {
    Add,
    Update,
    Delete,
    #[default]
    Unknown,
}

impl FromStr for WatchType {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "add" | "added" => Ok(WatchType::Add),
            "update" | "modified" => Ok(WatchType::Update),
            "delete" | "deleted" => Ok(WatchType::Delete),
            "unknown" => Ok(WatchType::Unknown),
            other => Err(TableError::Decode(format!("unknown watch type: {}", other))),
        }
    }
}

/// A recorded resource state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchValue {
    /// When the state was observed, nanoseconds since the epoch
    pub timestamp: i64,
    pub kind: String,
    pub watch_type: WatchType,
    /// Serialized resource
    pub payload: String,
}

impl WatchValue {
    pub fn new(timestamp: i64, kind: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            timestamp,
            kind: kind.into(),
            watch_type: WatchType::Update,
            payload: payload.into(),
        }
    }

    /// Builder method: set the watch type
    pub fn watch_type(mut self, watch_type: WatchType) -> Self {
        self.watch_type = watch_type;
        self
    }
}

impl TableValue for WatchValue {
    fn encode(&self) -> TableResult<Vec<u8>> {
        encode_frame(self)
    }

    fn decode(bytes: &[u8]) -> TableResult<Self> {
        decode_frame(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(kind: &str, ns: &str, name: &str, ts: i64) -> WatchKey {
        WatchKey::new(PartitionId(7), kind, ns, name, ts)
    }

    #[test]
    fn test_key_round_trip() {
        let original = key("Pod", "ns\0odd", "foo-1", -12);
        let decoded = WatchKey::decode(&original.encode()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_timestamp_order_matches_byte_order() {
        let stamps = [-5, 0, 10, 20, 1_700_000_000_000_000_000];
        for pair in stamps.windows(2) {
            let a = key("Pod", "ns1", "foo", pair[0]);
            let b = key("Pod", "ns1", "foo", pair[1]);
            assert!(a.encode() < b.encode());
        }
    }

    #[test]
    fn test_encoded_order_equals_tuple_order() {
        let mut keys = vec![
            key("Pod", "ns1", "foo", 30),
            key("Pod", "ns1", "foo-bar", 10),
            key("Pod", "ns1", "foo", 10),
            key("Node", "", "n1", 5),
            key("Pod", "ns", "zzz", 1),
            key("Pod", "ns1", "fo", 99),
            WatchKey::new(PartitionId(6), "Pod", "ns1", "foo", 50),
        ];
        let mut by_bytes = keys.clone();

        keys.sort();
        by_bytes.sort_by_key(|k| k.encode());
        assert_eq!(keys, by_bytes);
    }

    #[test]
    fn test_decode_rejects_other_tables() {
        let mut bytes = Vec::new();
        put_str(&mut bytes, "events");
        put_u64(&mut bytes, 1);
        assert!(matches!(WatchKey::decode(&bytes), Err(TableError::Decode(_))));
    }

    #[test]
    fn test_display_and_parse() {
        let k = key("Pod", "ns1", "foo", 1234);
        assert_eq!(k.to_string(), "/watch/0000000007/Pod/ns1/foo/1234");
        assert_eq!(k.to_string().parse::<WatchKey>().unwrap(), k);

        let cluster = key("Node", "", "n1", 5);
        assert_eq!(cluster.to_string().parse::<WatchKey>().unwrap(), cluster);

        assert!("/watch/abc/Pod/ns1/foo/1".parse::<WatchKey>().is_err());
        assert!("watch/1/Pod".parse::<WatchKey>().is_err());
    }

    #[test]
    fn test_comparator_prefix_and_match() {
        let exact = WatchKeyComparator::new("Pod", "ns1", "foo");
        assert!(exact.is_exact());
        assert!(exact.matches(&key("Pod", "ns1", "foo", 1)));
        assert!(!exact.matches(&key("Pod", "ns1", "foo-bar", 1)));
        assert!(key("Pod", "ns1", "foo", 1).encode().starts_with(&exact.prefix(PartitionId(7))));
        assert!(!key("Pod", "ns1", "foo-bar", 1)
            .encode()
            .starts_with(&exact.prefix(PartitionId(7))));

        let any_namespace = WatchKeyComparator::new("Node", "", "n1");
        assert!(!any_namespace.is_exact());
        assert!(any_namespace.matches(&key("Node", "", "n1", 1)));
        assert!(any_namespace.matches(&key("Node", "x", "n1", 1)));
        assert!(!any_namespace.matches(&key("Node", "", "n2", 1)));
        assert_eq!(
            any_namespace.to_string(),
            "/watch/*/Node/*/n1/*"
        );
    }

    #[test]
    fn test_value_round_trip() {
        let value = WatchValue::new(10, "Pod", r#"{"metadata":{"name":"foo"}}"#)
            .watch_type(WatchType::Add);
        let restored = WatchValue::decode(&value.encode().unwrap()).unwrap();
        assert_eq!(restored, value);
    }

    #[test]
    fn test_watch_type_parse() {
        assert_eq!("MODIFIED".parse::<WatchType>().unwrap(), WatchType::Update);
        assert_eq!("add".parse::<WatchType>().unwrap(), WatchType::Add);
        assert!("bogus".parse::<WatchType>().is_err());
    }
}
