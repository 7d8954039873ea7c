//! Async facade over the tables
//!
//! Storage calls are blocking, so every operation runs on tokio's blocking
//! pool. Each query still opens exactly one read transaction; many queries can
//! be in flight at once.

use crate::query::{self, PayloadOutput, QueryError, QueryResult, ResourceSelector};
use crate::storage::KvStore;
use crate::table::{
    now_nanos, EvictionReport, PartitionId, RetentionPolicy, Tables, TimeWindow, WatchKey,
    WatchType,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A resource state to store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchRecord {
    pub kind: String,
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    /// Nanoseconds since the epoch
    pub timestamp: i64,
    #[serde(default)]
    pub watch_type: WatchType,
    pub payload: String,
}

/// Fresh id for correlating a query's log lines
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Shared handle to the history store
pub struct HistoryService<S> {
    tables: Arc<Tables<S>>,
}

impl<S> Clone for HistoryService<S> {
    fn clone(&self) -> Self {
        Self {
            tables: Arc::clone(&self.tables),
        }
    }
}

impl<S: KvStore + 'static> HistoryService<S> {
    pub fn new(tables: Tables<S>) -> Self {
        Self {
            tables: Arc::new(tables),
        }
    }

    pub fn tables(&self) -> &Tables<S> {
        &self.tables
    }

    async fn run<R, F>(&self, f: F) -> QueryResult<R>
    where
        R: Send + 'static,
        F: FnOnce(&Tables<S>) -> QueryResult<R> + Send + 'static,
    {
        let tables = Arc::clone(&self.tables);
        tokio::task::spawn_blocking(move || f(tables.as_ref()))
            .await
            .map_err(|e| QueryError::Task(e.to_string()))?
    }

    /// Compacted payload history of one resource
    ///
    /// A request id is generated when none is given.
    pub async fn resource_payload(
        &self,
        selector: ResourceSelector,
        window: TimeWindow,
        request_id: Option<String>,
    ) -> QueryResult<Vec<PayloadOutput>> {
        let request_id = request_id.unwrap_or_else(new_request_id);
        self.run(move |tables| {
            query::resource_payload_history(tables, &selector, window, &request_id)
        })
        .await
    }

    /// Compacted payload history rendered as JSON
    pub async fn resource_payload_json(
        &self,
        selector: ResourceSelector,
        window: TimeWindow,
        request_id: Option<String>,
    ) -> QueryResult<String> {
        let history = self.resource_payload(selector, window, request_id).await?;
        query::render_json(&history)
    }

    /// Store one resource state
    pub async fn record(&self, record: WatchRecord) -> QueryResult<WatchKey> {
        self.run(move |tables| {
            Ok(tables.record(
                &record.kind,
                &record.namespace,
                &record.name,
                record.timestamp,
                record.watch_type,
                &record.payload,
            )?)
        })
        .await
    }

    /// Partitions that currently hold data
    pub async fn partitions(&self) -> QueryResult<Vec<PartitionId>> {
        self.run(|tables| Ok(tables.all_partitions()?)).await
    }

    /// Apply `policy` as of now
    pub async fn evict_expired(&self, policy: RetentionPolicy) -> QueryResult<EvictionReport> {
        self.evict_expired_at(now_nanos(), policy).await
    }

    /// Apply `policy` as of `now` (nanoseconds)
    pub async fn evict_expired_at(
        &self,
        now: i64,
        policy: RetentionPolicy,
    ) -> QueryResult<EvictionReport> {
        self.run(move |tables| Ok(tables.evict_expired(now, &policy)?))
            .await
    }
}
