//! Partition-level retention
//!
//! Data is only ever removed a whole partition at a time. A partition expires
//! once its entire window lies before `now - max_age`; when a partition limit
//! is set, the oldest partitions beyond it are removed as well.

use crate::storage::WriteTxn;
use crate::table::error::TableResult;
use crate::table::partition::{all_partitions, delete_partition, PartitionId, PartitionScheme};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How much history to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Drop partitions that end before `now - max_age`
    pub max_age: Option<Duration>,
    /// Keep at most this many of the newest partitions
    pub max_partitions: Option<usize>,
}

impl RetentionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the maximum age
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Builder method: set the partition limit
    pub fn max_partitions(mut self, max_partitions: usize) -> Self {
        self.max_partitions = Some(max_partitions);
        self
    }

    /// True when nothing would ever be evicted
    pub fn is_unbounded(&self) -> bool {
        self.max_age.is_none() && self.max_partitions.is_none()
    }

    /// Pick the partitions to delete out of `existing` (ascending order)
    pub fn select(
        &self,
        scheme: &PartitionScheme,
        existing: &[PartitionId],
        now: i64,
    ) -> Vec<PartitionId> {
        let mut expired: Vec<PartitionId> = match self.max_age {
            Some(age) => {
                let span = i64::try_from(age.as_nanos()).unwrap_or(i64::MAX);
                let cutoff = now.saturating_sub(span);
                existing
                    .iter()
                    .copied()
                    .filter(|id| scheme.partition_window(*id).end < cutoff)
                    .collect()
            }
            None => Vec::new(),
        };

        if let Some(limit) = self.max_partitions {
            let survivors = existing.len() - expired.len();
            if survivors > limit {
                let oldest: Vec<PartitionId> = existing
                    .iter()
                    .copied()
                    .filter(|id| !expired.contains(id))
                    .take(survivors - limit)
                    .collect();
                expired.extend(oldest);
            }
        }

        expired.sort();
        expired
    }
}

/// Outcome of one eviction pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionReport {
    pub table_name: String,
    pub partitions_removed: Vec<PartitionId>,
    pub keys_removed: usize,
    pub partitions_remaining: usize,
}

impl fmt::Display for EvictionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Table: {}, Partitions removed: {}, Keys removed: {}, Partitions remaining: {}",
            self.table_name,
            self.partitions_removed.len(),
            self.keys_removed,
            self.partitions_remaining
        )
    }
}

/// Delete every partition of `table` the policy selects
pub fn evict<T>(
    txn: &T,
    table: &str,
    scheme: &PartitionScheme,
    policy: &RetentionPolicy,
    now: i64,
) -> TableResult<EvictionReport>
where
    T: WriteTxn + ?Sized,
{
    let existing = all_partitions(txn, table)?;
    let doomed = policy.select(scheme, &existing, now);

    let mut report = EvictionReport {
        table_name: table.to_string(),
        partitions_remaining: existing.len() - doomed.len(),
        ..Default::default()
    };

    for id in doomed {
        report.keys_removed += delete_partition(txn, table, id)?;
        report.partitions_removed.push(id);
    }

    tracing::info!("Eviction finished: {}", report);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::partition::NANOS_PER_SEC;

    const HOUR: i64 = 3600 * NANOS_PER_SEC;

    fn ids(raw: &[u64]) -> Vec<PartitionId> {
        raw.iter().copied().map(PartitionId).collect()
    }

    #[test]
    fn test_unbounded_policy_keeps_everything() {
        let policy = RetentionPolicy::new();
        assert!(policy.is_unbounded());
        assert!(policy
            .select(&PartitionScheme::default(), &ids(&[1, 2, 3]), 100 * HOUR)
            .is_empty());
    }

    #[test]
    fn test_max_age_drops_fully_expired_partitions() {
        let scheme = PartitionScheme::default();
        let policy = RetentionPolicy::new().max_age(Duration::from_secs(2 * 3600));

        // cutoff is 8h; partition 7 ends at 8h - 1
        let now = 10 * HOUR;
        let selected = policy.select(&scheme, &ids(&[2, 6, 7, 8, 9]), now);
        assert_eq!(selected, ids(&[2, 6, 7]));

        // a partition straddling the cutoff survives
        let selected = policy.select(&scheme, &ids(&[7, 8]), now + HOUR / 2);
        assert_eq!(selected, ids(&[7]));
    }

    #[test]
    fn test_max_partitions_drops_oldest() {
        let scheme = PartitionScheme::default();
        let policy = RetentionPolicy::new().max_partitions(2);
        let selected = policy.select(&scheme, &ids(&[3, 4, 5, 6]), 0);
        assert_eq!(selected, ids(&[3, 4]));
    }

    #[test]
    fn test_limits_combine() {
        let scheme = PartitionScheme::default();
        let policy = RetentionPolicy::new()
            .max_age(Duration::from_secs(3 * 3600))
            .max_partitions(1);
        let selected = policy.select(&scheme, &ids(&[1, 8, 9]), 10 * HOUR);
        assert_eq!(selected, ids(&[1, 8]));
    }
}
