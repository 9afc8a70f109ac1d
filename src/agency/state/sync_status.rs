//! Per-shard "last seen in sync" bookkeeping

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Shard ID -> last time the shard was observed in sync
///
/// Shards never observed in sync carry the Unix epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardsSyncStatus(pub BTreeMap<String, DateTime<Utc>>);

impl ShardsSyncStatus {
    /// Next generation of the map given the shard statuses of a fresh snapshot.
    ///
    /// Shards gone from the plan are dropped, in-sync shards move to `now`,
    /// the others keep their previous timestamp.
    pub fn advance(&self, statuses: &BTreeMap<String, bool>, now: DateTime<Utc>) -> Self {
        let next = statuses
            .iter()
            .map(|(shard, in_sync)| {
                let seen = if *in_sync {
                    now
                } else {
                    self.0.get(shard).copied().unwrap_or_default()
                };
                (shard.clone(), seen)
            })
            .collect();
        ShardsSyncStatus(next)
    }

    pub fn last_in_sync(&self, shard: &str) -> Option<DateTime<Utc>> {
        self.0.get(shard).copied()
    }

    /// Shards whose last in-sync observation is older than `duration`
    pub fn not_in_sync_since(&self, duration: Duration, now: DateTime<Utc>) -> Vec<String> {
        let Some(threshold) = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_sub_signed(d))
        else {
            return Vec::new();
        };
        self.0
            .iter()
            .filter(|(_, seen)| **seen < threshold)
            .map(|(shard, _)| shard.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
