//! Shard filters answering "is it safe to touch this DBServer right now?"
//!
//! A filter is evaluated once per `(database, collection, shard)` triple found in
//! the Plan. The two exported questions use different notions of "in sync":
//!
//! - restart safety compares the Current replica set against the write concern,
//! - "not in sync" requires the Current replica set to hold exactly the planned
//!   members, regardless of who leads.
//!
//! Both are kept on purpose; [`State::is_shard_in_sync`] is stricter still and
//! also checks the leader position.

use super::plan::DEFAULT_WRITE_CONCERN;
use super::replication_factor::ReplicationFactor;
use super::servers::Servers;
use super::State;
use serde::Serialize;

/// Server ID that makes [`filter_db_server_shards_not_in_sync`] evaluate every shard
pub const ANY_SERVER: &str = "*";

/// Boxed shard predicate
pub type ShardFilter = Box<dyn Fn(&State, &str, &str, &str) -> bool + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionShardDetail {
    pub database: String,
    pub collection: String,
    pub shard: String,
}

pub type CollectionShardDetails = Vec<CollectionShardDetail>;

pub fn negate_filter<F>(filter: F) -> impl Fn(&State, &str, &str, &str) -> bool + Send + Sync
where
    F: Fn(&State, &str, &str, &str) -> bool + Send + Sync,
{
    move |s: &State, db: &str, col: &str, shard: &str| !filter(s, db, col, shard)
}

/// Shards that would lose write availability if `server_id` restarted now
pub fn get_db_server_blocking_restart_shards(s: &State, server_id: &str) -> CollectionShardDetails {
    s.filter(filter_db_server_shard_restart(server_id))
}

/// Matches shards blocking a restart of `server_id`
pub fn filter_db_server_shard_restart(
    server_id: &str,
) -> impl Fn(&State, &str, &str, &str) -> bool + Send + Sync {
    let server_id = server_id.to_string();
    negate_filter(move |s: &State, db: &str, col: &str, shard: &str| {
        shard_allows_restart(s, db, col, shard, &server_id)
    })
}

fn shard_allows_restart(s: &State, db: &str, col: &str, shard: &str, server_id: &str) -> bool {
    let Some(plan) = s.plan.collections.get(db).and_then(|c| c.get(col)) else {
        return true;
    };
    let Some(plan_shard) = plan.shards.get(shard) else {
        return true;
    };

    if !plan_shard.contains(server_id) {
        return true;
    }

    // Only planned replicas count towards the write concern
    let current_shard = s
        .current
        .shard(db, col, shard)
        .map(|c| c.servers.join(plan_shard))
        .unwrap_or_default();
    let server_in_sync = current_shard.contains(server_id);

    if plan_shard.len() == 1 && server_in_sync {
        return true;
    }

    let mut wc = plan.get_write_concern(DEFAULT_WRITE_CONCERN) as usize;
    let rf = match plan.get_replication_factor(shard) {
        ReplicationFactor::Unknown => current_shard.len(),
        ReplicationFactor::Satellite => s.plan_servers().len(),
        ReplicationFactor::Count(n) => n as usize,
    };

    // With WC == RF every restart means downtime, so require one replica less
    if wc >= rf {
        wc = rf.saturating_sub(1);
    }

    if current_shard.len() >= wc && !server_in_sync {
        return true;
    }

    current_shard.len() > wc
}

/// Shards not fully replicated among the ones `server_id` takes part in
pub fn get_db_server_shards_not_in_sync(s: &State, server_id: &str) -> CollectionShardDetails {
    s.filter(filter_db_server_shards_not_in_sync(server_id))
}

/// Matches shards whose Current replicas differ from the planned set.
/// `server_id == "*"` evaluates every shard.
pub fn filter_db_server_shards_not_in_sync(
    server_id: &str,
) -> impl Fn(&State, &str, &str, &str) -> bool + Send + Sync {
    let server_id = server_id.to_string();
    negate_filter(move |s: &State, db: &str, col: &str, shard: &str| {
        let Some(plan_shard) = s
            .plan
            .collections
            .get(db)
            .and_then(|c| c.get(col))
            .and_then(|c| c.shards.get(shard))
        else {
            return true;
        };

        if server_id != ANY_SERVER && !plan_shard.contains(&server_id) {
            return true;
        }

        let empty = Servers::default();
        let current = s
            .current
            .shard(db, col, shard)
            .map(|c| &c.servers)
            .unwrap_or(&empty);

        current.same_members(plan_shard)
    })
}
