//! Typed view of the agency tree
//!
//! Snapshots are decoded once per refresh and never mutated afterwards; the
//! cache swaps in a whole new [`AgencyRoot`] on every successful reload.

pub mod current;
pub mod exists;
pub mod plan;
pub mod replication_factor;
pub mod servers;
pub mod shards;
pub mod supervision;
pub mod sync_status;
pub mod target;

pub use current::{Current, CurrentDBShard, CurrentMaintenanceServers};
pub use exists::{ArangoSyncLazy, StateExists};
pub use plan::{Plan, PlanCollection, PlanServers, DEFAULT_WRITE_CONCERN};
pub use replication_factor::ReplicationFactor;
pub use servers::{Server, ServerList, Servers};
pub use shards::{
    filter_db_server_shard_restart, filter_db_server_shards_not_in_sync,
    get_db_server_blocking_restart_shards, get_db_server_shards_not_in_sync, negate_filter,
    CollectionShardDetail, CollectionShardDetails, ShardFilter, ANY_SERVER,
};
pub use supervision::Supervision;
pub use sync_status::ShardsSyncStatus;
pub use target::{Job, JobPhase, Target};

use crate::agency::connection::{AgencyKey, ReadRequest};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const ARANGO_KEY: &str = "arango";
pub const ARANGODB_KEY: &str = "arangodb";
pub const ARANGOSYNC_KEY: &str = "arangosync";

/// A root payload the agency can be asked for
pub trait AgencyPayload: DeserializeOwned + Send + Sync + 'static {
    /// Keys fetched in one read transaction
    fn read_request() -> ReadRequest;
}

/// Full operator view: `/arango` plus `/arangodb`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgencyRoot {
    #[serde(rename = "arango", default)]
    pub arango: Arc<State>,

    #[serde(rename = "arangodb", default)]
    pub arango_db: Arc<DB>,
}

impl AgencyPayload for AgencyRoot {
    fn read_request() -> ReadRequest {
        let arango = |segments: &[&str]| {
            let mut key = vec![ARANGO_KEY];
            key.extend_from_slice(segments);
            AgencyKey::new(key)
        };

        ReadRequest::new(vec![
            arango(&["Supervision", "Maintenance"]),
            arango(&["Plan", "Collections"]),
            arango(&["Plan", "Databases"]),
            arango(&["Plan", "DBServers"]),
            arango(&["Plan", "Coordinators"]),
            arango(&["Current", "Collections"]),
            arango(&["Current", "MaintenanceServers"]),
            arango(&["Current", "ServersKnown"]),
            arango(&["Target", "HotBackup"]),
            arango(&["Target", "ToDo"]),
            arango(&["Target", "Pending"]),
            arango(&["Target", "Failed"]),
            arango(&["Target", "Finished"]),
            arango(&["Target", "CleanedServers"]),
            arango(&["Target", "ToBeCleanedServers"]),
            AgencyKey::new([ARANGODB_KEY, ARANGOSYNC_KEY]),
        ])
    }
}

/// ArangoSync-only view: `/arangodb`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncRoot {
    #[serde(rename = "arangodb", default)]
    pub arango_db: Arc<DB>,
}

impl AgencyPayload for SyncRoot {
    fn read_request() -> ReadRequest {
        ReadRequest::new(vec![AgencyKey::new([ARANGODB_KEY, ARANGOSYNC_KEY])])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DB {
    #[serde(rename = "arangosync", default)]
    pub arango_sync: ArangoSyncLazy,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct State {
    #[serde(rename = "Supervision", default)]
    pub supervision: Supervision,

    #[serde(rename = "Plan", default)]
    pub plan: Plan,

    #[serde(rename = "Current", default)]
    pub current: Current,

    #[serde(rename = "Target", default)]
    pub target: Target,
}

/// Shard roles a DBServer holds in Current
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShardCounts {
    pub leaders: usize,
    pub followers: usize,
}

impl ShardCounts {
    pub fn total(&self) -> usize {
        self.leaders + self.followers
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardDetails {
    pub shard_id: String,
    pub database: String,
    pub collection: String,
    pub servers: Servers,
}

impl State {
    pub fn count_shards(&self) -> usize {
        self.plan
            .collections
            .values()
            .flat_map(|cols| cols.values())
            .map(PlanCollection::count_shards)
            .sum()
    }

    /// Leader and follower shard counts per DBServer, from Current
    pub fn shards_by_db_servers(&self) -> BTreeMap<Server, ShardCounts> {
        let mut result: BTreeMap<Server, ShardCounts> = BTreeMap::new();

        for shard in self
            .current
            .collections
            .values()
            .flat_map(|cols| cols.values())
            .flat_map(|shards| shards.values())
        {
            if let Some(leader) = shard.servers.leader() {
                result.entry(leader.clone()).or_default().leaders += 1;
            }
            for follower in shard.servers.followers() {
                result.entry(follower.clone()).or_default().followers += 1;
            }
        }

        result
    }

    /// DBServer holding the fewest shards in Current; ties go to the lowest ID
    pub fn get_db_server_with_lowest_shards(&self) -> Option<Server> {
        let mut best: Option<(Server, usize)> = None;

        for (server, counts) in self.shards_by_db_servers() {
            match &best {
                Some((_, total)) if counts.total() >= *total => {}
                _ => best = Some((server, counts.total())),
            }
        }

        best.map(|(server, _)| server)
    }

    /// Locate a shard by ID, Plan first, then Current
    pub fn get_shard_details_by_id(&self, id: &str) -> Option<ShardDetails> {
        for (db_name, db) in &self.plan.collections {
            for (col_name, col) in db {
                if let Some(servers) = col.shards.get(id) {
                    return Some(ShardDetails {
                        shard_id: id.to_string(),
                        database: db_name.clone(),
                        collection: col_name.clone(),
                        servers: servers.clone(),
                    });
                }
            }
        }

        for (db_name, db) in &self.current.collections {
            for (col_name, col) in db {
                if let Some(shard) = col.get(id) {
                    return Some(ShardDetails {
                        shard_id: id.to_string(),
                        database: db_name.clone(),
                        collection: col_name.clone(),
                        servers: shard.servers.clone(),
                    });
                }
            }
        }

        None
    }

    /// Shard ID -> in sync, for every planned shard
    pub fn get_shards_status(&self) -> BTreeMap<String, bool> {
        let mut result = BTreeMap::new();

        for (db, cols) in &self.plan.collections {
            for (col, details) in cols {
                for (shard, servers) in &details.shards {
                    result.insert(shard.clone(), self.is_shard_in_sync(db, col, shard, servers));
                }
            }
        }

        result
    }

    /// Current replica set matches `servers`, leader included
    pub fn is_shard_in_sync(&self, db: &str, col: &str, shard: &str, servers: &Servers) -> bool {
        self.current
            .shard(db, col, shard)
            .map(|current| current.servers.in_sync(servers))
            .unwrap_or(false)
    }

    /// Every server named anywhere in the Plan
    pub fn plan_servers(&self) -> Servers {
        self.collect_plan_servers(|servers| servers.iter().collect())
    }

    /// Every server leading at least one planned shard
    pub fn plan_leader_servers(&self) -> Servers {
        self.collect_plan_servers(|servers| servers.leader().into_iter().collect())
    }

    fn collect_plan_servers<F>(&self, pick: F) -> Servers
    where
        F: Fn(&Servers) -> Vec<&Server>,
    {
        let mut unique: BTreeSet<&Server> = BTreeSet::new();

        for servers in self
            .plan
            .collections
            .values()
            .flat_map(|cols| cols.values())
            .flat_map(|col| col.shards.values())
        {
            unique.extend(pick(servers));
        }

        unique.into_iter().cloned().collect()
    }

    /// Planned `(database, collection, shard)` triples matching `filter`
    pub fn filter<F>(&self, filter: F) -> CollectionShardDetails
    where
        F: Fn(&State, &str, &str, &str) -> bool,
    {
        let mut shards = Vec::new();

        for (db, cols) in &self.plan.collections {
            for (col, details) in cols {
                for shard in details.shards.keys() {
                    if filter(self, db, col, shard) {
                        shards.push(CollectionShardDetail {
                            database: db.clone(),
                            collection: col.clone(),
                            shard: shard.clone(),
                        });
                    }
                }
            }
        }

        shards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(json: serde_json::Value) -> State {
        serde_json::from_str(&json.to_string()).unwrap()
    }

    fn sample() -> State {
        state(serde_json::json!({
            "Plan": {
                "Collections": {
                    "db1": {
                        "1001": {
                            "name": "users",
                            "writeConcern": 1,
                            "shards": {"s1": ["A", "B"], "s2": ["B", "C"]}
                        }
                    }
                },
                "DBServers": {"A": "none", "B": "none", "C": "none"}
            },
            "Current": {
                "Collections": {
                    "db1": {
                        "1001": {
                            "s1": {"servers": ["A", "B"]},
                            "s2": {"servers": ["C", "B"]},
                            "s9": {"servers": ["C"]}
                        }
                    }
                }
            }
        }))
    }

    #[test]
    fn test_count_shards() {
        assert_eq!(sample().count_shards(), 2);
        assert_eq!(State::default().count_shards(), 0);
    }

    #[test]
    fn test_shards_status_checks_leader() {
        let status = sample().get_shards_status();
        assert_eq!(status.get("s1"), Some(&true));
        assert_eq!(status.get("s2"), Some(&false), "leader moved from B to C");
        assert!(!status.contains_key("s9"), "only planned shards are reported");
    }

    #[test]
    fn test_is_shard_in_sync_missing_keys() {
        let s = sample();
        let servers = Servers::new(["A", "B"]);
        assert!(s.is_shard_in_sync("db1", "1001", "s1", &servers));
        assert!(!s.is_shard_in_sync("db2", "1001", "s1", &servers));
        assert!(!s.is_shard_in_sync("db1", "1002", "s1", &servers));
        assert!(!s.is_shard_in_sync("db1", "1001", "s3", &servers));
    }

    #[test]
    fn test_shards_by_db_servers() {
        let counts = sample().shards_by_db_servers();
        assert_eq!(counts["A"], ShardCounts { leaders: 1, followers: 0 });
        assert_eq!(counts["B"], ShardCounts { leaders: 0, followers: 2 });
        assert_eq!(counts["C"], ShardCounts { leaders: 2, followers: 0 });
        assert_eq!(sample().get_db_server_with_lowest_shards().as_deref(), Some("A"));
        assert_eq!(State::default().get_db_server_with_lowest_shards(), None);
    }

    #[test]
    fn test_plan_servers() {
        let s = sample();
        assert_eq!(s.plan_servers(), Servers::new(["A", "B", "C"]));
        assert_eq!(s.plan_leader_servers(), Servers::new(["A", "B"]));
        assert!(s.plan.db_servers.exists("C"));
        assert!(!s.plan.coordinators.exists("C"));
    }

    #[test]
    fn test_shard_details_by_id() {
        let s = sample();
        let plan = s.get_shard_details_by_id("s2").unwrap();
        assert_eq!(plan.collection, "1001");
        assert_eq!(plan.servers, Servers::new(["B", "C"]));

        let current = s.get_shard_details_by_id("s9").unwrap();
        assert_eq!(current.servers, Servers::new(["C"]));

        assert!(s.get_shard_details_by_id("s404").is_none());
    }

    #[test]
    fn test_filter_walks_plan() {
        let s = sample();
        let all = s.filter(|_: &State, _: &str, _: &str, _: &str| true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].shard, "s1");
        assert!(s.filter(negate_filter(|_: &State, _: &str, _: &str, _: &str| true)).is_empty());
    }

    #[test]
    fn test_read_request_paths() {
        let request = AgencyRoot::read_request();
        let paths = request.paths();
        assert!(paths.contains(&"/arango/Plan/Collections".to_string()));
        assert!(paths.contains(&"/arangodb/arangosync".to_string()));
        assert_eq!(SyncRoot::read_request().paths(), vec!["/arangodb/arangosync"]);
    }
}
