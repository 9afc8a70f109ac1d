//! Plan section of the agency: the desired shard layout

use super::replication_factor::ReplicationFactor;
use super::servers::{Server, Servers};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Write concern assumed when a collection declares none
pub const DEFAULT_WRITE_CONCERN: u32 = 1;

/// Database -> collection ID -> collection
pub type PlanCollections = BTreeMap<String, PlanDBCollections>;
pub type PlanDBCollections = BTreeMap<String, PlanCollection>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Plan {
    #[serde(rename = "Collections", default)]
    pub collections: PlanCollections,

    #[serde(rename = "Databases", default)]
    pub databases: BTreeMap<String, PlanDatabase>,

    #[serde(rename = "DBServers", default)]
    pub db_servers: PlanServers,

    #[serde(rename = "Coordinators", default)]
    pub coordinators: PlanServers,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanDatabase {
    #[serde(default)]
    pub id: String,
}

/// Servers registered in the plan (values are opaque)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct PlanServers(pub BTreeMap<Server, serde_json::Value>);

impl PlanServers {
    pub fn exists(&self, server: &str) -> bool {
        self.0.contains_key(server)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanCollection {
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub shards: BTreeMap<String, Servers>,

    #[serde(default)]
    pub write_concern: Option<u32>,

    /// Pre-writeConcern name of the same setting
    #[serde(default)]
    pub min_replication_factor: Option<u32>,

    #[serde(default)]
    pub replication_factor: Option<ReplicationFactor>,

    #[serde(default)]
    pub distribute_shards_like: Option<String>,

    #[serde(default)]
    pub number_of_shards: Option<u32>,
}

impl PlanCollection {
    pub fn count_shards(&self) -> usize {
        self.shards.len()
    }

    /// Collection name, or `default` when the plan entry has none
    pub fn get_name<'a>(&'a self, default: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(default)
    }

    /// `writeConcern`, then legacy `minReplicationFactor`, then `default`
    pub fn get_write_concern(&self, default: u32) -> u32 {
        self.write_concern
            .or(self.min_replication_factor)
            .unwrap_or(default)
    }

    /// Effective replication factor of a shard: the declared count, raised to the
    /// planned replica count when the plan already lists more servers.
    /// Sentinels are returned untouched.
    pub fn get_replication_factor(&self, shard: &str) -> ReplicationFactor {
        let planned = self.shards.get(shard).map(Servers::len).unwrap_or(0) as u32;
        match self.replication_factor {
            None => ReplicationFactor::Count(planned),
            Some(ReplicationFactor::Count(n)) => ReplicationFactor::Count(n.max(planned)),
            Some(sentinel) => sentinel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(json: serde_json::Value) -> PlanCollection {
        serde_json::from_str(&json.to_string()).unwrap()
    }

    #[test]
    fn test_write_concern_fallbacks() {
        let c = collection(serde_json::json!({"writeConcern": 2, "minReplicationFactor": 3}));
        assert_eq!(c.get_write_concern(1), 2);

        let c = collection(serde_json::json!({"minReplicationFactor": 3}));
        assert_eq!(c.get_write_concern(1), 3);

        let c = collection(serde_json::json!({}));
        assert_eq!(c.get_write_concern(DEFAULT_WRITE_CONCERN), 1);
    }

    #[test]
    fn test_effective_replication_factor() {
        let c = collection(serde_json::json!({
            "replicationFactor": 2,
            "shards": {"s1": ["A", "B", "C"], "s2": ["A"]}
        }));
        assert_eq!(c.get_replication_factor("s1"), ReplicationFactor::Count(3));
        assert_eq!(c.get_replication_factor("s2"), ReplicationFactor::Count(2));
        assert_eq!(c.get_replication_factor("missing"), ReplicationFactor::Count(2));

        let c = collection(serde_json::json!({"shards": {"s1": ["A", "B"]}}));
        assert_eq!(c.get_replication_factor("s1"), ReplicationFactor::Count(2));

        let c = collection(serde_json::json!({
            "replicationFactor": "satellite",
            "shards": {"s1": ["A", "B"]}
        }));
        assert!(c.get_replication_factor("s1").is_satellite());
    }

    #[test]
    fn test_name_fallback() {
        let c = collection(serde_json::json!({"name": "_users"}));
        assert_eq!(c.get_name("10001"), "_users");
        assert_eq!(PlanCollection::default().get_name("10001"), "10001");
    }
}
