//! Current section of the agency: what DBServers actually report

use super::servers::{Server, Servers};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Database -> collection ID -> shard ID -> shard
pub type CurrentCollections = BTreeMap<String, CurrentDBCollections>;
pub type CurrentDBCollections = BTreeMap<String, CurrentDBCollection>;
pub type CurrentDBCollection = BTreeMap<String, CurrentDBShard>;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Current {
    #[serde(rename = "Collections", default)]
    pub collections: CurrentCollections,

    #[serde(rename = "MaintenanceServers", default)]
    pub maintenance_servers: CurrentMaintenanceServers,

    #[serde(rename = "ServersKnown", default)]
    pub servers_known: BTreeMap<Server, CurrentServerKnown>,
}

impl Current {
    /// Replica set reported for a shard, if any
    pub fn shard(&self, db: &str, col: &str, shard: &str) -> Option<&CurrentDBShard> {
        self.collections.get(db)?.get(col)?.get(shard)
    }

    /// Reboot ID the cluster recorded for a server
    pub fn reboot_id(&self, server: &str) -> Option<u64> {
        self.servers_known.get(server).map(|s| s.reboot_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentDBShard {
    /// Replicas in sync right now, leader first
    #[serde(default)]
    pub servers: Servers,

    #[serde(default)]
    pub failover_candidates: Option<Servers>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct CurrentMaintenanceServers(pub BTreeMap<Server, CurrentMaintenanceServer>);

impl CurrentMaintenanceServers {
    pub fn in_maintenance(&self, server: &str) -> bool {
        self.0
            .get(server)
            .map(CurrentMaintenanceServer::in_maintenance)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CurrentMaintenanceServer {
    #[serde(rename = "Mode", default)]
    pub mode: Option<String>,

    #[serde(rename = "Until", default)]
    pub until: Option<String>,
}

impl CurrentMaintenanceServer {
    pub fn in_maintenance(&self) -> bool {
        self.mode.as_deref() == Some("maintenance")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentServerKnown {
    #[serde(default)]
    pub reboot_id: u64,
}
