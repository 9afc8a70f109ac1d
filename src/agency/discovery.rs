//! Leader discovery
//!
//! Every agent is probed concurrently for its local config. The answers are
//! tallied into a [`Health`] value; the leader is only trusted when the
//! agency is serving. A lagging follower degrades health but still yields the
//! leader connection.

use super::connection::{AgencyConnection, AgentConfig, AgentConnections};
use super::health::Health;
use crate::common::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Source of the current leader connection
#[async_trait]
pub trait LeaderDiscovery: Send + Sync {
    async fn discover(&self) -> Result<Arc<dyn AgencyConnection>>;
}

/// Probe all agents and pick the leader.
///
/// Non-responding agents are logged and left out of the tally. Fails with
/// [`Error::QuorumLost`] when the agency is not serving.
pub async fn discover_leader(
    connections: &AgentConnections,
    agency_size: usize,
    probe_timeout: Duration,
) -> Result<(Arc<dyn AgencyConnection>, Health)> {
    let mut probes = JoinSet::new();

    for (name, conn) in connections {
        let name = name.clone();
        let conn = conn.clone();
        probes.spawn(async move {
            let result = match tokio::time::timeout(probe_timeout, conn.config()).await {
                Ok(result) => result,
                Err(_) => Err(Error::AgentUnreachable(format!(
                    "no answer from {} within {:?}",
                    conn.endpoint(),
                    probe_timeout
                ))),
            };
            (name, conn, result)
        });
    }

    let mut health = Health::new(agency_size);
    let mut by_id: BTreeMap<String, Arc<dyn AgencyConnection>> = BTreeMap::new();

    while let Some(joined) = probes.join_next().await {
        let (name, conn, result) = match joined {
            Ok(probe) => probe,
            Err(e) => {
                tracing::warn!("Agent probe task failed: {}", e);
                continue;
            }
        };

        match result {
            Ok(AgentConfig {
                leader_id,
                commit_index,
                configuration,
            }) => {
                let id = if configuration.id.is_empty() {
                    name
                } else {
                    configuration.id
                };
                health.record(&id, &leader_id, commit_index);
                by_id.insert(id, conn);
            }
            Err(e) => {
                let e = Error::for_agent(name, e);
                tracing::warn!("Skipping agent in leader election: {}", e);
            }
        }
    }

    health.serving()?;

    if let Err(e) = health.healthy() {
        tracing::debug!("Agency is serving but degraded: {}", e);
    }

    let leader = health.leader_id();
    let conn = by_id
        .get(leader)
        .cloned()
        .ok_or_else(|| Error::LeaderNotFound(leader.to_string()))?;

    Ok((conn, health))
}

/// Runs [`discover_leader`] over a fixed set of connections on every call
pub struct AgencyLeaderDiscovery {
    connections: AgentConnections,
    agency_size: usize,
    probe_timeout: Duration,
}

impl AgencyLeaderDiscovery {
    pub fn new(connections: AgentConnections, agency_size: usize, probe_timeout: Duration) -> Self {
        Self {
            connections,
            agency_size,
            probe_timeout,
        }
    }

    /// Discover the leader and return the health observed on the way
    pub async fn discover_with_health(&self) -> Result<(Arc<dyn AgencyConnection>, Health)> {
        discover_leader(&self.connections, self.agency_size, self.probe_timeout).await
    }
}

#[async_trait]
impl LeaderDiscovery for AgencyLeaderDiscovery {
    async fn discover(&self) -> Result<Arc<dyn AgencyConnection>> {
        self.discover_with_health().await.map(|(conn, _)| conn)
    }
}

/// A leader that was already discovered
#[derive(Clone)]
pub struct StaticLeader(Arc<dyn AgencyConnection>);

impl StaticLeader {
    pub fn new(conn: Arc<dyn AgencyConnection>) -> Self {
        Self(conn)
    }
}

#[async_trait]
impl LeaderDiscovery for StaticLeader {
    async fn discover(&self) -> Result<Arc<dyn AgencyConnection>> {
        Ok(self.0.clone())
    }
}
