//! Agency cache
//!
//! One cache per managed deployment. [`Cache::reload`] is the only fallible
//! entry point: it discovers the leader, publishes the observed health, then
//! refreshes the loader pipeline. Readers only ever take short locks and get a
//! consistent snapshot, possibly stale, or `None` when nothing usable is
//! published.

use super::connection::AgentConnections;
use super::discovery::{discover_leader, StaticLeader};
use super::health::Health;
use super::loader::{new_loader, SharedLoader};
use super::state::{AgencyRoot, ShardsSyncStatus, State, DB};
use crate::common::config::{AgencyCacheConfig, DeploymentMode};
use crate::common::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[async_trait]
pub trait Cache: Send + Sync {
    /// Discover the leader and refresh the state, returning the loaded commit index
    async fn reload(&self, agency_size: usize, connections: &AgentConnections) -> Result<u64>;

    /// `/arango` view, `None` while the cache is invalid
    fn data(&self) -> Option<Arc<State>>;

    /// `/arangodb` view, `None` while the cache is invalid
    fn data_db(&self) -> Option<Arc<DB>>;

    /// Commit index of the last loaded snapshot
    fn commit_index(&self) -> u64;

    /// Health seen by the last reload, `None` when the agency was not serving
    fn health(&self) -> Option<Health>;

    /// Shard ID -> last time it was seen in sync
    fn shards_in_sync_map(&self) -> Option<ShardsSyncStatus>;
}

/// Cache for the given deployment mode
pub fn new_cache(mode: DeploymentMode, config: &AgencyCacheConfig) -> Arc<dyn Cache> {
    if mode.has_agents() {
        Arc::new(ClusterCache::new(config.clone()))
    } else {
        Arc::new(SingleCache)
    }
}

struct Published {
    health: Option<Health>,
    shards_in_sync: Option<ShardsSyncStatus>,
}

/// Cache backed by a real agency
pub struct ClusterCache {
    config: AgencyCacheConfig,
    reload_lock: tokio::sync::Mutex<()>,
    loader: SharedLoader<AgencyRoot>,
    published: Mutex<Published>,
}

impl ClusterCache {
    pub fn new(config: AgencyCacheConfig) -> Self {
        let loader = new_loader::<AgencyRoot>(&config);
        Self::with_loader(config, loader)
    }

    /// Cache over a custom loader pipeline
    pub fn with_loader(config: AgencyCacheConfig, loader: SharedLoader<AgencyRoot>) -> Self {
        Self {
            config,
            reload_lock: tokio::sync::Mutex::new(()),
            loader,
            published: Mutex::new(Published {
                health: None,
                shards_in_sync: None,
            }),
        }
    }

    fn published(&self) -> MutexGuard<'_, Published> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn root(&self) -> Option<Arc<AgencyRoot>> {
        self.loader
            .state()
            .filter(|snapshot| snapshot.valid)
            .map(|snapshot| snapshot.data)
    }

    async fn reload_locked(&self, agency_size: usize, connections: &AgentConnections) -> Result<u64> {
        let (leader, health) =
            match discover_leader(connections, agency_size, self.config.agent_timeout()).await {
                Ok(found) => found,
                Err(e) => {
                    self.loader.invalidate();
                    self.published().health = None;
                    return Err(e);
                }
            };

        self.published().health = Some(health);

        self.loader.refresh(&StaticLeader::new(leader)).await?;

        let snapshot = self.loader.state().ok_or(Error::StateNotLoaded)?;
        let statuses = snapshot.data.arango.get_shards_status();

        let mut published = self.published();
        let previous = published.shards_in_sync.take().unwrap_or_default();
        published.shards_in_sync = Some(previous.advance(&statuses, Utc::now()));

        Ok(snapshot.commit_index)
    }
}

#[async_trait]
impl Cache for ClusterCache {
    async fn reload(&self, agency_size: usize, connections: &AgentConnections) -> Result<u64> {
        let _guard = self.reload_lock.lock().await;

        let timeout = self.config.reload_timeout();
        match tokio::time::timeout(timeout, self.reload_locked(agency_size, connections)).await {
            Ok(result) => result,
            Err(_) => {
                self.loader.invalidate();
                Err(Error::Timeout(format!("agency reload exceeded {:?}", timeout)))
            }
        }
    }

    fn data(&self) -> Option<Arc<State>> {
        self.root().map(|root| root.arango.clone())
    }

    fn data_db(&self) -> Option<Arc<DB>> {
        self.root().map(|root| root.arango_db.clone())
    }

    fn commit_index(&self) -> u64 {
        self.loader
            .state()
            .map(|snapshot| snapshot.commit_index)
            .unwrap_or(0)
    }

    fn health(&self) -> Option<Health> {
        self.published().health.clone()
    }

    fn shards_in_sync_map(&self) -> Option<ShardsSyncStatus> {
        if !self.loader.valid() {
            return None;
        }
        self.published().shards_in_sync.clone()
    }
}

/// Cache for deployments without an agency
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCache;

#[async_trait]
impl Cache for SingleCache {
    async fn reload(&self, _agency_size: usize, _connections: &AgentConnections) -> Result<u64> {
        Ok(0)
    }

    fn data(&self) -> Option<Arc<State>> {
        Some(Arc::new(State::default()))
    }

    fn data_db(&self) -> Option<Arc<DB>> {
        Some(Arc::new(DB::default()))
    }

    fn commit_index(&self) -> u64 {
        0
    }

    fn health(&self) -> Option<Health> {
        None
    }

    fn shards_in_sync_map(&self) -> Option<ShardsSyncStatus> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_cache() {
        let cache = new_cache(DeploymentMode::Single, &AgencyCacheConfig::default());
        assert_eq!(cache.reload(0, &AgentConnections::new()).await.unwrap(), 0);
        assert_eq!(cache.data().unwrap().count_shards(), 0);
        assert!(cache.data_db().is_some());
        assert!(cache.health().is_none());
        assert!(cache.shards_in_sync_map().is_none());
    }

    #[tokio::test]
    async fn test_cluster_cache_without_agents() {
        let cache = new_cache(DeploymentMode::Cluster, &AgencyCacheConfig::default());
        let err = cache.reload(0, &AgentConnections::new()).await.err().unwrap();
        assert!(matches!(err, Error::QuorumLost(_)));
        assert!(cache.data().is_none());
        assert!(cache.health().is_none());
        assert_eq!(cache.commit_index(), 0);
    }
}
