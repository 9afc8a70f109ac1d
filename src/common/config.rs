//! Configuration for agency-sync components
//!
//! All tunables are plain values handed to constructors at startup. Nothing here
//! is process-global: two caches built from two configs never share settings.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Environment variable pointing at the TOML config file
pub const CONFIG_PATH_ENV: &str = "AGENCY_SYNC_CONFIG";

/// Default config file name when `AGENCY_SYNC_CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "agency-sync.toml";

/// Prefix for environment overrides (`AGENCY_SYNC__CACHE__REFRESH_DELAY_MS=250`)
pub const ENV_PREFIX: &str = "AGENCY_SYNC";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment mode of the managed cluster
    pub deployment_mode: DeploymentMode,

    /// Agent name -> endpoint URL
    pub agents: BTreeMap<String, String>,

    /// Configured agency size; falls back to the number of agents when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency_size: Option<usize>,

    /// Bearer token sent with every agency request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt: Option<String>,

    /// Logging level
    pub log_level: String,

    /// Agency cache tunables
    pub cache: AgencyCacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            deployment_mode: DeploymentMode::Cluster,
            agents: BTreeMap::new(),
            agency_size: None,
            jwt: None,
            log_level: default_log_level(),
            cache: AgencyCacheConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    Single,
    ActiveFailover,
    Cluster,
}

impl DeploymentMode {
    /// Does this mode run an agency at all?
    pub fn has_agents(&self) -> bool {
        matches!(self, DeploymentMode::ActiveFailover | DeploymentMode::Cluster)
    }

    /// Does this mode run DBServers holding shards?
    pub fn has_db_servers(&self) -> bool {
        matches!(self, DeploymentMode::Cluster)
    }
}

impl std::fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeploymentMode::Single => write!(f, "single"),
            DeploymentMode::ActiveFailover => write!(f, "active_failover"),
            DeploymentMode::Cluster => write!(f, "cluster"),
        }
    }
}

/// Agency cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgencyCacheConfig {
    /// Minimum time between two full refreshes while the state is valid (0 disables)
    pub refresh_delay_ms: u64,

    /// Forced invalidation period bounding staleness (0 disables)
    pub refresh_interval_ms: u64,

    /// Timeout of a single agent probe
    pub agent_timeout_ms: u64,

    /// Timeout of one refresh against the leader (0 disables)
    pub fetch_timeout_ms: u64,

    /// Retries of a failed refresh against the leader (0 disables)
    pub fetch_retries: usize,

    /// Timeout of a whole reload (discovery + refresh)
    pub reload_timeout_ms: u64,
}

impl Default for AgencyCacheConfig {
    fn default() -> Self {
        Self {
            refresh_delay_ms: 500,
            refresh_interval_ms: 0,
            agent_timeout_ms: 2_000,
            fetch_timeout_ms: 0,
            fetch_retries: 0,
            reload_timeout_ms: 10_000,
        }
    }
}

impl AgencyCacheConfig {
    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.refresh_delay_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn reload_timeout(&self) -> Duration {
        Duration::from_millis(self.reload_timeout_ms)
    }

    /// Check timeout layering: probe < reload
    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "agent_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.reload_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "reload_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.agent_timeout_ms >= self.reload_timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "agent_timeout_ms ({}) must be lower than reload_timeout_ms ({})",
                self.agent_timeout_ms, self.reload_timeout_ms
            )));
        }
        if self.fetch_timeout_ms >= self.reload_timeout_ms {
            return Err(Error::InvalidConfig(format!(
                "fetch_timeout_ms ({}) must be lower than reload_timeout_ms ({})",
                self.fetch_timeout_ms, self.reload_timeout_ms
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Load config from `$AGENCY_SYNC_CONFIG` (or `agency-sync.toml`) plus env overrides
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Load config from a specific file; a missing file yields defaults
    pub fn load_from(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::new(path, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(size) = self.agency_size {
            if size == 0 {
                return Err(Error::InvalidConfig("agency_size must be positive".into()));
            }
        }
        self.cache.validate()
    }

    /// Effective agency size
    pub fn agency_size(&self) -> usize {
        self.agency_size.unwrap_or(self.agents.len())
    }
}
