//! # agency-sync
//!
//! Client-side view of an ArangoDB cluster agency, as used by an operator:
//! - Concurrent leader discovery with quorum and health checks
//! - A layered state loader that only re-reads the agency when it changed
//! - A typed model of Plan, Current, Target and Supervision
//! - Shard safety queries (may this DBServer restart now? which shards lag?)
//! - Resilience checks before a member is declared failed
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐  ┌───────────┐  ┌───────────┐
//! │  Agent A  │  │  Agent B  │  │  Agent C  │
//! └─────┬─────┘  └─────┬─────┘  └─────┬─────┘
//!       │ GET /_api/agency/config     │
//!       └──────────────┼──────────────┘
//!               ┌──────▼───────┐
//!               │  discovery   │  leader + Health
//!               └──────┬───────┘
//!                      │ POST /_api/agency/read (leader only)
//!               ┌──────▼───────┐
//!               │ loader chain │  Refresh -> Delay -> InvalidateOnError -> base
//!               └──────┬───────┘
//!               ┌──────▼───────┐
//!               │    Cache     │  data(), health(), shards_in_sync_map()
//!               └──────┬───────┘
//!          ┌───────────┴───────────┐
//!   shard safety filters     resilience checks
//! ```
//!
//! ## Usage
//!
//! ```no_run
//! use agency_sync::agency::{http_connections, new_cache, Cache};
//! use agency_sync::Config;
//!
//! # async fn run() -> agency_sync::Result<()> {
//! let config = Config::load()?;
//! let cache = new_cache(config.deployment_mode, &config.cache);
//! let connections = http_connections(&config.agents, config.jwt.as_deref());
//!
//! let index = cache.reload(config.agency_size(), &connections).await?;
//! if let Some(state) = cache.data() {
//!     println!("{} shards at commit index {}", state.count_shards(), index);
//! }
//! # Ok(())
//! # }
//! ```

#![allow(clippy::result_large_err)]

pub mod agency;
pub mod common;
pub mod resilience;

// Re-export commonly used types
pub use agency::{Cache, Health, State};
pub use common::{Config, Error, Result};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
