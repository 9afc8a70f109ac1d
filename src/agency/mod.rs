//! Agency client side: connections, leader discovery, state loading and caching

pub mod cache;
pub mod connection;
pub mod discovery;
pub mod health;
pub mod loader;
pub mod state;

pub use cache::{new_cache, Cache, ClusterCache, SingleCache};
pub use connection::{
    http_connections, AgencyConnection, AgencyKey, AgentConfig, AgentConnections,
    HttpAgencyConnection, ReadRequest,
};
pub use discovery::{discover_leader, AgencyLeaderDiscovery, LeaderDiscovery, StaticLeader};
pub use health::Health;
pub use loader::{
    build_loader, layers, new_loader, AgencyLoader, DelayLoader, InvalidateOnErrorLoader,
    RefreshLoader, RetryLoader, SharedLoader, Snapshot, StateLoader, TimeoutLoader,
};
pub use state::{AgencyRoot, State, SyncRoot, DB};
