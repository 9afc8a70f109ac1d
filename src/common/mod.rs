//! Common utilities and types shared across agency-sync

pub mod config;
pub mod error;
pub mod utils;

pub use config::{AgencyCacheConfig, Config, DeploymentMode};
pub use error::{Error, Result};
pub use utils::{content_hash, parse_duration, retry_with_backoff};
