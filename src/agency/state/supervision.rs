//! Supervision section of the agency

use super::exists::StateExists;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Supervision {
    /// Present while cluster-wide maintenance mode is switched on
    #[serde(rename = "Maintenance", default)]
    pub maintenance: StateExists,
}

impl Supervision {
    pub fn in_maintenance(&self) -> bool {
        self.maintenance.exists()
    }
}
