//! Resilience: deciding when a member may be declared failed
//!
//! Declaring a member failed triggers its replacement, so each server group
//! gets a safety check before the phase flips.

pub mod member_failure;

pub use member_failure::{
    check_member_failure, is_member_failure_acceptable, CacheResilienceContext, FailureDecision,
    ResilienceContext, NOT_READY_GRACE_PERIOD, RECENT_TERMINATIONS_WINDOW,
    RECENT_TERMINATION_THRESHOLD,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role of a member in the deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerGroup {
    Single,
    Agents,
    DBServers,
    Coordinators,
    SyncMasters,
    SyncWorkers,
}

impl ServerGroup {
    pub fn as_role(&self) -> &'static str {
        match self {
            ServerGroup::Single => "single",
            ServerGroup::Agents => "agent",
            ServerGroup::DBServers => "dbserver",
            ServerGroup::Coordinators => "coordinator",
            ServerGroup::SyncMasters => "syncmaster",
            ServerGroup::SyncWorkers => "syncworker",
        }
    }
}

impl std::fmt::Display for ServerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_role())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberPhase {
    #[default]
    None,
    Pending,
    Created,
    Failed,
    Upgrading,
    Rotating,
    RotateStart,
    CleanOut,
    Drain,
    Resign,
    Removed,
}

impl MemberPhase {
    pub fn is_failed(&self) -> bool {
        matches!(self, MemberPhase::Failed)
    }

    /// Phases only reachable while a plan action drives the member
    pub fn is_transitional(&self) -> bool {
        matches!(
            self,
            MemberPhase::Upgrading
                | MemberPhase::Rotating
                | MemberPhase::CleanOut
                | MemberPhase::RotateStart
        )
    }
}

/// Last transition of the member's Ready condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyCondition {
    pub ready: bool,
    pub last_transition: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberStatus {
    pub id: String,

    #[serde(default)]
    pub phase: MemberPhase,

    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub ready: Option<ReadyCondition>,

    /// Pod terminations, oldest first
    #[serde(default)]
    pub recent_terminations: Vec<DateTime<Utc>>,
}

impl MemberStatus {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            phase: MemberPhase::None,
            created_at,
            ready: None,
            recent_terminations: Vec::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.map(|c| c.ready).unwrap_or(false)
    }

    /// Not ready since before `timestamp`: either the Ready condition turned
    /// false before it, or the member never reported Ready and was created before it
    pub fn is_not_ready_since(&self, timestamp: DateTime<Utc>) -> bool {
        match self.ready {
            Some(cond) => !cond.ready && cond.last_transition < timestamp,
            None => self.created_at < timestamp,
        }
    }

    /// Number of terminations at or after `timestamp`
    pub fn recent_terminations_since(&self, timestamp: DateTime<Utc>) -> usize {
        self.recent_terminations
            .iter()
            .filter(|at| **at >= timestamp)
            .count()
    }
}

/// Members per group plus whether a reconciliation plan is pending
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    #[serde(default)]
    pub members: BTreeMap<ServerGroup, Vec<MemberStatus>>,

    /// Number of pending plan actions
    #[serde(default)]
    pub plan_len: usize,
}

impl DeploymentStatus {
    pub fn member(&self, group: ServerGroup, id: &str) -> Option<&MemberStatus> {
        self.members.get(&group)?.iter().find(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_not_ready_since() {
        let now = Utc::now();
        let mut m = MemberStatus::new("PRMR-1", now - Duration::minutes(10));
        assert!(m.is_not_ready_since(now - Duration::minutes(5)), "never ready");

        m.ready = Some(ReadyCondition {
            ready: false,
            last_transition: now - Duration::minutes(1),
        });
        assert!(!m.is_not_ready_since(now - Duration::minutes(5)));

        m.ready = Some(ReadyCondition {
            ready: true,
            last_transition: now - Duration::minutes(30),
        });
        assert!(!m.is_not_ready_since(now));
        assert!(m.is_ready());
    }

    #[test]
    fn test_recent_terminations_since() {
        let now = Utc::now();
        let mut m = MemberStatus::new("PRMR-1", now - Duration::hours(1));
        m.recent_terminations = vec![
            now - Duration::minutes(30),
            now - Duration::minutes(8),
            now - Duration::minutes(2),
        ];
        assert_eq!(m.recent_terminations_since(now - Duration::minutes(10)), 2);
        assert_eq!(m.recent_terminations_since(now), 0);

        m.recent_terminations = vec![
            now - Duration::minutes(2),
            now - Duration::minutes(30),
            now - Duration::minutes(8),
        ];
        assert_eq!(m.recent_terminations_since(now - Duration::minutes(10)), 2);
    }

    #[test]
    fn test_transitional_phases() {
        assert!(MemberPhase::Upgrading.is_transitional());
        assert!(MemberPhase::RotateStart.is_transitional());
        assert!(!MemberPhase::Created.is_transitional());
        assert!(MemberPhase::Failed.is_failed());
    }
}
