//! Member failure detection
//!
//! A member is a failure candidate when it has not been ready for longer than
//! [`NOT_READY_GRACE_PERIOD`] or was terminated at least
//! [`RECENT_TERMINATION_THRESHOLD`] times within [`RECENT_TERMINATIONS_WINDOW`].
//! Candidates are only marked failed when their group's safety check passes;
//! otherwise the decision is deferred to the next pass.

use super::{DeploymentStatus, MemberPhase, MemberStatus, ServerGroup};
use crate::agency::{Cache, Health};
use crate::common::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

pub const NOT_READY_GRACE_PERIOD: Duration = Duration::from_secs(5 * 60);
pub const RECENT_TERMINATIONS_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const RECENT_TERMINATION_THRESHOLD: usize = 5;

/// What the failure check needs from the rest of the operator
#[async_trait]
pub trait ResilienceContext: Send + Sync {
    /// Health of the agency as seen by the last cache reload
    fn agency_health(&self) -> Option<Health>;

    /// Does the DBServer hold no shard data at all?
    async fn is_db_server_empty(&self, server_id: &str) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDecision {
    Acceptable,
    /// Not safe right now, with the reason
    Deferred(String),
}

impl FailureDecision {
    pub fn is_acceptable(&self) -> bool {
        matches!(self, FailureDecision::Acceptable)
    }
}

/// Is it currently safe to declare `member` of `group` failed?
pub async fn is_member_failure_acceptable(
    ctx: &dyn ResilienceContext,
    group: ServerGroup,
    member: &MemberStatus,
) -> Result<FailureDecision> {
    match group {
        ServerGroup::Agents => {
            let Some(health) = ctx.agency_health() else {
                return Ok(FailureDecision::Deferred(
                    "agency health is not present".into(),
                ));
            };

            // The remaining agents must carry the agency on their own
            match health.without_agent(&member.id).healthy() {
                Ok(()) => Ok(FailureDecision::Acceptable),
                Err(e) => Ok(FailureDecision::Deferred(e.to_string())),
            }
        }
        ServerGroup::DBServers => {
            if ctx.is_db_server_empty(&member.id).await? {
                Ok(FailureDecision::Acceptable)
            } else {
                Ok(FailureDecision::Deferred(format!(
                    "DBServer {} still holds shards",
                    member.id
                )))
            }
        }
        ServerGroup::Coordinators | ServerGroup::SyncMasters | ServerGroup::SyncWorkers => {
            Ok(FailureDecision::Acceptable)
        }
        ServerGroup::Single => Ok(FailureDecision::Deferred(
            "single server can not be marked as failed".into(),
        )),
    }
}

fn since(now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(period)
        .ok()
        .and_then(|d| now.checked_sub_signed(d))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Mark failed members in `status`; returns whether anything changed
pub async fn check_member_failure(
    ctx: &dyn ResilienceContext,
    status: &mut DeploymentStatus,
    now: DateTime<Utc>,
) -> bool {
    let has_plan = status.plan_len > 0;
    let not_ready_before = since(now, NOT_READY_GRACE_PERIOD);
    let terminations_after = since(now, RECENT_TERMINATIONS_WINDOW);
    let mut updated = false;

    for (group, members) in status.members.iter_mut() {
        for member in members.iter_mut() {
            match member.phase {
                MemberPhase::None | MemberPhase::Pending => continue,
                phase if phase.is_transitional() && !has_plan => {
                    tracing::error!(
                        "No plan but {} {} is in phase {:?}, marking as failed",
                        group,
                        member.id,
                        phase
                    );
                    member.phase = MemberPhase::Failed;
                    updated = true;
                }
                _ => {}
            }

            if member.is_ready() {
                continue;
            }

            if !member.phase.is_failed() && member.is_not_ready_since(not_ready_before) {
                updated |= mark_failed(ctx, *group, member, "is not ready for a long time").await;
            }

            if !member.phase.is_failed()
                && member.recent_terminations_since(terminations_after) >= RECENT_TERMINATION_THRESHOLD
            {
                updated |= mark_failed(
                    ctx,
                    *group,
                    member,
                    "has terminated too often in recent history",
                )
                .await;
            }
        }
    }

    updated
}

async fn mark_failed(
    ctx: &dyn ResilienceContext,
    group: ServerGroup,
    member: &mut MemberStatus,
    symptom: &str,
) -> bool {
    match is_member_failure_acceptable(ctx, group, member).await {
        Ok(FailureDecision::Acceptable) => {
            tracing::info!("{} {} {}, marking as failed", group, member.id, symptom);
            member.phase = MemberPhase::Failed;
            true
        }
        Ok(FailureDecision::Deferred(reason)) => {
            tracing::warn!(
                "{} {} {}, but it is not safe to mark it as failed: {}",
                group,
                member.id,
                symptom,
                reason
            );
            false
        }
        Err(e) => {
            tracing::warn!(
                "Failed to check whether {} {} may be marked as failed: {}",
                group,
                member.id,
                e
            );
            false
        }
    }
}

/// Context answering from an agency cache
pub struct CacheResilienceContext {
    cache: Arc<dyn Cache>,
}

impl CacheResilienceContext {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }
}

#[async_trait]
impl ResilienceContext for CacheResilienceContext {
    fn agency_health(&self) -> Option<Health> {
        self.cache.health()
    }

    async fn is_db_server_empty(&self, server_id: &str) -> Result<bool> {
        let state = self.cache.data().ok_or(Error::StateNotLoaded)?;
        let in_current = state.shards_by_db_servers().contains_key(server_id);
        let in_plan = state.plan_servers().contains(server_id);
        Ok(!in_current && !in_plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_since_saturates_at_minimum() {
        let now = Utc::now();
        assert_eq!(
            since(now, Duration::from_secs(300)),
            now - chrono::Duration::minutes(5)
        );
        assert_eq!(
            since(now, Duration::from_secs(10_000_000_000_000)),
            DateTime::<Utc>::MIN_UTC
        );
        assert_eq!(since(now, Duration::MAX), DateTime::<Utc>::MIN_UTC);
    }
}
