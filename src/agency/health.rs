//! Agency health derived from one round of agent probes
//!
//! A [`Health`] value is recomputed on every reload and never persisted.
//! Quorum is judged against the configured agency size, not against the
//! number of agents that happened to answer.

use crate::common::{Error, Result};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Health {
    leader_id: String,
    agency_size: usize,
    /// Agent ID -> commit index
    commit_indexes: BTreeMap<String, u64>,
    /// Agent ID -> leader it claims
    leaders: BTreeMap<String, String>,
    /// Claimed leader -> number of agents claiming it
    election: BTreeMap<String, usize>,
}

impl Health {
    pub fn new(agency_size: usize) -> Self {
        Self {
            agency_size,
            ..Default::default()
        }
    }

    /// Record one agent's probe result
    pub fn record(&mut self, agent_id: &str, leader_id: &str, commit_index: u64) {
        self.commit_indexes.insert(agent_id.to_string(), commit_index);
        if let Some(previous) = self
            .leaders
            .insert(agent_id.to_string(), leader_id.to_string())
        {
            self.remove_vote(&previous);
        }
        *self.election.entry(leader_id.to_string()).or_default() += 1;
        self.elect();
    }

    fn remove_vote(&mut self, leader_id: &str) {
        if let Some(votes) = self.election.get_mut(leader_id) {
            *votes -= 1;
            if *votes == 0 {
                self.election.remove(leader_id);
            }
        }
    }

    fn elect(&mut self) {
        self.leader_id = if self.election.len() == 1 {
            self.election.keys().next().cloned().unwrap_or_default()
        } else {
            String::new()
        };
    }

    /// Health of the remaining agents once `agent_id` is taken out.
    /// The configured agency size stays the same.
    pub fn without_agent(&self, agent_id: &str) -> Health {
        let mut health = self.clone();
        health.commit_indexes.remove(agent_id);
        if let Some(previous) = health.leaders.remove(agent_id) {
            health.remove_vote(&previous);
        }
        health.elect();
        health
    }

    /// Leader elected by the respondents, empty when there is none
    pub fn leader_id(&self) -> &str {
        &self.leader_id
    }

    pub fn agency_size(&self) -> usize {
        self.agency_size
    }

    pub fn commit_index(&self, agent_id: &str) -> Option<u64> {
        self.commit_indexes.get(agent_id).copied()
    }

    pub fn commit_indexes(&self) -> &BTreeMap<String, u64> {
        &self.commit_indexes
    }

    /// Claimed leader -> votes
    pub fn election(&self) -> &BTreeMap<String, usize> {
        &self.election
    }

    pub fn claimed_leader(&self, agent_id: &str) -> Option<&str> {
        self.leaders.get(agent_id).map(String::as_str)
    }

    /// Exactly one claimed leader, backed by more than half of the agency
    pub fn serving(&self) -> Result<()> {
        if self.agency_size == 0 {
            return Err(Error::QuorumLost("empty agents list".into()));
        }

        match self.election.len() {
            0 => return Err(Error::QuorumLost("no agent answered".into())),
            1 => {}
            n => {
                return Err(Error::QuorumLost(format!(
                    "multiple leaders claimed ({}): {:?}",
                    n, self.election
                )))
            }
        }

        if self.leader_id.is_empty() {
            return Err(Error::QuorumLost("no leader elected".into()));
        }

        let votes = self.election.get(&self.leader_id).copied().unwrap_or(0);
        if votes <= self.agency_size / 2 {
            return Err(Error::QuorumLost(format!(
                "leader {} has {} of {} votes",
                self.leader_id, votes, self.agency_size
            )));
        }

        Ok(())
    }

    /// Serving, and every respondent's commit index equals the leader's non-zero one
    pub fn healthy(&self) -> Result<()> {
        self.serving()?;

        let leader_index = self.commit_index(&self.leader_id).unwrap_or(0);
        if leader_index == 0 {
            return Err(Error::NotHealthy(format!(
                "commit index of leader {} is not set",
                self.leader_id
            )));
        }

        for (agent, index) in &self.commit_indexes {
            if *index != leader_index {
                return Err(Error::NotHealthy(format!(
                    "commit index on {} is {}, leader is at {}",
                    agent, index, leader_index
                )));
            }
        }

        Ok(())
    }

    pub fn is_serving(&self) -> bool {
        self.serving().is_ok()
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn health(size: usize, probes: &[(&str, &str, u64)]) -> Health {
        let mut h = Health::new(size);
        for (agent, leader, index) in probes {
            h.record(agent, leader, *index);
        }
        h
    }

    #[test]
    fn test_single_agent_healthy() {
        let h = health(1, &[("A", "A", 5)]);
        assert!(h.is_healthy());
        assert_eq!(h.leader_id(), "A");
    }

    #[test]
    fn test_multiple_leaders_not_serving() {
        let h = health(3, &[("A", "A", 5), ("B", "A", 5), ("C", "B", 5)]);
        assert!(!h.is_serving());
        assert!(!h.is_healthy());
        assert_eq!(h.leader_id(), "");
    }

    #[test]
    fn test_quorum_counts_configured_size() {
        // Two respondents agree, but five agents are configured
        let h = health(5, &[("A", "A", 5), ("B", "A", 5)]);
        assert!(!h.is_serving());

        let h = health(5, &[("A", "A", 5), ("B", "A", 5), ("C", "A", 5)]);
        assert!(h.is_serving());

        let h = health(4, &[("A", "A", 5), ("B", "A", 5)]);
        assert!(!h.is_serving());
    }

    #[test]
    fn test_empty_agency() {
        assert!(!Health::new(0).is_serving());
        assert!(!Health::new(3).is_serving());
    }

    #[test]
    fn test_empty_leader_not_serving() {
        let h = health(3, &[("A", "", 5), ("B", "", 5)]);
        assert!(!h.is_serving());
    }

    #[test]
    fn test_lagging_follower_degrades() {
        let h = health(3, &[("A", "A", 9), ("B", "A", 9), ("C", "A", 7)]);
        assert!(h.is_serving());
        assert!(matches!(h.healthy(), Err(Error::NotHealthy(_))));
    }

    #[test]
    fn test_zero_commit_index_not_healthy() {
        let h = health(1, &[("A", "A", 0)]);
        assert!(h.is_serving());
        assert!(!h.is_healthy());
    }

    #[test]
    fn test_leader_missing_from_respondents() {
        let h = health(3, &[("B", "A", 4), ("C", "A", 4)]);
        assert!(h.is_serving());
        assert!(!h.is_healthy(), "leader commit index unknown");
    }

    #[test]
    fn test_without_agent() {
        let h = health(3, &[("A", "A", 5), ("B", "A", 5), ("C", "A", 3)]);
        assert!(!h.is_healthy());

        let remaining = h.without_agent("C");
        assert!(remaining.is_healthy());
        assert_eq!(remaining.agency_size(), 3);

        let remaining = h.without_agent("B").without_agent("C");
        assert!(!remaining.is_serving());
    }

    #[test]
    fn test_record_replaces_previous_vote() {
        let mut h = health(3, &[("A", "B", 1), ("B", "B", 1)]);
        h.record("A", "A", 1);
        assert_eq!(h.election().get("B"), Some(&1));
        assert_eq!(h.election().get("A"), Some(&1));
    }
}
