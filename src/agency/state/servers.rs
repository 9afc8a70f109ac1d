//! Shard replica lists
//!
//! Element 0 of a [`Servers`] list is the shard leader, the rest are followers
//! whose relative order carries no meaning.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Opaque DBServer identifier
pub type Server = String;

/// Ordered replica list of a shard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Servers(pub Vec<Server>);

// A `null` list decodes as empty
impl<'de> Deserialize<'de> for Servers {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let servers = Option::<Vec<Server>>::deserialize(deserializer)?;
        Ok(Self(servers.unwrap_or_default()))
    }
}

impl Servers {
    pub fn new<I, S>(servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Server>,
    {
        Self(servers.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Server> {
        self.0.iter()
    }

    pub fn contains(&self, server: &str) -> bool {
        self.0.iter().any(|s| s == server)
    }

    /// Shard leader
    pub fn leader(&self) -> Option<&Server> {
        self.0.first()
    }

    /// Shard followers
    pub fn followers(&self) -> &[Server] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// Servers of `self` that also appear in `other`, keeping the order of `self`
    pub fn join(&self, other: &Servers) -> Servers {
        Servers(
            self.0
                .iter()
                .filter(|s| other.contains(s))
                .cloned()
                .collect(),
        )
    }

    /// Same length, same leader, same follower set
    pub fn in_sync(&self, other: &Servers) -> bool {
        if self.len() != other.len() {
            return false;
        }
        if self.leader() != other.leader() {
            return false;
        }

        let ours: HashSet<&Server> = self.followers().iter().collect();
        let theirs: HashSet<&Server> = other.followers().iter().collect();
        ours == theirs
    }

    /// Same length and same members, ignoring leadership
    pub fn same_members(&self, other: &Servers) -> bool {
        self.len() == other.len() && other.iter().all(|s| self.contains(s))
    }
}

impl<'a> IntoIterator for &'a Servers {
    type Item = &'a Server;
    type IntoIter = std::slice::Iter<'a, Server>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Server> for Servers {
    fn from_iter<I: IntoIterator<Item = Server>>(iter: I) -> Self {
        Servers(iter.into_iter().collect())
    }
}

/// Set-like list of servers stored in the agency as a JSON array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerList(pub Vec<Server>);

impl ServerList {
    pub fn contains(&self, server: &str) -> bool {
        self.0.iter().any(|s| s == server)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_sync_ignores_follower_order() {
        let a = Servers::new(["A", "B", "C"]);
        let b = Servers::new(["A", "C", "B"]);
        assert!(a.in_sync(&b));
        assert!(b.in_sync(&a));
    }

    #[test]
    fn test_in_sync_requires_same_leader() {
        let a = Servers::new(["A", "B"]);
        let b = Servers::new(["B", "A"]);
        assert!(!a.in_sync(&b));
        assert!(a.same_members(&b));
    }

    #[test]
    fn test_in_sync_requires_same_length() {
        let a = Servers::new(["A", "B", "C"]);
        let b = Servers::new(["A", "B"]);
        assert!(!a.in_sync(&b));
        assert!(!b.in_sync(&a));
        assert!(Servers::default().in_sync(&Servers::default()));
    }

    #[test]
    fn test_in_sync_rejects_duplicate_padding() {
        let a = Servers::new(["A", "B", "B"]);
        let b = Servers::new(["A", "B", "C"]);
        assert!(!a.in_sync(&b));
    }

    #[test]
    fn test_join_keeps_own_order() {
        let current = Servers::new(["C", "B", "X"]);
        let plan = Servers::new(["A", "B", "C"]);
        assert_eq!(current.join(&plan), Servers::new(["C", "B"]));
    }

    #[test]
    fn test_decode_null_as_empty() {
        let servers: Servers = serde_json::from_str("null").unwrap();
        assert!(servers.is_empty());

        let servers: Servers = serde_json::from_str(r#"["A", "B"]"#).unwrap();
        assert_eq!(servers, Servers::new(["A", "B"]));
    }

    #[test]
    fn test_leader_and_followers() {
        let s = Servers::new(["A", "B", "C"]);
        assert_eq!(s.leader().map(String::as_str), Some("A"));
        assert_eq!(s.followers(), &["B".to_string(), "C".to_string()]);
        assert!(Servers::default().followers().is_empty());
    }
}
