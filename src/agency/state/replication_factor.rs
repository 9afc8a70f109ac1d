//! Replication factor with its two sentinel values
//!
//! The agency stores either a JSON integer or the string `"satellite"`. Anything
//! else decodes to [`ReplicationFactor::Unknown`] instead of failing the whole
//! state tree.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

const SATELLITE: &str = "satellite";
const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplicationFactor {
    /// Literal number of replicas
    Count(u32),
    /// Replicated on every DBServer of the cluster
    Satellite,
    /// Unparseable value
    Unknown,
}

impl ReplicationFactor {
    pub fn is_unknown(&self) -> bool {
        matches!(self, ReplicationFactor::Unknown)
    }

    pub fn is_satellite(&self) -> bool {
        matches!(self, ReplicationFactor::Satellite)
    }

    /// Literal count, `None` for sentinels
    pub fn count(&self) -> Option<u32> {
        match self {
            ReplicationFactor::Count(n) => Some(*n),
            _ => None,
        }
    }

    fn from_str_value(s: &str) -> Self {
        if s == SATELLITE {
            return ReplicationFactor::Satellite;
        }
        match s.trim().parse::<u32>() {
            Ok(n) => ReplicationFactor::Count(n),
            Err(_) => ReplicationFactor::Unknown,
        }
    }
}

impl fmt::Display for ReplicationFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplicationFactor::Count(n) => write!(f, "{}", n),
            ReplicationFactor::Satellite => write!(f, "{}", SATELLITE),
            ReplicationFactor::Unknown => write!(f, "{}", UNKNOWN),
        }
    }
}

impl Serialize for ReplicationFactor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ReplicationFactor::Count(n) => serializer.serialize_u32(*n),
            ReplicationFactor::Satellite => serializer.serialize_str(SATELLITE),
            ReplicationFactor::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

struct ReplicationFactorVisitor;

impl<'de> Visitor<'de> for ReplicationFactorVisitor {
    type Value = ReplicationFactor;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an integer or a string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(u32::try_from(v)
            .map(ReplicationFactor::Count)
            .unwrap_or(ReplicationFactor::Unknown))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(u32::try_from(v)
            .map(ReplicationFactor::Count)
            .unwrap_or(ReplicationFactor::Unknown))
    }

    fn visit_f64<E: de::Error>(self, _v: f64) -> Result<Self::Value, E> {
        Ok(ReplicationFactor::Unknown)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(ReplicationFactor::from_str_value(v))
    }

    fn visit_bool<E: de::Error>(self, _v: bool) -> Result<Self::Value, E> {
        Ok(ReplicationFactor::Unknown)
    }
}

impl<'de> Deserialize<'de> for ReplicationFactor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ReplicationFactorVisitor)
    }
}
