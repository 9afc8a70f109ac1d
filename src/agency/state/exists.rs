//! Presence markers for optional agency sub-trees
//!
//! Some keys only matter for "is it there and did it change", so they are kept
//! as a presence flag plus a BLAKE3 digest of the raw JSON bytes instead of a
//! decoded structure.

use crate::common::utils::content_hash;
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::value::RawValue;

/// Presence flag plus content hash of a raw sub-tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateExists {
    present: bool,
    hash: [u8; 32],
}

impl StateExists {
    /// Marker for a payload seen at the decoding boundary
    pub fn from_raw(raw: &[u8]) -> Self {
        Self {
            present: true,
            hash: content_hash(raw),
        }
    }

    pub fn exists(&self) -> bool {
        self.present
    }

    /// Digest of the raw payload; all zeroes when absent
    pub fn hash(&self) -> &[u8; 32] {
        &self.hash
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl<'de> Deserialize<'de> for StateExists {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        Ok(Self::from_raw(raw.get().as_bytes()))
    }
}

/// Raw ArangoSync sub-tree, decoded only on demand
#[derive(Debug, Clone, Default)]
pub struct ArangoSyncLazy {
    raw: Option<Box<RawValue>>,
    exists: StateExists,
}

impl ArangoSyncLazy {
    pub fn exists(&self) -> bool {
        self.exists.exists()
    }

    pub fn hash(&self) -> &StateExists {
        &self.exists
    }

    /// Decode the sub-tree into a caller-chosen shape
    pub fn decode<T: DeserializeOwned>(&self) -> crate::Result<Option<T>> {
        match &self.raw {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}

impl<'de> Deserialize<'de> for ArangoSyncLazy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        let exists = StateExists::from_raw(raw.get().as_bytes());
        Ok(Self {
            raw: Some(raw),
            exists,
        })
    }
}
