//! Replica identifiers.
//!
//! Uses UUID v7 for time-ordered, globally unique identifiers.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a running replica.
///
/// Fixed for the lifetime of the replica. The derived `Ord` compares the
/// 16 UUID bytes lexicographically; this is the single total order used to
/// break last-writer-wins ties, so every replica must use it unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(Uuid);

impl ReplicaId {
    /// Creates a new replica ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a replica ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Parses a replica ID from a string.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }

    /// Returns true if this is the nil UUID, which is never a valid replica.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Parses and validates a configured replica ID.
    ///
    /// Rejects unparsable strings and the nil UUID.
    pub fn from_config(s: &str) -> crate::Result<Self> {
        let id = Self::parse(s.trim())
            .map_err(|e| Error::InvalidReplicaId(format!("{s:?}: {e}")))?;
        id.validate()
    }

    /// Returns `self` if it is usable as a replica identity.
    pub fn validate(self) -> crate::Result<Self> {
        if self.is_nil() {
            return Err(Error::InvalidReplicaId("nil UUID".to_string()));
        }
        Ok(self)
    }
}

impl Default for ReplicaId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReplicaId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}
