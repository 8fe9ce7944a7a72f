//! Dots: unique identifiers for single mutation events.

use crate::ReplicaId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(replica, counter)` pair naming one local mutation.
///
/// Each replica numbers its own events starting at 1, so a dot is unique
/// across the whole system. OR-Set style structures attach dots to added
/// elements and tombstone them on removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Dot {
    replica: ReplicaId,
    counter: u64,
}

impl Dot {
    /// Creates a dot from its components.
    #[must_use]
    pub const fn new(replica: ReplicaId, counter: u64) -> Self {
        Self { replica, counter }
    }

    /// The replica that produced this event.
    #[must_use]
    pub const fn replica(&self) -> ReplicaId {
        self.replica
    }

    /// The per-replica sequence number.
    #[must_use]
    pub const fn counter(&self) -> u64 {
        self.counter
    }

    /// Returns true if this dot could have been produced by a replica.
    ///
    /// Counters start at 1 and stop short of `u64::MAX`, so a replica
    /// holding any well-formed dot can still allocate the next one. The nil
    /// replica never mutates anything.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.counter > 0 && self.counter < u64::MAX && !self.replica.is_nil()
    }
}

impl fmt::Display for Dot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.replica, self.counter)
    }
}
