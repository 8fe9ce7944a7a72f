//! Vector Clock for causality tracking.
//!
//! A vector clock maps each replica to the highest event counter seen from
//! it. In this crate it serves two purposes:
//! - Dot allocation: an OR-Set's clock hands out the next counter for the
//!   local replica
//! - Causal stability: the pointwise meet of every replica's clock bounds the
//!   dots all replicas have observed, which is what tombstone compaction needs

use crate::error::{CrdtError, CrdtResult};
use replikit_types::{Dot, ReplicaId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A Vector Clock for tracking causality across replicas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorClock {
    /// Map from replica ID to logical time at that replica.
    clocks: HashMap<ReplicaId, u64>,
}

impl VectorClock {
    /// Creates a new empty vector clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the logical time for a replica (0 if not present).
    #[must_use]
    pub fn get(&self, replica_id: &ReplicaId) -> u64 {
        self.clocks.get(replica_id).copied().unwrap_or(0)
    }

    /// Returns all replicas and their times.
    pub fn replicas(&self) -> impl Iterator<Item = (&ReplicaId, &u64)> {
        self.clocks.iter()
    }

    /// Returns the number of replicas in the clock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clocks.len()
    }

    /// Returns true if the clock has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clocks.is_empty()
    }

    /// Increments the clock for a replica and returns the new time.
    ///
    /// `u64::MAX` is never handed out, so every allocated counter makes a
    /// well-formed dot. The clock is left unchanged on error.
    pub fn increment(&mut self, replica_id: ReplicaId) -> CrdtResult<u64> {
        let next = self
            .get(&replica_id)
            .checked_add(1)
            .filter(|time| *time < u64::MAX)
            .ok_or(CrdtError::DotsExhausted(replica_id))?;
        self.clocks.insert(replica_id, next);
        Ok(next)
    }

    /// Allocates the next dot for `replica_id`.
    pub fn next_dot(&mut self, replica_id: ReplicaId) -> CrdtResult<Dot> {
        if replica_id.is_nil() {
            return Err(CrdtError::InvalidReplicaId(
                "the nil replica cannot allocate dots".into(),
            ));
        }
        Ok(Dot::new(replica_id, self.increment(replica_id)?))
    }

    /// Updates the clock for a replica to a specific time.
    ///
    /// Only updates if the new time is greater than the current time.
    pub fn update(&mut self, replica_id: ReplicaId, time: u64) {
        let entry = self.clocks.entry(replica_id).or_insert(0);
        if time > *entry {
            *entry = time;
        }
    }

    /// Records that `dot` has been seen.
    pub fn observe(&mut self, dot: &Dot) {
        self.update(dot.replica(), dot.counter());
    }

    /// Returns true if `dot` is at or below this clock.
    #[must_use]
    pub fn covers(&self, dot: &Dot) -> bool {
        dot.counter() <= self.get(&dot.replica())
    }

    /// Merges another vector clock into this one (pointwise max).
    ///
    /// This operation is commutative, associative, and idempotent.
    pub fn merge(&mut self, other: &Self) {
        for (&replica_id, &time) in &other.clocks {
            self.update(replica_id, time);
        }
    }

    /// Creates a new clock that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Pointwise minimum of this clock and another.
    ///
    /// A replica missing from either side counts as 0 and is dropped.
    pub fn meet(&mut self, other: &Self) {
        self.clocks.retain(|replica_id, time| {
            *time = (*time).min(other.get(replica_id));
            *time > 0
        });
    }

    /// The pointwise meet of every clock, or an empty clock if there are none.
    ///
    /// Given every replica's observed clock, the result bounds the events all
    /// of them have seen.
    #[must_use]
    pub fn meet_all<'a>(clocks: impl IntoIterator<Item = &'a VectorClock>) -> Self {
        let mut iter = clocks.into_iter();
        let Some(first) = iter.next() else {
            return Self::new();
        };
        let mut result = first.clone();
        for clock in iter {
            result.meet(clock);
        }
        result
    }
}

impl PartialEq for VectorClock {
    fn eq(&self, other: &Self) -> bool {
        // A missing replica counts as 0
        self.clocks
            .keys()
            .chain(other.clocks.keys())
            .all(|replica_id| self.get(replica_id) == other.get(replica_id))
    }
}

impl Eq for VectorClock {}
