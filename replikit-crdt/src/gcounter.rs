//! Grow-only Counter (G-Counter).
//!
//! Each replica maintains its own monotonically increasing count. The value
//! is the sum of all replica counts; merge takes the per-replica maximum.

use crate::{CrdtError, CrdtKind, CrdtResult, DeltaState, DeltaTracker, ReplicatedData};
use replikit_types::ReplicaId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Delta for G-Counter sync: the latest total of every replica that
/// incremented locally since the last flush.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounterDelta {
    pub counts: HashMap<ReplicaId, u64>,
}

impl GCounterDelta {
    pub(crate) fn validate(&self) -> CrdtResult<()> {
        if self.counts.keys().any(ReplicaId::is_nil) {
            return Err(CrdtError::MalformedDelta("counter entry for nil replica".into()));
        }
        Ok(())
    }
}

/// A grow-only counter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GCounter {
    counts: HashMap<ReplicaId, u64>,
    #[serde(skip, default = "DeltaTracker::new")]
    delta: DeltaTracker<GCounterDelta>,
}

impl GCounter {
    /// Creates a new counter with value 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by `amount` on behalf of `replica_id`.
    ///
    /// Returns the new total value.
    pub fn increment(&mut self, replica_id: ReplicaId, amount: u64) -> u64 {
        let entry = self.counts.entry(replica_id).or_insert(0);
        *entry = entry.saturating_add(amount);
        let total = *entry;
        self.delta.record(|d| {
            d.counts.insert(replica_id, total);
        });
        self.value()
    }

    /// Returns the current counter value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.counts.values().fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    /// Returns the count contributed by one replica.
    #[must_use]
    pub fn count_for(&self, replica_id: &ReplicaId) -> u64 {
        self.counts.get(replica_id).copied().unwrap_or(0)
    }

    /// Merges another counter into this one (takes per-replica max).
    pub fn merge(&mut self, other: &Self) {
        self.join_counts(&other.counts);
    }

    /// Returns a new counter that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    pub(crate) fn join_counts(&mut self, counts: &HashMap<ReplicaId, u64>) {
        for (&replica_id, &count) in counts {
            let entry = self.counts.entry(replica_id).or_insert(0);
            *entry = (*entry).max(count);
        }
    }
}

impl ReplicatedData for GCounter {
    type Delta = GCounterDelta;

    fn kind(&self) -> CrdtKind {
        CrdtKind::GCounter
    }

    fn validate(&self) -> CrdtResult<()> {
        if self.counts.keys().any(ReplicaId::is_nil) {
            return Err(CrdtError::MalformedState("counter entry for nil replica".into()));
        }
        Ok(())
    }

    fn validate_delta(&self, delta: &Self::Delta) -> CrdtResult<()> {
        delta.validate()
    }

    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()> {
        delta.validate()?;
        self.join_counts(&delta.counts);
        Ok(())
    }

    fn apply_full_state(&mut self, state: &Self) -> CrdtResult<()> {
        state.validate()?;
        self.merge(state);
        Ok(())
    }

    fn take_delta(&mut self) -> Option<Self::Delta> {
        self.delta.take()
    }

    fn has_delta(&self) -> bool {
        self.delta.is_dirty()
    }
}

impl DeltaState for GCounter {
    fn from_delta(delta: &GCounterDelta) -> Self {
        let mut counter = Self::new();
        counter.join_counts(&delta.counts);
        counter
    }
}

impl PartialEq for GCounter {
    fn eq(&self, other: &Self) -> bool {
        // Missing entries count as zero
        self.counts
            .keys()
            .chain(other.counts.keys())
            .all(|replica| self.count_for(replica) == other.count_for(replica))
    }
}

impl Eq for GCounter {}
