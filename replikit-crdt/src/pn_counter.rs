//! Positive-Negative Counter CRDT.
//!
//! A PN-Counter supports both increment and decrement operations across
//! replicas. It is two grow-only counters (positive and negative) keyed by
//! replica ID; the value is `positive - negative`.
//!
//! Satisfies commutativity, associativity, and idempotency for merge.

use crate::{CrdtKind, CrdtResult, DeltaState, GCounter, GCounterDelta, ReplicatedData};
use replikit_types::ReplicaId;
use serde::{Deserialize, Serialize};

/// Delta for PN-Counter sync: touched entries of both halves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PNCounterDelta {
    pub positive: GCounterDelta,
    pub negative: GCounterDelta,
}

/// A Positive-Negative Counter CRDT.
///
/// Each replica tracks its own increments and decrements independently.
/// The counter value is the difference between all increments and all
/// decrements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PNCounter {
    positive: GCounter,
    negative: GCounter,
}

impl PNCounter {
    /// Creates a new counter with value 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter by `amount` for the given replica.
    ///
    /// Returns the new value.
    pub fn increment(&mut self, replica_id: ReplicaId, amount: u64) -> i64 {
        self.positive.increment(replica_id, amount);
        self.value()
    }

    /// Decrements the counter by `amount` for the given replica.
    ///
    /// Returns the new value.
    pub fn decrement(&mut self, replica_id: ReplicaId, amount: u64) -> i64 {
        self.negative.increment(replica_id, amount);
        self.value()
    }

    /// Adds a signed amount, routing it to the matching half.
    pub fn add(&mut self, replica_id: ReplicaId, amount: i64) -> i64 {
        if amount >= 0 {
            self.increment(replica_id, amount.unsigned_abs())
        } else {
            self.decrement(replica_id, amount.unsigned_abs())
        }
    }

    /// Returns the current counter value (may be negative).
    #[must_use]
    pub fn value(&self) -> i64 {
        let pos = i128::from(self.positive.value());
        let neg = i128::from(self.negative.value());
        (pos - neg).clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
    }

    /// Merges another PNCounter into this one (takes per-replica max).
    pub fn merge(&mut self, other: &Self) {
        self.positive.merge(&other.positive);
        self.negative.merge(&other.negative);
    }

    /// Returns a new counter that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }
}

impl ReplicatedData for PNCounter {
    type Delta = PNCounterDelta;

    fn kind(&self) -> CrdtKind {
        CrdtKind::PnCounter
    }

    fn validate(&self) -> CrdtResult<()> {
        self.positive.validate()?;
        self.negative.validate()
    }

    fn validate_delta(&self, delta: &Self::Delta) -> CrdtResult<()> {
        delta.positive.validate()?;
        delta.negative.validate()
    }

    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()> {
        self.validate_delta(delta)?;
        self.positive.join_counts(&delta.positive.counts);
        self.negative.join_counts(&delta.negative.counts);
        Ok(())
    }

    fn apply_full_state(&mut self, state: &Self) -> CrdtResult<()> {
        state.validate()?;
        self.merge(state);
        Ok(())
    }

    fn take_delta(&mut self) -> Option<Self::Delta> {
        let positive = self.positive.take_delta();
        let negative = self.negative.take_delta();
        if positive.is_none() && negative.is_none() {
            return None;
        }
        Some(PNCounterDelta {
            positive: positive.unwrap_or_default(),
            negative: negative.unwrap_or_default(),
        })
    }

    fn has_delta(&self) -> bool {
        self.positive.has_delta() || self.negative.has_delta()
    }
}

impl DeltaState for PNCounter {
    fn from_delta(delta: &PNCounterDelta) -> Self {
        Self {
            positive: GCounter::from_delta(&delta.positive),
            negative: GCounter::from_delta(&delta.negative),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(n: u8) -> ReplicaId {
        ReplicaId::from_uuid(uuid::Uuid::from_bytes([
            n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ]))
    }

    #[test]
    fn new_counter_is_zero() {
        assert_eq!(PNCounter::new().value(), 0);
    }

    #[test]
    fn increment_and_decrement() {
        let mut c = PNCounter::new();
        assert_eq!(c.increment(replica(1), 10), 10);
        assert_eq!(c.decrement(replica(1), 3), 7);
        assert_eq!(c.add(replica(2), -9), -2);
    }

    #[test]
    fn merge_is_commutative() {
        let mut a = PNCounter::new();
        a.increment(replica(1), 3);
        a.decrement(replica(2), 1);

        let mut b = PNCounter::new();
        b.increment(replica(2), 5);
        b.decrement(replica(1), 2);

        let ab = a.merged(&b);
        let ba = b.merged(&a);
        assert_eq!(ab, ba);
        assert_eq!(ab.value(), 5);
    }

    #[test]
    fn merge_takes_max_per_replica() {
        let mut a = PNCounter::new();
        a.increment(replica(1), 5);

        let mut b = PNCounter::new();
        b.increment(replica(1), 3);

        assert_eq!(a.merged(&b).value(), 5);
    }

    #[test]
    fn equality_checks_per_replica_not_just_value() {
        let mut a = PNCounter::new();
        a.increment(replica(1), 5);

        let mut b = PNCounter::new();
        b.increment(replica(2), 5);

        assert_eq!(a.value(), b.value());
        assert_ne!(a, b);
    }

    #[test]
    fn delta_covers_both_halves() {
        let mut c = PNCounter::new();
        c.increment(replica(1), 4);
        c.decrement(replica(1), 1);
        let delta = c.take_delta().unwrap();
        assert!(!c.has_delta());

        let mut remote = PNCounter::new();
        remote.apply_delta(&delta).unwrap();
        assert_eq!(remote.value(), 3);
        assert_eq!(remote, c);
    }

    #[test]
    fn empty_flush_is_none() {
        let mut c = PNCounter::new();
        assert!(c.take_delta().is_none());
    }

    #[test]
    fn serialization_roundtrip() {
        let mut c = PNCounter::new();
        c.increment(replica(1), 10);
        c.increment(replica(2), 5);
        c.decrement(replica(1), 3);

        let json = serde_json::to_string(&c).unwrap();
        let parsed: PNCounter = serde_json::from_str(&json).unwrap();

        assert_eq!(c, parsed);
        assert_eq!(parsed.value(), 12);
    }
}
