//! Last-Writer-Wins Register (LWW-Register).
//!
//! A CRDT that stores a single value. Concurrent writes are resolved by
//! comparing `(timestamp, replica_id)` pairs — the greater pair wins.
//!
//! Use cases:
//! - Single-value map entries (`LWWRegisterMap`)
//! - Any field where "last write wins" semantics are acceptable

use crate::{CrdtError, CrdtKind, CrdtResult, DeltaState, DeltaTracker, ReplicatedData};
use replikit_types::{HybridTimestamp, ReplicaId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// How a local write chooses its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteClock {
    /// Hybrid clock tick strictly above the register's current timestamp.
    #[default]
    Default,
    /// Decreasing clock: the earliest write wins.
    Reverse,
    /// The caller's timestamp, used verbatim.
    Custom(HybridTimestamp),
    /// The caller's timestamp, bumped above the current one if it is not
    /// already greater.
    CustomAutoIncrement(HybridTimestamp),
}

impl WriteClock {
    /// Timestamp for a write that replaces a value stamped `current`.
    fn stamp_over(self, current: HybridTimestamp) -> HybridTimestamp {
        match self {
            Self::Default => current.tick(),
            Self::Reverse => HybridTimestamp::reversed_now(),
            Self::Custom(ts) => ts,
            Self::CustomAutoIncrement(ts) if ts > current => ts,
            Self::CustomAutoIncrement(_) => current.successor(),
        }
    }

    /// Timestamp for the first write of a fresh register.
    fn stamp_fresh(self) -> HybridTimestamp {
        match self {
            Self::Default => HybridTimestamp::now(),
            Self::Reverse => HybridTimestamp::reversed_now(),
            Self::Custom(ts) | Self::CustomAutoIncrement(ts) => ts,
        }
    }
}

/// A single register write, as shipped to other replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterDelta<T> {
    pub value: T,
    pub timestamp: HybridTimestamp,
    pub replica_id: ReplicaId,
}

/// A Last-Writer-Wins Register.
///
/// Stores a value of type `T` along with the `(timestamp, replica)` pair of
/// the write that produced it. When two replicas hold different values, the
/// one with the higher timestamp wins; equal timestamps fall back to the
/// higher replica ID, never to arrival order.
#[derive(Clone, Serialize, Deserialize)]
pub struct LWWRegister<T> {
    value: T,
    timestamp: HybridTimestamp,
    replica_id: ReplicaId,
    #[serde(skip, default = "DeltaTracker::new")]
    delta: DeltaTracker<RegisterDelta<T>>,
}

impl<T> LWWRegister<T> {
    /// Creates a register written locally at the current time.
    #[must_use]
    pub fn new(value: T, replica_id: ReplicaId) -> Self
    where
        T: Clone,
    {
        Self::with_clock(value, replica_id, WriteClock::Default)
    }

    /// Creates a register written locally with the given clock.
    #[must_use]
    pub fn with_clock(value: T, replica_id: ReplicaId, clock: WriteClock) -> Self
    where
        T: Clone,
    {
        let mut register = Self::with_timestamp(value, clock.stamp_fresh(), replica_id);
        register.record_write();
        register
    }

    /// Creates a register with explicit timestamp (for testing or replay).
    ///
    /// No delta is recorded.
    #[must_use]
    pub fn with_timestamp(value: T, timestamp: HybridTimestamp, replica_id: ReplicaId) -> Self {
        Self {
            value,
            timestamp,
            replica_id,
            delta: DeltaTracker::new(),
        }
    }

    /// Returns a reference to the current value.
    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the register, returning the current value.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Returns the timestamp of the last write.
    #[must_use]
    pub fn timestamp(&self) -> HybridTimestamp {
        self.timestamp
    }

    /// Returns the replica that performed the last write.
    #[must_use]
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Determines if an incoming write should win over the current value.
    fn should_update(&self, timestamp: HybridTimestamp, replica_id: ReplicaId) -> bool {
        match timestamp.cmp(&self.timestamp) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => replica_id > self.replica_id,
        }
    }
}

impl<T: Clone> LWWRegister<T> {
    /// Sets a new value, ticking the timestamp above the current one.
    ///
    /// A local write always replaces the local value.
    pub fn set(&mut self, value: T, replica_id: ReplicaId) {
        self.set_with_clock(value, replica_id, WriteClock::Default);
    }

    /// Sets a new value, stamping it with the given clock.
    pub fn set_with_clock(&mut self, value: T, replica_id: ReplicaId, clock: WriteClock) {
        self.timestamp = clock.stamp_over(self.timestamp);
        self.value = value;
        self.replica_id = replica_id;
        self.record_write();
    }

    /// Applies a write with an explicit timestamp (for replication).
    ///
    /// Only updates if `(timestamp, replica_id)` orders above the current
    /// pair. Returns true if the value was updated. No delta is recorded.
    pub fn set_with_timestamp(
        &mut self,
        value: T,
        timestamp: HybridTimestamp,
        replica_id: ReplicaId,
    ) -> bool {
        if self.should_update(timestamp, replica_id) {
            self.value = value;
            self.timestamp = timestamp;
            self.replica_id = replica_id;
            true
        } else {
            false
        }
    }

    /// Merges another register into this one.
    ///
    /// The value with the higher timestamp (or higher replica ID on tie) wins.
    /// This operation is:
    /// - Commutative: merge(a, b) == merge(b, a)
    /// - Associative: merge(merge(a, b), c) == merge(a, merge(b, c))
    /// - Idempotent: merge(a, a) == a
    pub fn merge(&mut self, other: &Self) {
        self.set_with_timestamp(other.value.clone(), other.timestamp, other.replica_id);
    }

    /// Creates a new register that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    fn record_write(&mut self) {
        self.delta.replace(RegisterDelta {
            value: self.value.clone(),
            timestamp: self.timestamp,
            replica_id: self.replica_id,
        });
    }
}

impl<T: Clone + fmt::Debug> ReplicatedData for LWWRegister<T> {
    type Delta = RegisterDelta<T>;

    fn kind(&self) -> CrdtKind {
        CrdtKind::LwwRegister
    }

    fn validate(&self) -> CrdtResult<()> {
        if self.replica_id.is_nil() {
            return Err(CrdtError::MalformedState("register written by nil replica".into()));
        }
        Ok(())
    }

    fn validate_delta(&self, delta: &Self::Delta) -> CrdtResult<()> {
        if delta.replica_id.is_nil() {
            return Err(CrdtError::MalformedDelta("register written by nil replica".into()));
        }
        Ok(())
    }

    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()> {
        self.validate_delta(delta)?;
        self.set_with_timestamp(delta.value.clone(), delta.timestamp, delta.replica_id);
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

impl<T: Clone + fmt::Debug> DeltaState for LWWRegister<T> {
    fn from_delta(delta: &RegisterDelta<T>) -> Self {
        Self::with_timestamp(delta.value.clone(), delta.timestamp, delta.replica_id)
    }
}

impl<T: fmt::Debug> fmt::Debug for LWWRegister<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LWWRegister")
            .field("value", &self.value)
            .field("timestamp", &self.timestamp)
            .field("replica_id", &self.replica_id)
            .finish()
    }
}

impl<T: PartialEq> PartialEq for LWWRegister<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
            && self.timestamp == other.timestamp
            && self.replica_id == other.replica_id
    }
}

impl<T: Eq> Eq for LWWRegister<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(n: u8) -> ReplicaId {
        ReplicaId::from_uuid(uuid::Uuid::from_bytes([
            n, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        ]))
    }

    #[test]
    fn local_write_records_delta() {
        let mut reg = LWWRegister::with_timestamp(1, HybridTimestamp::new(10, 0), replica(1));
        assert!(!reg.has_delta());
        reg.set(2, replica(1));
        let delta = reg.take_delta().unwrap();
        assert_eq!(delta.value, 2);
        assert_eq!(delta.timestamp, reg.timestamp());
        assert!(!reg.has_delta());
    }

    #[test]
    fn merge_records_nothing() {
        let mut a = LWWRegister::with_timestamp(1, HybridTimestamp::new(10, 0), replica(1));
        let b = LWWRegister::with_timestamp(2, HybridTimestamp::new(20, 0), replica(2));
        a.merge(&b);
        assert_eq!(*a.value(), 2);
        assert!(!a.has_delta());
    }

    #[test]
    fn equal_timestamp_prefers_higher_replica() {
        let ts = HybridTimestamp::new(50, 0);
        let low = LWWRegister::with_timestamp("low", ts, replica(1));
        let high = LWWRegister::with_timestamp("high", ts, replica(9));
        assert_eq!(*low.merged(&high).value(), "high");
        assert_eq!(*high.merged(&low).value(), "high");
    }

    #[test]
    fn custom_clock_is_used_verbatim() {
        let mut reg = LWWRegister::with_timestamp(1, HybridTimestamp::new(500, 0), replica(1));
        reg.set_with_clock(2, replica(1), WriteClock::Custom(HybridTimestamp::new(100, 0)));
        assert_eq!(*reg.value(), 2);
        assert_eq!(reg.timestamp(), HybridTimestamp::new(100, 0));
    }

    #[test]
    fn auto_increment_clock_stays_above_current() {
        let mut reg = LWWRegister::with_timestamp(1, HybridTimestamp::new(500, 3), replica(1));
        reg.set_with_clock(
            2,
            replica(1),
            WriteClock::CustomAutoIncrement(HybridTimestamp::new(100, 0)),
        );
        assert_eq!(reg.timestamp(), HybridTimestamp::new(500, 4));

        reg.set_with_clock(
            3,
            replica(1),
            WriteClock::CustomAutoIncrement(HybridTimestamp::new(900, 0)),
        );
        assert_eq!(reg.timestamp(), HybridTimestamp::new(900, 0));
    }

    #[test]
    fn reverse_clock_lets_first_writer_win() {
        let first = LWWRegister::with_clock("first", replica(1), WriteClock::Reverse);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = LWWRegister::with_clock("second", replica(2), WriteClock::Reverse);
        assert_eq!(*first.merged(&second).value(), "first");
        assert_eq!(*second.merged(&first).value(), "first");
    }

    #[test]
    fn nil_writer_delta_is_rejected() {
        let mut reg = LWWRegister::with_timestamp(1, HybridTimestamp::new(10, 0), replica(1));
        let bad = RegisterDelta {
            value: 99,
            timestamp: HybridTimestamp::new(1_000, 0),
            replica_id: ReplicaId::from_uuid(uuid::Uuid::nil()),
        };
        assert!(matches!(reg.apply_delta(&bad), Err(CrdtError::MalformedDelta(_))));
        assert_eq!(*reg.value(), 1);
    }
}
