//! The contract every replicated value implements.

use crate::{CrdtResult, VectorClock};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The declared type of a replicated value.
///
/// Values of different kinds have no defined merge, so the kind is checked
/// before any typed access or remote delta is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrdtKind {
    LwwRegister,
    PnCounter,
    GCounter,
    OrSet,
    Flag,
    OrMap,
}

impl CrdtKind {
    /// Stable lowercase name, used in logs and encoded envelopes.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LwwRegister => "lww_register",
            Self::PnCounter => "pn_counter",
            Self::GCounter => "g_counter",
            Self::OrSet => "or_set",
            Self::Flag => "flag",
            Self::OrMap => "or_map",
        }
    }
}

impl fmt::Display for CrdtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state-based CRDT that also emits deltas of its local changes.
///
/// Implementations guarantee that joining full states or deltas is
/// commutative, associative and idempotent, so the replication layer may
/// deliver them out of order, more than once, or interleaved with full-state
/// resyncs.
///
/// `apply_delta` and `apply_full_state` validate their input before touching
/// local state: a rejected input leaves `self` unchanged.
pub trait ReplicatedData: Clone + fmt::Debug {
    /// The incremental form shipped between replicas.
    type Delta: Clone + fmt::Debug;

    /// The declared type of this value.
    fn kind(&self) -> CrdtKind;

    /// Checks that a full state is well formed.
    fn validate(&self) -> CrdtResult<()> {
        Ok(())
    }

    /// Checks that a delta is well formed and applicable to this value.
    fn validate_delta(&self, delta: &Self::Delta) -> CrdtResult<()>;

    /// Joins a remote delta into local state.
    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()>;

    /// Joins a remote full state into local state.
    fn apply_full_state(&mut self, state: &Self) -> CrdtResult<()>;

    /// Returns a snapshot of the full state for resync.
    fn current_full_state(&self) -> Self {
        self.clone()
    }

    /// Takes the delta accumulated since the last flush.
    fn take_delta(&mut self) -> Option<Self::Delta>;

    /// Returns true if local changes are waiting to be flushed.
    fn has_delta(&self) -> bool;

    /// The highest dot counter seen per replica, across every dot space in
    /// this value.
    ///
    /// Types that allocate no dots return an empty clock.
    fn causal_context(&self) -> VectorClock {
        VectorClock::new()
    }

    /// Drops removal metadata for dots made causally stable by `stable`,
    /// returning how many tombstones went away.
    ///
    /// Types without tombstones keep the default, which does nothing. See
    /// [`ORSet::compact`](crate::ORSet::compact) for what `stable` must
    /// guarantee.
    fn compact(&mut self, _stable: &VectorClock) -> usize {
        0
    }
}

/// A CRDT whose deltas are themselves partial states.
///
/// An OR-Map ships each nested write as the partial state built from the
/// nested delta, so only types with this property can be map values.
pub trait DeltaState: ReplicatedData {
    /// The smallest state that, joined into any state, has the same effect
    /// as applying `delta`.
    fn from_delta(delta: &Self::Delta) -> Self;
}
