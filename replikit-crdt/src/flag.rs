//! Enable-only flag.
//!
//! Starts disabled; once any replica enables it, it stays enabled
//! everywhere. Merge is logical OR.

use crate::{CrdtKind, CrdtResult, DeltaState, DeltaTracker, ReplicatedData};
use serde::{Deserialize, Serialize};

/// Delta for a flag: the flag was enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagDelta {
    pub enabled: bool,
}

/// A boolean that can only go from `false` to `true`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Flag {
    enabled: bool,
    #[serde(skip, default = "DeltaTracker::new")]
    delta: DeltaTracker<FlagDelta>,
}

impl Flag {
    /// Creates a disabled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once the flag has been enabled anywhere.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables the flag. Enabling an enabled flag records nothing.
    pub fn enable(&mut self) {
        if !self.enabled {
            self.enabled = true;
            self.delta.replace(FlagDelta { enabled: true });
        }
    }

    /// Merges another flag into this one.
    pub fn merge(&mut self, other: &Self) {
        self.enabled |= other.enabled;
    }
}

impl ReplicatedData for Flag {
    type Delta = FlagDelta;

    fn kind(&self) -> CrdtKind {
        CrdtKind::Flag
    }

    fn validate_delta(&self, _delta: &Self::Delta) -> CrdtResult<()> {
        Ok(())
    }

    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()> {
        self.enabled |= delta.enabled;
        Ok(())
    }

    fn apply_full_state(&mut self, state: &Self) -> CrdtResult<()> {
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

impl DeltaState for Flag {
    fn from_delta(delta: &FlagDelta) -> Self {
        Self {
            enabled: delta.enabled,
            delta: DeltaTracker::new(),
        }
    }
}

impl PartialEq for Flag {
    fn eq(&self, other: &Self) -> bool {
        self.enabled == other.enabled
    }
}

impl Eq for Flag {}
