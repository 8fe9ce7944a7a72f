//! Per-instance tracking of local changes since the last flush.

/// Accumulates the delta produced by local mutations.
///
/// Only local operations record into the tracker; merges of remote state
/// never do. `take` hands the accumulated delta to the replication layer
/// and resets the tracker.
#[derive(Debug, Clone)]
pub struct DeltaTracker<D> {
    pending: Option<D>,
}

impl<D> Default for DeltaTracker<D> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<D> DeltaTracker<D> {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a change into the pending delta, starting from an empty one.
    pub fn record(&mut self, change: impl FnOnce(&mut D))
    where
        D: Default,
    {
        change(self.pending.get_or_insert_with(D::default));
    }

    /// Replaces the pending delta outright.
    ///
    /// Used by types whose latest local write subsumes every earlier one.
    pub fn replace(&mut self, delta: D) {
        self.pending = Some(delta);
    }

    /// Returns true if local changes are waiting to be flushed.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    /// Returns the pending delta without resetting the tracker.
    #[must_use]
    pub fn peek(&self) -> Option<&D> {
        self.pending.as_ref()
    }

    /// Takes the pending delta and resets the tracker.
    pub fn take(&mut self) -> Option<D> {
        self.pending.take()
    }

    /// Drops any pending delta.
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
