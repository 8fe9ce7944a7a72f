//! Observed-Remove Set (OR-Set / Add-Wins Set).
//!
//! A CRDT set that supports both add and remove operations. Concurrent add
//! and remove of the same element results in the element being present
//! (add-wins semantics).
//!
//! Each add allocates a fresh [`Dot`]. A remove tombstones exactly the dots
//! the remover has observed for that element, so a concurrent add whose dot
//! the remover never saw survives the merge.
//!
//! Use cases:
//! - Set-valued entries (`ORSetMap`)
//! - Key presence of an [`ORMap`](crate::ORMap)

use crate::{
    CrdtError, CrdtKind, CrdtResult, DeltaState, DeltaTracker, ReplicatedData, VectorClock,
};
use replikit_types::{Dot, ReplicaId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use tracing::debug;

/// Local OR-Set changes since the last flush.
///
/// A delta is itself a join-semilattice (union of adds, union of removes),
/// so it can be applied out of order or more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ORSetDelta<T>
where
    T: Eq + Hash,
{
    pub adds: HashMap<T, HashSet<Dot>>,
    pub removes: HashSet<Dot>,
}

impl<T> Default for ORSetDelta<T>
where
    T: Eq + Hash,
{
    fn default() -> Self {
        Self {
            adds: HashMap::new(),
            removes: HashSet::new(),
        }
    }
}

impl<T> ORSetDelta<T>
where
    T: Eq + Hash + Clone,
{
    /// Returns true if the delta carries no change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adds.values().all(HashSet::is_empty) && self.removes.is_empty()
    }

    /// Folds another delta into this one.
    pub fn join(&mut self, other: &Self) {
        for (element, dots) in &other.adds {
            self.adds
                .entry(element.clone())
                .or_default()
                .extend(dots.iter().copied());
        }
        self.removes.extend(other.removes.iter().copied());
    }

    /// Checks every dot in the delta is well formed.
    pub fn validate(&self) -> CrdtResult<()> {
        let mut all_dots = self.adds.values().flatten().chain(self.removes.iter());
        if let Some(bad) = all_dots.find(|dot| !dot.is_well_formed()) {
            return Err(CrdtError::MalformedDelta(format!("malformed dot {bad}")));
        }
        Ok(())
    }
}

/// An Observed-Remove Set (OR-Set).
///
/// Holds the active dots of every present element plus the tombstones of
/// every observed-and-removed dot. An element is present iff it has at least
/// one active dot that no tombstone covers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ORSet<T>
where
    T: Eq + Hash + Clone,
{
    /// Map from element to its active dots.
    elements: HashMap<T, HashSet<Dot>>,
    /// Every removed dot not yet compacted.
    tombstones: HashSet<Dot>,
    /// Highest counter observed per replica; allocates local dots.
    context: VectorClock,
    /// Dots at or below this clock have been compacted as causally stable.
    settled: VectorClock,
    #[serde(skip, default = "DeltaTracker::new")]
    delta: DeltaTracker<ORSetDelta<T>>,
}

impl<T> Default for ORSet<T>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ORSet<T>
where
    T: Eq + Hash + Clone,
{
    /// Creates a new empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            elements: HashMap::new(),
            tombstones: HashSet::new(),
            context: VectorClock::new(),
            settled: VectorClock::new(),
            delta: DeltaTracker::new(),
        }
    }

    /// Creates a set holding `elements`, all added by `replica_id`.
    pub fn from_elements(
        elements: impl IntoIterator<Item = T>,
        replica_id: ReplicaId,
    ) -> CrdtResult<Self> {
        let mut set = Self::new();
        for element in elements {
            set.add(element, replica_id)?;
        }
        Ok(set)
    }

    /// Returns true if the set contains the element.
    #[must_use]
    pub fn contains(&self, element: &T) -> bool {
        self.elements
            .get(element)
            .is_some_and(|dots| !dots.is_empty())
    }

    /// Returns the number of elements in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Returns an iterator over the elements in the set.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.keys()
    }

    /// Adds an element to the set.
    ///
    /// Returns the dot created for this add operation. The same element can
    /// be added multiple times, creating multiple dots. Fails without
    /// changing the set if `replica_id` is nil or has run out of counters.
    pub fn add(&mut self, element: T, replica_id: ReplicaId) -> CrdtResult<Dot> {
        let dot = self.context.next_dot(replica_id)?;
        self.elements.entry(element.clone()).or_default().insert(dot);
        self.delta.record(|d| {
            d.adds.entry(element).or_default().insert(dot);
        });
        Ok(dot)
    }

    /// Adds an element under a dot produced elsewhere (for replication).
    ///
    /// Returns false if the dot was already known, is tombstoned, or has
    /// been compacted away as removed.
    pub fn add_with_dot(&mut self, element: T, dot: Dot) -> bool {
        self.insert_dot(&element, dot)
    }

    /// Removes an element from the set.
    ///
    /// Tombstones every dot currently observed for the element. Concurrent
    /// adds with dots this replica has not seen still succeed.
    ///
    /// Returns the dots that were removed.
    pub fn remove(&mut self, element: &T) -> Vec<Dot> {
        let removed: Vec<Dot> = self
            .elements
            .remove(element)
            .map(|dots| dots.into_iter().collect())
            .unwrap_or_default();

        if !removed.is_empty() {
            let settled = &self.settled;
            self.tombstones
                .extend(removed.iter().filter(|dot| !settled.covers(dot)).copied());
            self.delta.record(|d| d.removes.extend(removed.iter().copied()));
        }
        removed
    }

    /// Removes every element currently in the set.
    ///
    /// Returns the number of elements removed.
    pub fn clear(&mut self) -> usize {
        let elements: Vec<T> = self.elements.keys().cloned().collect();
        for element in &elements {
            self.remove(element);
        }
        elements.len()
    }

    /// Tombstones specific dots (for replication).
    pub fn remove_dots(&mut self, dots: &[Dot]) {
        self.tombstones.extend(dots.iter().copied());
        self.strip_tombstoned();
    }

    /// Merges another OR-Set into this one.
    ///
    /// The resulting set contains all elements that have at least one dot
    /// that isn't tombstoned in either set.
    pub fn merge(&mut self, other: &Self) {
        self.context.merge(&other.context);
        self.settled.merge(&other.settled);
        // A settled dot the other side no longer holds is gone for good
        self.elements.retain(|element, dots| {
            let kept = other.elements.get(element);
            dots.retain(|dot| {
                !other.settled.covers(dot) || kept.is_some_and(|kept| kept.contains(dot))
            });
            !dots.is_empty()
        });
        self.join(&other.elements, &other.tombstones);
    }

    /// Creates a new set that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Drops tombstones made causally stable by `stable`.
    ///
    /// The caller guarantees every replica has observed every add and every
    /// removal of the dots at or below `stable`. After compaction, a dot at
    /// or below `stable` that is not already active is treated as removed.
    ///
    /// A [`context`](Self::context) only records the highest counter seen
    /// per replica. It is not a gap-free history: a replica that received a
    /// later delta before an earlier one covers dots it has never seen. The
    /// [`VectorClock::meet_all`] of every replica's context is therefore a
    /// valid `stable` clock only once every replica has merged the full
    /// state of every other with no delta in flight. Taken at any other
    /// time it can settle an add that some replica has yet to receive, and
    /// that add is then lost.
    ///
    /// `stable` is clipped to this set's own context first, so a clock
    /// gathered over several dot spaces never settles counters this set has
    /// not seen. Returns the number of tombstones dropped.
    pub fn compact(&mut self, stable: &VectorClock) -> usize {
        let mut stable = stable.clone();
        stable.meet(&self.context);
        let before = self.tombstones.len();
        self.tombstones.retain(|dot| !stable.covers(dot));
        self.settled.merge(&stable);
        let dropped = before - self.tombstones.len();
        debug!(dropped, remaining = self.tombstones.len(), "compacted OR-Set tombstones");
        dropped
    }

    /// Returns all active dots for an element.
    #[must_use]
    pub fn dots_for(&self, element: &T) -> Option<&HashSet<Dot>> {
        self.elements.get(element)
    }

    /// Returns all tombstones.
    #[must_use]
    pub fn tombstones(&self) -> &HashSet<Dot> {
        &self.tombstones
    }

    /// Returns the highest dot counter observed per replica.
    #[must_use]
    pub fn context(&self) -> &VectorClock {
        &self.context
    }

    /// Dots at or below this clock have been compacted.
    #[must_use]
    pub fn settled(&self) -> &VectorClock {
        &self.settled
    }

    /// Forgets settled dots of `element` without leaving tombstones.
    ///
    /// Dots above the settled watermark are kept: only a settled dot is
    /// guaranteed never to be added again.
    pub(crate) fn retire(&mut self, element: &T, dots: &[Dot]) {
        let settled = &self.settled;
        if let Some(active) = self.elements.get_mut(element) {
            active.retain(|dot| !(dots.contains(dot) && settled.covers(dot)));
            if active.is_empty() {
                self.elements.remove(element);
            }
        }
    }

    /// Returns true if `dot` was added for `element` and has since been
    /// removed here, either as a tombstone or below the settled watermark.
    #[must_use]
    pub fn is_removed(&self, element: &T, dot: &Dot) -> bool {
        let active = self.elements.get(element).is_some_and(|dots| dots.contains(dot));
        !active && (self.tombstones.contains(dot) || self.settled.covers(dot))
    }

    fn insert_dot(&mut self, element: &T, dot: Dot) -> bool {
        self.context.observe(&dot);
        if self.tombstones.contains(&dot) {
            return false;
        }
        let active = self.elements.get(element).is_some_and(|dots| dots.contains(&dot));
        if active || self.settled.covers(&dot) {
            return false;
        }
        self.elements.entry(element.clone()).or_default().insert(dot);
        true
    }

    fn join(&mut self, adds: &HashMap<T, HashSet<Dot>>, removes: &HashSet<Dot>) {
        for dot in removes {
            self.context.observe(dot);
        }
        self.tombstones.extend(removes.iter().copied());
        for (element, dots) in adds {
            for dot in dots {
                self.insert_dot(element, *dot);
            }
        }
        self.strip_tombstoned();
        // Settled dots can never come back, so their tombstones are redundant
        let settled = &self.settled;
        self.tombstones.retain(|dot| !settled.covers(dot));
    }

    fn strip_tombstoned(&mut self) {
        let tombstones = &self.tombstones;
        self.elements.retain(|_, dots| {
            dots.retain(|dot| !tombstones.contains(dot));
            !dots.is_empty()
        });
    }
}

impl<T> ReplicatedData for ORSet<T>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    type Delta = ORSetDelta<T>;

    fn kind(&self) -> CrdtKind {
        CrdtKind::OrSet
    }

    fn validate(&self) -> CrdtResult<()> {
        let mut all_dots = self.elements.values().flatten().chain(self.tombstones.iter());
        if let Some(bad) = all_dots.find(|dot| !dot.is_well_formed()) {
            return Err(CrdtError::MalformedState(format!("malformed dot {bad}")));
        }
        Ok(())
    }

    fn validate_delta(&self, delta: &Self::Delta) -> CrdtResult<()> {
        delta.validate()
    }

    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()> {
        delta.validate()?;
        self.join(&delta.adds, &delta.removes);
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

    fn causal_context(&self) -> VectorClock {
        self.context.clone()
    }

    fn compact(&mut self, stable: &VectorClock) -> usize {
        ORSet::compact(self, stable)
    }
}

impl<T> DeltaState for ORSet<T>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    fn from_delta(delta: &ORSetDelta<T>) -> Self {
        let mut set = Self::new();
        set.join(&delta.adds, &delta.removes);
        set
    }
}

impl<T> PartialEq for ORSet<T>
where
    T: Eq + Hash + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements && self.tombstones == other.tombstones
    }
}

impl<T> Eq for ORSet<T> where T: Eq + Hash + Clone {}
