//! Observed-Remove Map (OR-Map).
//!
//! A map whose key presence is an [`ORSet`] and whose values are arbitrary
//! nested CRDTs. Every presence dot of a key carries the nested state
//! written under it as its *contribution*; the visible value of a key is
//! the join of the contributions of its active dots.
//!
//! - A write joins its nested change into the dot its replica added for the
//!   key since the last flush. No other replica can have observed that dot
//!   yet. If there is none, the write adds a fresh dot carrying only the
//!   change. Writes never tombstone anything.
//! - A remove tombstones every observed dot of the key and discards their
//!   contributions.
//! - A dot the remover had not observed survives together with its
//!   contribution (add-wins), so a write concurrent with a remove is kept.
//! - [`ORMap::compact`] folds settled contributions into one dot, which
//!   keeps the number of presence dots bounded.

use crate::{
    CrdtError, CrdtKind, CrdtResult, DeltaState, DeltaTracker, ORSet, ORSetDelta, ReplicatedData,
    VectorClock,
};
use replikit_types::{Dot, ReplicaId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use tracing::{debug, warn};

/// Contributions to a key, one per dot, sorted by dot.
type Contributions<V> = Vec<(Dot, V)>;

/// Local OR-Map changes since the last flush.
///
/// `keys` carries the presence dots added and tombstoned. `values` carries,
/// per dot, the join of the nested changes written under it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ORMapDelta<K, V>
where
    K: Eq + Hash,
{
    pub keys: ORSetDelta<K>,
    pub values: HashMap<K, Contributions<V>>,
}

impl<K, V> Default for ORMapDelta<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            keys: ORSetDelta::default(),
            values: HashMap::new(),
        }
    }
}

/// An Observed-Remove Map holding nested CRDT values.
#[derive(Clone)]
pub struct ORMap<K, V>
where
    K: Eq + Hash + Clone,
{
    keys: ORSet<K>,
    /// Contributions of active dots.
    entries: HashMap<K, Contributions<V>>,
    /// Joined view of the active contributions, one value per present key.
    values: HashMap<K, V>,
    pending: DeltaTracker<HashMap<K, Contributions<V>>>,
}

impl<K, V> Default for ORMap<K, V>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            keys: ORSet::new(),
            entries: HashMap::new(),
            values: HashMap::new(),
            pending: DeltaTracker::new(),
        }
    }
}

impl<K, V> ORMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: DeltaState,
{
    /// Creates a new empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn from_parts(keys: ORSet<K>, entries: HashMap<K, Contributions<V>>) -> Self {
        let mut map = Self {
            keys,
            entries: HashMap::with_capacity(entries.len()),
            values: HashMap::new(),
            pending: DeltaTracker::new(),
        };
        for (key, contributions) in &entries {
            let local = map.entries.entry(key.clone()).or_default();
            for (dot, value) in contributions {
                join_into(local, *dot, value);
            }
        }
        let touched = map.entries.keys().cloned().collect();
        map.reconcile(touched);
        map
    }

    /// Returns the number of present keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no key is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns true if the key is present.
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.values.contains_key(key)
    }

    /// Returns the converged nested value for a key.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.values.get(key)
    }

    /// Returns an iterator over the present keys.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.values.keys()
    }

    /// Returns an iterator over present keys and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.values.iter()
    }

    /// Returns the key-presence set.
    #[must_use]
    pub fn key_set(&self) -> &ORSet<K> {
        &self.keys
    }

    /// Returns the nested value for `key`, creating it with `factory` if the
    /// key is absent.
    ///
    /// Creating adds a presence dot for `replica_id` whose contribution is
    /// the whole new value. The factory is only called when no value exists.
    pub fn get_or_create(
        &mut self,
        key: K,
        replica_id: ReplicaId,
        factory: impl FnOnce() -> V,
    ) -> CrdtResult<&V> {
        if !self.values.contains_key(&key) {
            self.create(key.clone(), replica_id, factory())?;
        }
        self.values
            .get(&key)
            .ok_or_else(|| CrdtError::KeyNotFound(format!("{key:?}")))
    }

    /// Applies a fallible mutation to an existing nested value.
    ///
    /// The mutation runs on a copy of the converged value. If it returns
    /// `Ok`, the nested delta it recorded is joined into `replica_id`'s
    /// unflushed contribution; a mutation that records no delta changes
    /// nothing.
    pub fn try_update<R>(
        &mut self,
        key: &K,
        replica_id: ReplicaId,
        mutation: impl FnOnce(&mut V) -> CrdtResult<R>,
    ) -> CrdtResult<R> {
        let mut value = self
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| CrdtError::KeyNotFound(format!("{key:?}")))?;
        let result = mutation(&mut value)?;
        if let Some(delta) = value.take_delta() {
            self.amend(key, replica_id, V::from_delta(&delta), value)?;
        }
        Ok(result)
    }

    /// Applies a mutation to an existing nested value.
    ///
    /// Fails with [`CrdtError::KeyNotFound`] if the key is absent.
    pub fn update<R>(
        &mut self,
        key: &K,
        replica_id: ReplicaId,
        mutation: impl FnOnce(&mut V) -> R,
    ) -> CrdtResult<R> {
        self.try_update(key, replica_id, |value| Ok(mutation(value)))
    }

    /// Applies a fallible mutation, creating the value with `factory` first
    /// if the key is absent. Nothing is created if the mutation fails.
    pub fn try_update_or_create<R>(
        &mut self,
        key: K,
        replica_id: ReplicaId,
        factory: impl FnOnce() -> V,
        mutation: impl FnOnce(&mut V) -> CrdtResult<R>,
    ) -> CrdtResult<R> {
        if self.values.contains_key(&key) {
            return self.try_update(&key, replica_id, mutation);
        }
        let mut value = factory();
        let result = mutation(&mut value)?;
        self.create(key, replica_id, value)?;
        Ok(result)
    }

    /// Applies a mutation, creating the value with `factory` first if the
    /// key is absent.
    pub fn update_or_create<R>(
        &mut self,
        key: K,
        replica_id: ReplicaId,
        factory: impl FnOnce() -> V,
        mutation: impl FnOnce(&mut V) -> R,
    ) -> CrdtResult<R> {
        self.try_update_or_create(key, replica_id, factory, |value| Ok(mutation(value)))
    }

    /// Removes a key, discarding its nested value.
    ///
    /// Returns the value that was visible locally.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let (owned_key, value) = self.values.remove_entry(key)?;
        self.keys.remove(&owned_key);
        self.prune(&owned_key);
        Some(value)
    }

    /// Removes every present key. Returns the number removed.
    pub fn clear(&mut self) -> usize {
        let keys: Vec<K> = self.values.keys().cloned().collect();
        for key in &keys {
            self.remove(key);
        }
        keys.len()
    }

    /// Merges another map into this one.
    ///
    /// Key presence merges by OR-Set rules; contributions are joined per
    /// dot and every touched key's value is re-joined.
    pub fn merge(&mut self, other: &Self) {
        self.keys.merge(&other.keys);
        let touched = self.adopt(&other.entries);
        self.reconcile(touched);
    }

    /// Creates a new map that is the merge of this and another.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut result = self.clone();
        result.merge(other);
        result
    }

    /// Drops tombstones made causally stable by `stable`, both in key
    /// presence and inside every present value.
    ///
    /// Settled contributions of a key are first folded into the highest
    /// settled dot and the other settled dots are retired without a
    /// tombstone. A key with several contributions left has each of them
    /// raised to the joined value, so dropping a nested tombstone in one
    /// contribution cannot let another bring the removed element back. See
    /// [`ORSet::compact`] for the caller's obligations.
    pub fn compact(&mut self, stable: &VectorClock) -> usize {
        let mut dropped = self.keys.compact(stable);
        let keys = &self.keys;
        let mut retired = Vec::new();
        for (key, contributions) in &mut self.entries {
            let (Some(joined), Some(active)) = (self.values.get(key), keys.dots_for(key)) else {
                continue;
            };
            let folded = fold_settled(contributions, active, keys.settled());
            let live: Vec<usize> = (0..contributions.len())
                .filter(|&i| {
                    let dot = &contributions[i].0;
                    active.contains(dot) && !folded.contains(dot)
                })
                .collect();
            for &index in &live {
                let (dot, value) = &mut contributions[index];
                if live.len() > 1 {
                    if let Err(err) = value.apply_full_state(joined) {
                        warn!(%dot, error = %err, "contribution of another kind left as is");
                    }
                }
                dropped += value.compact(stable);
            }
            if !folded.is_empty() {
                retired.push((key.clone(), folded));
            }
        }
        for (key, folded) in retired {
            dropped += folded.len();
            self.keys.retire(&key, &folded);
        }
        let present = self.entries.keys().cloned().collect();
        self.reconcile(present);
        debug!(dropped, keys = self.values.len(), "compacted map tombstones");
        dropped
    }

    /// The dot `replica_id` added for `key` since the last flush, if it is
    /// still active.
    fn unflushed_dot(&self, key: &K, replica_id: ReplicaId) -> Option<Dot> {
        let active = self.keys.dots_for(key)?;
        self.pending
            .peek()?
            .get(key)?
            .iter()
            .map(|(dot, _)| *dot)
            .filter(|dot| dot.replica() == replica_id && active.contains(dot))
            .max()
    }

    /// Adds a presence dot for an absent key carrying the whole of `value`.
    fn create(&mut self, key: K, replica_id: ReplicaId, mut value: V) -> CrdtResult<()> {
        // Nested deltas are subsumed by the contribution shipped below
        value.take_delta();
        value.validate()?;
        let dot = self.keys.add(key.clone(), replica_id)?;
        join_into(self.entries.entry(key.clone()).or_default(), dot, &value);
        self.pending.record(|d| join_into(d.entry(key.clone()).or_default(), dot, &value));
        self.values.insert(key, value);
        Ok(())
    }

    /// Joins a local change into `replica_id`'s unflushed contribution,
    /// adding a fresh dot for it if there is none. `updated` is the value
    /// the change was made on, and becomes the visible value.
    fn amend(&mut self, key: &K, replica_id: ReplicaId, change: V, updated: V) -> CrdtResult<()> {
        change.validate()?;
        let dot = match self.unflushed_dot(key, replica_id) {
            Some(dot) => dot,
            None => self.keys.add(key.clone(), replica_id)?,
        };
        join_into(self.entries.entry(key.clone()).or_default(), dot, &change);
        self.pending.record(|d| join_into(d.entry(key.clone()).or_default(), dot, &change));
        self.values.insert(key.clone(), updated);
        Ok(())
    }

    /// Joins incoming contributions whose dots are active here.
    fn adopt<'a>(
        &mut self,
        incoming: impl IntoIterator<Item = (&'a K, &'a Contributions<V>)>,
    ) -> HashSet<K>
    where
        K: 'a,
        V: 'a,
    {
        let mut touched = HashSet::new();
        for (key, contributions) in incoming {
            for (dot, value) in contributions {
                if !is_active(&self.keys, key, dot) {
                    continue;
                }
                join_into(self.entries.entry(key.clone()).or_default(), *dot, value);
                touched.insert(key.clone());
            }
        }
        touched
    }

    /// Drops contributions of inactive dots and re-joins changed keys.
    fn reconcile(&mut self, mut touched: HashSet<K>) {
        let keys = &self.keys;
        self.entries.retain(|key, contributions| {
            let before = contributions.len();
            contributions.retain(|(dot, _)| is_active(keys, key, dot));
            if contributions.len() != before {
                touched.insert(key.clone());
            }
            !contributions.is_empty()
        });
        for key in touched {
            self.refresh(key);
        }
    }

    /// Drops the contributions of `key` whose dots are no longer active.
    fn prune(&mut self, key: &K) {
        let keys = &self.keys;
        if let Some(contributions) = self.entries.get_mut::<K>(key) {
            contributions.retain(|(dot, _)| is_active(keys, key, dot));
            if contributions.is_empty() {
                self.entries.remove::<K>(key);
            }
        }
    }

    /// Recomputes the visible value of `key` from its active contributions.
    fn refresh(&mut self, key: K) {
        let joined = match (self.keys.dots_for(&key), self.entries.get(&key)) {
            (Some(active), Some(contributions)) => join_contributions(contributions, active),
            _ => None,
        };
        match joined {
            Some(value) => {
                self.values.insert(key, value);
            }
            None => {
                self.values.remove(&key);
            }
        }
    }
}

fn is_active<K: Eq + Hash + Clone>(keys: &ORSet<K>, key: &K, dot: &Dot) -> bool {
    keys.dots_for(key).is_some_and(|dots| dots.contains(dot))
}

/// Joins `value` into the contribution under `dot`, keeping dot order.
fn join_into<V: ReplicatedData>(contributions: &mut Contributions<V>, dot: Dot, value: &V) {
    match contributions.binary_search_by_key(&dot, |(d, _)| *d) {
        Ok(index) => {
            if let Err(err) = contributions[index].1.apply_full_state(value) {
                warn!(%dot, error = %err, "skipping contribution that cannot be joined");
            }
        }
        Err(index) => contributions.insert(index, (dot, value.clone())),
    }
}

/// Folds every active contribution under a settled dot into the highest
/// of them. Returns the dots folded away.
fn fold_settled<V: ReplicatedData>(
    contributions: &mut Contributions<V>,
    active: &HashSet<Dot>,
    settled: &VectorClock,
) -> Vec<Dot> {
    let indices: Vec<usize> = (0..contributions.len())
        .filter(|&i| {
            let dot = &contributions[i].0;
            active.contains(dot) && settled.covers(dot)
        })
        .collect();
    let Some((&target, rest)) = indices.split_last() else {
        return Vec::new();
    };
    let mut folded = Vec::new();
    for &index in rest {
        let (dot, value) = contributions[index].clone();
        match contributions[target].1.apply_full_state(&value) {
            Ok(()) => folded.push(dot),
            Err(err) => warn!(%dot, error = %err, "contribution of another kind left unfolded"),
        }
    }
    folded
}

/// Joins the contributions of active dots, highest dot first.
///
/// Contributions that cannot be joined (a different CRDT kind created
/// concurrently under the same key) are skipped, never merged.
fn join_contributions<V: ReplicatedData>(
    contributions: &[(Dot, V)],
    active: &HashSet<Dot>,
) -> Option<V> {
    let mut iter = contributions.iter().rev().filter(|(dot, _)| active.contains(dot));
    let (_, first) = iter.next()?;
    let mut joined = first.clone();
    for (dot, value) in iter {
        if let Err(err) = joined.apply_full_state(value) {
            warn!(%dot, error = %err, "skipping map entry contribution that cannot be joined");
        }
    }
    Some(joined)
}

impl<K, V> ReplicatedData for ORMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: DeltaState,
{
    type Delta = ORMapDelta<K, V>;

    fn kind(&self) -> CrdtKind {
        CrdtKind::OrMap
    }

    fn validate(&self) -> CrdtResult<()> {
        self.keys.validate()?;
        for key in self.keys.iter() {
            let carried = self.entries.get(key);
            for dot in self.keys.dots_for(key).into_iter().flatten() {
                if !carried.is_some_and(|c| c.iter().any(|(d, _)| d == dot)) {
                    return Err(CrdtError::MalformedState(format!(
                        "present key {key:?} has no value under {dot}"
                    )));
                }
            }
        }
        for (key, contributions) in &self.entries {
            let active = self.keys.dots_for(key);
            for (dot, value) in contributions {
                if !active.is_some_and(|dots| dots.contains(dot)) {
                    return Err(CrdtError::MalformedState(format!(
                        "value for {key:?} under inactive dot {dot}"
                    )));
                }
                value.validate()?;
            }
        }
        Ok(())
    }

    fn validate_delta(&self, delta: &Self::Delta) -> CrdtResult<()> {
        delta.keys.validate()?;
        for (key, contributions) in &delta.values {
            let announced = delta.keys.adds.get(key);
            for (dot, value) in contributions {
                if !announced.is_some_and(|dots| dots.contains(dot)) {
                    return Err(CrdtError::MalformedDelta(format!(
                        "value for {key:?} under unannounced dot {dot}"
                    )));
                }
                value.validate().map_err(|e| CrdtError::MalformedDelta(e.to_string()))?;
            }
        }
        for (key, dots) in &delta.keys.adds {
            let carried = delta.values.get(key);
            for dot in dots.iter().filter(|dot| !delta.keys.removes.contains(*dot)) {
                if !carried.is_some_and(|c| c.iter().any(|(d, _)| d == dot)) {
                    return Err(CrdtError::MalformedDelta(format!(
                        "key {key:?} added under {dot} without a value"
                    )));
                }
            }
        }
        Ok(())
    }

    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()> {
        self.validate_delta(delta)?;
        self.keys.apply_delta(&delta.keys)?;
        let touched = self.adopt(&delta.values);
        self.reconcile(touched);
        debug!(keys = delta.values.len(), removes = delta.keys.removes.len(), "applied map delta");
        Ok(())
    }

    fn apply_full_state(&mut self, state: &Self) -> CrdtResult<()> {
        state.validate()?;
        self.merge(state);
        Ok(())
    }

    fn take_delta(&mut self) -> Option<Self::Delta> {
        let keys = self.keys.take_delta();
        let values = self.pending.take();
        if keys.is_none() && values.is_none() {
            return None;
        }
        Some(ORMapDelta {
            keys: keys.unwrap_or_default(),
            values: values.unwrap_or_default(),
        })
    }

    fn has_delta(&self) -> bool {
        self.keys.has_delta() || self.pending.is_dirty()
    }

    fn causal_context(&self) -> VectorClock {
        let mut context = self.keys.context().clone();
        for value in self.values.values() {
            context.merge(&value.causal_context());
        }
        context
    }

    fn compact(&mut self, stable: &VectorClock) -> usize {
        ORMap::compact(self, stable)
    }
}

impl<K, V> DeltaState for ORMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: DeltaState,
{
    fn from_delta(delta: &ORMapDelta<K, V>) -> Self {
        Self::from_parts(ORSet::from_delta(&delta.keys), delta.values.clone())
    }
}

impl<K, V> PartialEq for ORMap<K, V>
where
    K: Eq + Hash + Clone,
    V: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys && self.entries == other.entries
    }
}

impl<K, V> fmt::Debug for ORMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.values.iter()).finish()
    }
}

#[derive(Serialize)]
#[serde(bound(serialize = "K: Serialize, V: Serialize"))]
struct ORMapRef<'a, K, V>
where
    K: Eq + Hash + Clone,
{
    keys: &'a ORSet<K>,
    entries: &'a HashMap<K, Contributions<V>>,
}

#[derive(Deserialize)]
#[serde(bound(deserialize = "K: Deserialize<'de>, V: Deserialize<'de>"))]
struct ORMapOwned<K, V>
where
    K: Eq + Hash + Clone,
{
    keys: ORSet<K>,
    entries: HashMap<K, Contributions<V>>,
}

impl<K, V> Serialize for ORMap<K, V>
where
    K: Eq + Hash + Clone + Serialize,
    V: Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ORMapRef {
            keys: &self.keys,
            entries: &self.entries,
        }
        .serialize(serializer)
    }
}

impl<'de, K, V> Deserialize<'de> for ORMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug + Deserialize<'de>,
    V: DeltaState + Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = ORMapOwned::<K, V>::deserialize(deserializer)?;
        Ok(Self::from_parts(wire.keys, wire.entries))
    }
}
