//! Collection-shaped views over an [`ORMap`].
//!
//! A wrapper binds a map to the local replica and exposes ordinary
//! get/put/remove operations, translating each into the nested CRDT's own
//! operations. Operations shared by every nested type live on
//! [`ORMapWrapper`]; reads and writes specific to one live on its alias:
//!
//! - [`LWWRegisterMap`]: key → last-writer-wins value
//! - [`CounterMap`]: key → PN counter
//! - [`ORSetMap`]: key → observed-remove set

use crate::{
    CrdtKind, CrdtResult, DeltaState, LWWRegister, ORMap, ORMapDelta, ORSet, PNCounter,
    ReplicatedData, VectorClock, WriteClock,
};
use replikit_types::ReplicaId;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

/// Names the CRDT a wrapper stores under each key.
pub trait NestedAdapter {
    type Nested: DeltaState;
}

/// Keys map to last-writer-wins registers.
pub struct RegisterAdapter<V>(PhantomData<V>);

impl<V: Clone + fmt::Debug> NestedAdapter for RegisterAdapter<V> {
    type Nested = LWWRegister<V>;
}

/// Keys map to PN counters.
pub struct CounterAdapter;

impl NestedAdapter for CounterAdapter {
    type Nested = PNCounter;
}

/// Keys map to observed-remove sets.
pub struct SetAdapter<T>(PhantomData<T>);

impl<T: Eq + Hash + Clone + fmt::Debug> NestedAdapter for SetAdapter<T> {
    type Nested = ORSet<T>;
}

/// An [`ORMap`] bound to the replica that performs local writes.
pub struct ORMapWrapper<K, A>
where
    K: Eq + Hash + Clone,
    A: NestedAdapter,
{
    map: ORMap<K, A::Nested>,
    replica_id: ReplicaId,
    adapter: PhantomData<A>,
}

/// Map of last-writer-wins values.
pub type LWWRegisterMap<K, V> = ORMapWrapper<K, RegisterAdapter<V>>;

/// Map of PN counters.
pub type CounterMap<K> = ORMapWrapper<K, CounterAdapter>;

/// Map of observed-remove sets.
pub type ORSetMap<K, T> = ORMapWrapper<K, SetAdapter<T>>;

impl<K, A> ORMapWrapper<K, A>
where
    K: Eq + Hash + Clone + fmt::Debug,
    A: NestedAdapter,
{
    /// Creates an empty wrapper writing as `replica_id`.
    #[must_use]
    pub fn new(replica_id: ReplicaId) -> Self {
        Self::from_ormap(ORMap::new(), replica_id)
    }

    /// Wraps an existing map.
    #[must_use]
    pub fn from_ormap(map: ORMap<K, A::Nested>, replica_id: ReplicaId) -> Self {
        Self {
            map,
            replica_id,
            adapter: PhantomData,
        }
    }

    /// The replica local writes are attributed to.
    #[must_use]
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// Returns the nested CRDT under `key`.
    #[must_use]
    pub fn nested<Q>(&self, key: &Q) -> Option<&A::Nested>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key)
    }

    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    /// Removes `key` and its nested value. Returns true if it was present.
    pub fn remove<Q>(&mut self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.remove(key).is_some()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.map.keys()
    }

    /// Iterates present keys with their nested CRDTs. Order is unspecified.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &A::Nested)> {
        self.map.iter()
    }

    /// Removes every key. Returns the number removed.
    pub fn clear(&mut self) -> usize {
        self.map.clear()
    }

    /// Drops key and nested tombstones made causally stable by `stable`.
    ///
    /// See [`ORSet::compact`] for what `stable` must guarantee.
    pub fn compact(&mut self, stable: &VectorClock) -> usize {
        self.map.compact(stable)
    }

    #[must_use]
    pub fn as_ormap(&self) -> &ORMap<K, A::Nested> {
        &self.map
    }

    #[must_use]
    pub fn into_inner(self) -> ORMap<K, A::Nested> {
        self.map
    }
}

impl<K, V> LWWRegisterMap<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone + fmt::Debug,
{
    /// Returns the current value under `key`.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(LWWRegister::value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter().map(|(key, register)| (key, register.value()))
    }

    /// Writes `value` under `key`, returning the value it replaced locally.
    ///
    /// A put is a new local write stamped above the current one, so it
    /// always replaces the local value.
    pub fn put(&mut self, key: K, value: V) -> CrdtResult<Option<V>> {
        self.put_with_clock(key, value, WriteClock::Default)
    }

    /// Writes `value` under `key`, stamping it with `clock`.
    ///
    /// A [`WriteClock::Custom`] stamp below the current one loses to it,
    /// as it would on any other replica.
    pub fn put_with_clock(&mut self, key: K, value: V, clock: WriteClock) -> CrdtResult<Option<V>> {
        let replica_id = self.replica_id;
        if self.map.contains_key(&key) {
            self.map
                .update(&key, replica_id, |register| {
                    let previous = register.value().clone();
                    register.set_with_clock(value, replica_id, clock);
                    previous
                })
                .map(Some)
        } else {
            self.map.get_or_create(key, replica_id, || {
                LWWRegister::with_clock(value, replica_id, clock)
            })?;
            Ok(None)
        }
    }
}

impl<K> CounterMap<K>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Returns the total under `key`.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<i64>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(PNCounter::value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, i64)> {
        self.map.iter().map(|(key, counter)| (key, counter.value()))
    }

    /// Adds `amount` to the counter under `key`, creating it at zero if
    /// absent. Returns the new total.
    pub fn increment(&mut self, key: K, amount: u64) -> CrdtResult<i64> {
        let replica_id = self.replica_id;
        self.map
            .update_or_create(key, replica_id, PNCounter::new, |counter| {
                counter.increment(replica_id, amount)
            })
    }

    /// Subtracts `amount` from the counter under `key`, creating it at zero
    /// if absent. Returns the new total.
    pub fn decrement(&mut self, key: K, amount: u64) -> CrdtResult<i64> {
        let replica_id = self.replica_id;
        self.map
            .update_or_create(key, replica_id, PNCounter::new, |counter| {
                counter.decrement(replica_id, amount)
            })
    }
}

impl<K, T> ORSetMap<K, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
    T: Eq + Hash + Clone + fmt::Debug,
{
    /// Returns the set under `key`.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&ORSet<T>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &ORSet<T>)> {
        self.map.iter()
    }

    /// Adds `element` to the set under `key`, creating the set if absent.
    pub fn add_element(&mut self, key: K, element: T) -> CrdtResult<()> {
        let replica_id = self.replica_id;
        self.map
            .try_update_or_create(key, replica_id, ORSet::new, |set| set.add(element, replica_id))
            .map(|_| ())
    }

    /// Removes `element` from the set under `key`.
    ///
    /// Returns true if the element was present. The key stays present even
    /// if its set becomes empty.
    pub fn remove_element(&mut self, key: &K, element: &T) -> CrdtResult<bool> {
        if !self.contains_element(key, element) {
            return Ok(false);
        }
        let replica_id = self.replica_id;
        self.map.update(key, replica_id, |set| !set.remove(element).is_empty())
    }

    #[must_use]
    pub fn contains_element(&self, key: &K, element: &T) -> bool {
        self.map.get(key).is_some_and(|set| set.contains(element))
    }
}

impl<K, A> Clone for ORMapWrapper<K, A>
where
    K: Eq + Hash + Clone,
    A: NestedAdapter,
{
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
            replica_id: self.replica_id,
            adapter: PhantomData,
        }
    }
}

impl<K, A> fmt::Debug for ORMapWrapper<K, A>
where
    K: Eq + Hash + Clone + fmt::Debug,
    A: NestedAdapter,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ORMapWrapper")
            .field("replica_id", &self.replica_id)
            .field("map", &self.map)
            .finish()
    }
}

impl<K, A> PartialEq for ORMapWrapper<K, A>
where
    K: Eq + Hash + Clone,
    A: NestedAdapter,
    A::Nested: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        self.map == other.map
    }
}

impl<K, A> ReplicatedData for ORMapWrapper<K, A>
where
    K: Eq + Hash + Clone + fmt::Debug,
    A: NestedAdapter,
{
    type Delta = ORMapDelta<K, A::Nested>;

    fn kind(&self) -> CrdtKind {
        CrdtKind::OrMap
    }

    fn validate(&self) -> CrdtResult<()> {
        self.map.validate()
    }

    fn validate_delta(&self, delta: &Self::Delta) -> CrdtResult<()> {
        self.map.validate_delta(delta)
    }

    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()> {
        self.map.apply_delta(delta)
    }

    fn apply_full_state(&mut self, state: &Self) -> CrdtResult<()> {
        self.map.apply_full_state(&state.map)
    }

    fn take_delta(&mut self) -> Option<Self::Delta> {
        self.map.take_delta()
    }

    fn has_delta(&self) -> bool {
        self.map.has_delta()
    }

    fn causal_context(&self) -> VectorClock {
        self.map.causal_context()
    }

    fn compact(&mut self, stable: &VectorClock) -> usize {
        self.map.compact(stable)
    }
}
