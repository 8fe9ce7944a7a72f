//! Construction of replicated values for one replica.
//!
//! A [`CrdtFactory`] is built once at startup from a validated identity and
//! handed to whatever creates CRDTs, so no code path can write under an
//! unconfigured or nil replica.

use crate::{
    CounterMap, CrdtResult, DeltaState, Flag, GCounter, LWWRegister, LWWRegisterMap, ORMap, ORSet,
    ORSetMap, PNCounter, ReplicaConfig, Replicated, ReplicatedData, WriteClock,
};
use replikit_types::ReplicaId;
use std::fmt;
use std::hash::Hash;
use tracing::info;

/// Creates CRDT instances attributed to the local replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrdtFactory {
    replica_id: ReplicaId,
}

impl CrdtFactory {
    /// Creates a factory for `replica_id`. Fails on the nil id.
    pub fn new(replica_id: ReplicaId) -> CrdtResult<Self> {
        let replica_id = replica_id.validate()?;
        info!(%replica_id, "CRDT factory ready");
        Ok(Self { replica_id })
    }

    /// Creates a factory from loaded configuration.
    pub fn from_config(config: &ReplicaConfig) -> CrdtResult<Self> {
        let factory = Self::new(config.replica_id())?;
        if let Some(label) = config.label() {
            info!(replica_id = %factory.replica_id, label, "replica labelled");
        }
        Ok(factory)
    }

    #[must_use]
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    /// A register holding `value`, written now.
    #[must_use]
    pub fn new_lww_register<T: Clone>(&self, value: T) -> LWWRegister<T> {
        LWWRegister::new(value, self.replica_id)
    }

    /// A register holding `value`, stamped by `clock`.
    #[must_use]
    pub fn new_lww_register_with_clock<T: Clone>(
        &self,
        value: T,
        clock: WriteClock,
    ) -> LWWRegister<T> {
        LWWRegister::with_clock(value, self.replica_id, clock)
    }

    #[must_use]
    pub fn new_orset<T: Eq + Hash + Clone>(&self) -> ORSet<T> {
        ORSet::new()
    }

    #[must_use]
    pub fn new_counter(&self) -> PNCounter {
        PNCounter::new()
    }

    #[must_use]
    pub fn new_gcounter(&self) -> GCounter {
        GCounter::new()
    }

    #[must_use]
    pub fn new_flag(&self) -> Flag {
        Flag::new()
    }

    #[must_use]
    pub fn new_ormap<K, V>(&self) -> ORMap<K, V>
    where
        K: Eq + Hash + Clone + fmt::Debug,
        V: DeltaState,
    {
        ORMap::new()
    }

    #[must_use]
    pub fn new_lww_register_map<K, V>(&self) -> LWWRegisterMap<K, V>
    where
        K: Eq + Hash + Clone + fmt::Debug,
        V: Clone + fmt::Debug,
    {
        LWWRegisterMap::new(self.replica_id)
    }

    #[must_use]
    pub fn new_counter_map<K>(&self) -> CounterMap<K>
    where
        K: Eq + Hash + Clone + fmt::Debug,
    {
        CounterMap::new(self.replica_id)
    }

    #[must_use]
    pub fn new_orset_map<K, T>(&self) -> ORSetMap<K, T>
    where
        K: Eq + Hash + Clone + fmt::Debug,
        T: Eq + Hash + Clone + fmt::Debug,
    {
        ORSetMap::new(self.replica_id)
    }

    /// Wraps `state` in a transport-facing handle.
    #[must_use]
    pub fn replicated<T: ReplicatedData>(&self, state: T) -> Replicated<T> {
        Replicated::new(state)
    }
}
