//! Dynamically typed replicated values.
//!
//! [`ReplicatedValue`] lets one map hold values of different CRDT kinds,
//! which is what command handlers see when the nested type is chosen at
//! runtime. Typed access goes through [`TypedValue`] and fails with
//! [`CrdtError::TypeMismatch`] instead of merging across kinds.

use crate::{
    CrdtError, CrdtKind, CrdtResult, Flag, FlagDelta, GCounter, GCounterDelta, LWWRegister,
    DeltaState, ORMap, ORMapDelta, ORSet, ORSetDelta, PNCounter, PNCounterDelta, RegisterDelta,
    ReplicatedData, VectorClock,
};
use replikit_types::ReplicaId;
use serde::{Deserialize, Serialize};

/// Register over arbitrary JSON.
pub type JsonRegister = LWWRegister<serde_json::Value>;

/// A map of dynamically typed values.
pub type ValueMap = ORMap<String, ReplicatedValue>;

/// A replicated value whose CRDT kind is known only at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "state", rename_all = "snake_case")]
pub enum ReplicatedValue {
    Register(JsonRegister),
    Counter(PNCounter),
    GCounter(GCounter),
    Set(ORSet<String>),
    Flag(Flag),
    Map(ValueMap),
}

/// Delta of a [`ReplicatedValue`], tagged with the same kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "delta", rename_all = "snake_case")]
pub enum ReplicatedDelta {
    Register(RegisterDelta<serde_json::Value>),
    Counter(PNCounterDelta),
    GCounter(GCounterDelta),
    Set(ORSetDelta<String>),
    Flag(FlagDelta),
    Map(ORMapDelta<String, ReplicatedValue>),
}

impl ReplicatedDelta {
    /// The kind of value this delta applies to.
    #[must_use]
    pub fn kind(&self) -> CrdtKind {
        match self {
            Self::Register(_) => CrdtKind::LwwRegister,
            Self::Counter(_) => CrdtKind::PnCounter,
            Self::GCounter(_) => CrdtKind::GCounter,
            Self::Set(_) => CrdtKind::OrSet,
            Self::Flag(_) => CrdtKind::Flag,
            Self::Map(_) => CrdtKind::OrMap,
        }
    }
}

impl ReplicatedData for ReplicatedValue {
    type Delta = ReplicatedDelta;

    fn kind(&self) -> CrdtKind {
        match self {
            Self::Register(_) => CrdtKind::LwwRegister,
            Self::Counter(_) => CrdtKind::PnCounter,
            Self::GCounter(_) => CrdtKind::GCounter,
            Self::Set(_) => CrdtKind::OrSet,
            Self::Flag(_) => CrdtKind::Flag,
            Self::Map(_) => CrdtKind::OrMap,
        }
    }

    fn validate(&self) -> CrdtResult<()> {
        match self {
            Self::Register(v) => v.validate(),
            Self::Counter(v) => v.validate(),
            Self::GCounter(v) => v.validate(),
            Self::Set(v) => v.validate(),
            Self::Flag(v) => v.validate(),
            Self::Map(v) => v.validate(),
        }
    }

    fn validate_delta(&self, delta: &Self::Delta) -> CrdtResult<()> {
        match (self, delta) {
            (Self::Register(v), ReplicatedDelta::Register(d)) => v.validate_delta(d),
            (Self::Counter(v), ReplicatedDelta::Counter(d)) => v.validate_delta(d),
            (Self::GCounter(v), ReplicatedDelta::GCounter(d)) => v.validate_delta(d),
            (Self::Set(v), ReplicatedDelta::Set(d)) => v.validate_delta(d),
            (Self::Flag(v), ReplicatedDelta::Flag(d)) => v.validate_delta(d),
            (Self::Map(v), ReplicatedDelta::Map(d)) => v.validate_delta(d),
            _ => Err(CrdtError::TypeMismatch {
                expected: self.kind(),
                found: delta.kind(),
            }),
        }
    }

    fn apply_delta(&mut self, delta: &Self::Delta) -> CrdtResult<()> {
        let expected = self.kind();
        match (self, delta) {
            (Self::Register(v), ReplicatedDelta::Register(d)) => v.apply_delta(d),
            (Self::Counter(v), ReplicatedDelta::Counter(d)) => v.apply_delta(d),
            (Self::GCounter(v), ReplicatedDelta::GCounter(d)) => v.apply_delta(d),
            (Self::Set(v), ReplicatedDelta::Set(d)) => v.apply_delta(d),
            (Self::Flag(v), ReplicatedDelta::Flag(d)) => v.apply_delta(d),
            (Self::Map(v), ReplicatedDelta::Map(d)) => v.apply_delta(d),
            _ => Err(CrdtError::TypeMismatch {
                expected,
                found: delta.kind(),
            }),
        }
    }

    fn apply_full_state(&mut self, state: &Self) -> CrdtResult<()> {
        let expected = self.kind();
        match (self, state) {
            (Self::Register(v), Self::Register(s)) => v.apply_full_state(s),
            (Self::Counter(v), Self::Counter(s)) => v.apply_full_state(s),
            (Self::GCounter(v), Self::GCounter(s)) => v.apply_full_state(s),
            (Self::Set(v), Self::Set(s)) => v.apply_full_state(s),
            (Self::Flag(v), Self::Flag(s)) => v.apply_full_state(s),
            (Self::Map(v), Self::Map(s)) => v.apply_full_state(s),
            _ => Err(CrdtError::TypeMismatch {
                expected,
                found: state.kind(),
            }),
        }
    }

    fn take_delta(&mut self) -> Option<Self::Delta> {
        match self {
            Self::Register(v) => v.take_delta().map(ReplicatedDelta::Register),
            Self::Counter(v) => v.take_delta().map(ReplicatedDelta::Counter),
            Self::GCounter(v) => v.take_delta().map(ReplicatedDelta::GCounter),
            Self::Set(v) => v.take_delta().map(ReplicatedDelta::Set),
            Self::Flag(v) => v.take_delta().map(ReplicatedDelta::Flag),
            Self::Map(v) => v.take_delta().map(ReplicatedDelta::Map),
        }
    }

    fn has_delta(&self) -> bool {
        match self {
            Self::Register(v) => v.has_delta(),
            Self::Counter(v) => v.has_delta(),
            Self::GCounter(v) => v.has_delta(),
            Self::Set(v) => v.has_delta(),
            Self::Flag(v) => v.has_delta(),
            Self::Map(v) => v.has_delta(),
        }
    }

    fn causal_context(&self) -> VectorClock {
        match self {
            Self::Set(v) => v.causal_context(),
            Self::Map(v) => v.causal_context(),
            Self::Register(_) | Self::Counter(_) | Self::GCounter(_) | Self::Flag(_) => {
                VectorClock::new()
            }
        }
    }

    fn compact(&mut self, stable: &VectorClock) -> usize {
        match self {
            Self::Set(v) => v.compact(stable),
            Self::Map(v) => v.compact(stable),
            Self::Register(_) | Self::Counter(_) | Self::GCounter(_) | Self::Flag(_) => 0,
        }
    }
}

impl DeltaState for ReplicatedValue {
    fn from_delta(delta: &ReplicatedDelta) -> Self {
        match delta {
            ReplicatedDelta::Register(d) => Self::Register(JsonRegister::from_delta(d)),
            ReplicatedDelta::Counter(d) => Self::Counter(PNCounter::from_delta(d)),
            ReplicatedDelta::GCounter(d) => Self::GCounter(GCounter::from_delta(d)),
            ReplicatedDelta::Set(d) => Self::Set(ORSet::from_delta(d)),
            ReplicatedDelta::Flag(d) => Self::Flag(Flag::from_delta(d)),
            ReplicatedDelta::Map(d) => Self::Map(ValueMap::from_delta(d)),
        }
    }
}

/// A concrete CRDT type that can live inside a [`ReplicatedValue`].
pub trait TypedValue: ReplicatedData + Sized {
    /// The kind this type is stored as.
    const KIND: CrdtKind;

    fn from_value(value: &ReplicatedValue) -> Option<&Self>;

    fn from_value_mut(value: &mut ReplicatedValue) -> Option<&mut Self>;

    fn into_value(self) -> ReplicatedValue;
}

macro_rules! typed_value {
    ($ty:ty, $variant:ident, $kind:expr) => {
        impl TypedValue for $ty {
            const KIND: CrdtKind = $kind;

            fn from_value(value: &ReplicatedValue) -> Option<&Self> {
                match value {
                    ReplicatedValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_value_mut(value: &mut ReplicatedValue) -> Option<&mut Self> {
                match value {
                    ReplicatedValue::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn into_value(self) -> ReplicatedValue {
                ReplicatedValue::$variant(self)
            }
        }

        impl From<$ty> for ReplicatedValue {
            fn from(value: $ty) -> Self {
                ReplicatedValue::$variant(value)
            }
        }
    };
}

typed_value!(JsonRegister, Register, CrdtKind::LwwRegister);
typed_value!(PNCounter, Counter, CrdtKind::PnCounter);
typed_value!(GCounter, GCounter, CrdtKind::GCounter);
typed_value!(ORSet<String>, Set, CrdtKind::OrSet);
typed_value!(Flag, Flag, CrdtKind::Flag);
typed_value!(ValueMap, Map, CrdtKind::OrMap);

fn mismatch<T: TypedValue>(found: &ReplicatedValue) -> CrdtError {
    CrdtError::TypeMismatch {
        expected: T::KIND,
        found: found.kind(),
    }
}

impl ValueMap {
    /// Returns the value under `key` as `T`.
    ///
    /// `Ok(None)` if the key is absent; `TypeMismatch` if it holds another kind.
    pub fn get_as<T: TypedValue>(&self, key: &str) -> CrdtResult<Option<&T>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => T::from_value(value).map(Some).ok_or_else(|| mismatch::<T>(value)),
        }
    }

    /// Returns the value under `key` as `T`, creating it with `factory` if
    /// the key is absent.
    pub fn get_or_create_as<T: TypedValue>(
        &mut self,
        key: &str,
        replica_id: ReplicaId,
        factory: impl FnOnce() -> T,
    ) -> CrdtResult<&T> {
        let value = self.get_or_create(key.to_string(), replica_id, || factory().into_value())?;
        T::from_value(value).ok_or_else(|| mismatch::<T>(value))
    }

    /// Applies a mutation to the `T` under `key`.
    pub fn update_as<T: TypedValue, R>(
        &mut self,
        key: &str,
        replica_id: ReplicaId,
        mutation: impl FnOnce(&mut T) -> R,
    ) -> CrdtResult<R> {
        self.try_update(&key.to_string(), replica_id, |value| {
            let found = value.kind();
            T::from_value_mut(value)
                .map(mutation)
                .ok_or(CrdtError::TypeMismatch {
                    expected: T::KIND,
                    found,
                })
        })
    }

    /// Applies a mutation to the `T` under `key`, creating it first if absent.
    pub fn update_or_create_as<T: TypedValue, R>(
        &mut self,
        key: &str,
        replica_id: ReplicaId,
        factory: impl FnOnce() -> T,
        mutation: impl FnOnce(&mut T) -> R,
    ) -> CrdtResult<R> {
        if self.contains_key(key) {
            return self.update_as(key, replica_id, mutation);
        }
        let mut value = factory();
        let result = mutation(&mut value);
        self.update_or_create(key.to_string(), replica_id, || value.into_value(), |_| ())?;
        Ok(result)
    }
}
