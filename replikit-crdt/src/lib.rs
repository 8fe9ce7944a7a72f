//! Delta-state CRDTs for replikit.
//!
//! This crate provides Conflict-free Replicated Data Types:
//!
//! - [`LWWRegister<T>`]: Last-Writer-Wins Register for single values
//! - [`PNCounter`] and [`GCounter`]: distributed counters
//! - [`Flag`]: enable-only boolean
//! - [`ORSet<T>`]: Observed-Remove Set with add-wins semantics
//! - [`ORMap<K, V>`]: Observed-Remove Map of nested CRDTs
//! - [`LWWRegisterMap`], [`CounterMap`], [`ORSetMap`]: collection views
//!   over an `ORMap`
//!
//! All CRDTs in this crate satisfy the following properties:
//! - **Commutative**: merge(a, b) == merge(b, a)
//! - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
//! - **Idempotent**: merge(a, a) == a
//!
//! Each type also implements [`ReplicatedData`]: local mutations accumulate
//! a delta that the replication transport flushes, and remote deltas or
//! full states are validated before they are joined. Deltas obey the same
//! laws, so they may arrive out of order, twice, or after a full-state
//! resync.

mod codec;
mod config;
mod crdt;
mod delta;
mod error;
mod factory;
mod flag;
mod gcounter;
mod lww_register;
mod ormap;
mod orset;
mod pn_counter;
mod replicated;
mod value;
mod vector_clock;
mod wrapper;

pub use codec::{
    Envelope, FORMAT_VERSION, Form, decode_delta, decode_full_state, encode_delta,
    encode_full_state,
};
pub use config::ReplicaConfig;
pub use crdt::{CrdtKind, DeltaState, ReplicatedData};
pub use delta::DeltaTracker;
pub use error::{CrdtError, CrdtResult};
pub use factory::CrdtFactory;
pub use flag::{Flag, FlagDelta};
pub use gcounter::{GCounter, GCounterDelta};
pub use lww_register::{LWWRegister, RegisterDelta, WriteClock};
pub use ormap::{ORMap, ORMapDelta};
pub use orset::{ORSet, ORSetDelta};
pub use pn_counter::{PNCounter, PNCounterDelta};
pub use replicated::Replicated;
pub use value::{JsonRegister, ReplicatedDelta, ReplicatedValue, TypedValue, ValueMap};
pub use vector_clock::VectorClock;
pub use wrapper::{
    CounterAdapter, CounterMap, LWWRegisterMap, NestedAdapter, ORMapWrapper, ORSetMap,
    RegisterAdapter, SetAdapter,
};

pub use replikit_types::{Dot, HybridTimestamp, ReplicaId};
