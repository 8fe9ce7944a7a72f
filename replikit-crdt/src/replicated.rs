//! The handle a replication transport drives.
//!
//! [`Replicated`] owns one CRDT for one replica. Command handlers mutate it
//! through [`Replicated::execute`], which commits only when the handler
//! succeeds; the transport moves changes in and out through the delta and
//! full-state methods, raw or encoded.

use crate::codec;
use crate::{CrdtResult, ReplicatedData, VectorClock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// One replica's copy of a replicated value.
#[derive(Debug, Clone)]
pub struct Replicated<T: ReplicatedData> {
    state: T,
}

impl<T: ReplicatedData> Replicated<T> {
    /// Wraps an initial state.
    #[must_use]
    pub fn new(state: T) -> Self {
        Self { state }
    }

    /// The current, fully merged local state.
    #[must_use]
    pub fn state(&self) -> &T {
        &self.state
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.state
    }

    /// Runs a command against a working copy of the state.
    ///
    /// On `Ok` the working copy, including the delta it recorded, becomes
    /// the state. On `Err` it is dropped: nothing the command did is visible
    /// or flushable.
    pub fn execute<R>(&mut self, command: impl FnOnce(&mut T) -> CrdtResult<R>) -> CrdtResult<R> {
        let mut working = self.state.clone();
        match command(&mut working) {
            Ok(result) => {
                self.state = working;
                Ok(result)
            }
            Err(e) => {
                debug!(kind = %self.state.kind(), error = %e, "command failed, changes discarded");
                Err(e)
            }
        }
    }

    /// Joins a remote delta. A rejected delta leaves the state untouched and
    /// should be answered with a full-state resync.
    pub fn apply_delta(&mut self, delta: &T::Delta) -> CrdtResult<()> {
        self.state.apply_delta(delta).inspect_err(|e| {
            warn!(kind = %self.state.kind(), error = %e, "rejected remote delta");
        })
    }

    /// Joins a remote full state.
    pub fn apply_full_state(&mut self, state: &T) -> CrdtResult<()> {
        self.state.apply_full_state(state).inspect_err(|e| {
            warn!(kind = %self.state.kind(), error = %e, "rejected remote full state");
        })
    }

    /// Flushes the changes made since the previous flush.
    pub fn current_delta(&mut self) -> Option<T::Delta> {
        let delta = self.state.take_delta();
        if delta.is_some() {
            debug!(kind = %self.state.kind(), "flushed delta");
        }
        delta
    }

    /// Snapshot of the full state for resync.
    #[must_use]
    pub fn current_full_state(&self) -> T {
        self.state.current_full_state()
    }

    /// Returns true if a flush would produce a delta.
    #[must_use]
    pub fn has_delta(&self) -> bool {
        self.state.has_delta()
    }

    /// The causal context to report when agreeing on a stable clock.
    #[must_use]
    pub fn causal_context(&self) -> VectorClock {
        self.state.causal_context()
    }

    /// Drops tombstones made causally stable by `stable`.
    ///
    /// Only call this with the meet of every replica's
    /// [`causal_context`](Self::causal_context), gathered after every replica
    /// has merged every other's full state and with no delta in flight.
    pub fn compact(&mut self, stable: &VectorClock) -> usize {
        let dropped = self.state.compact(stable);
        debug!(kind = %self.state.kind(), dropped, "compacted state");
        dropped
    }
}

impl<T> Replicated<T>
where
    T: ReplicatedData + Serialize + DeserializeOwned,
    T::Delta: Serialize + DeserializeOwned,
{
    /// Decodes and joins a remote delta.
    pub fn apply_encoded_delta(&mut self, bytes: &[u8]) -> CrdtResult<()> {
        let delta = codec::decode_delta(&self.state, bytes).inspect_err(|e| {
            warn!(kind = %self.state.kind(), error = %e, "undecodable remote delta");
        })?;
        self.apply_delta(&delta)
    }

    /// Decodes and joins a remote full state.
    pub fn apply_encoded_full_state(&mut self, bytes: &[u8]) -> CrdtResult<()> {
        let state: T = codec::decode_full_state(self.state.kind(), bytes).inspect_err(|e| {
            warn!(kind = %self.state.kind(), error = %e, "undecodable remote full state");
        })?;
        self.apply_full_state(&state)
    }

    /// Flushes and encodes the pending delta.
    pub fn current_encoded_delta(&mut self) -> CrdtResult<Option<Vec<u8>>> {
        match self.current_delta() {
            Some(delta) => codec::encode_delta(&self.state, &delta).map(Some),
            None => Ok(None),
        }
    }

    /// Encodes a snapshot of the full state.
    pub fn current_encoded_full_state(&self) -> CrdtResult<Vec<u8>> {
        codec::encode_full_state(&self.state)
    }
}

impl<T: ReplicatedData + Default> Default for Replicated<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
