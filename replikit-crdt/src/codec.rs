//! Versioned encoding of full states and deltas.
//!
//! Every payload is wrapped in an [`Envelope`] naming the format version,
//! the CRDT kind and whether it is a delta or a full state. A replica
//! refuses to decode anything it cannot merge, instead of guessing.

use crate::{CrdtError, CrdtKind, CrdtResult, ReplicatedData};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current encoding version. Bumped on any incompatible layout change.
pub const FORMAT_VERSION: u32 = 1;

/// Whether an envelope carries a delta or a full state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Form {
    Delta,
    FullState,
}

/// Wire wrapper around an encoded payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub kind: CrdtKind,
    pub form: Form,
    pub payload: serde_json::Value,
}

impl Envelope {
    fn seal<P: Serialize>(kind: CrdtKind, form: Form, payload: &P) -> CrdtResult<Vec<u8>> {
        let envelope = Self {
            version: FORMAT_VERSION,
            kind,
            form,
            payload: serde_json::to_value(payload)?,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn open(bytes: &[u8], kind: CrdtKind, form: Form) -> CrdtResult<serde_json::Value> {
        let envelope: Self = serde_json::from_slice(bytes)?;
        if envelope.version != FORMAT_VERSION {
            return Err(CrdtError::UnsupportedFormat(format!(
                "version {} (expected {FORMAT_VERSION})",
                envelope.version
            )));
        }
        if envelope.kind != kind {
            return Err(CrdtError::TypeMismatch {
                expected: kind,
                found: envelope.kind,
            });
        }
        if envelope.form != form {
            return Err(CrdtError::UnsupportedFormat(format!(
                "expected {form:?}, got {:?}",
                envelope.form
            )));
        }
        Ok(envelope.payload)
    }
}

/// Encodes a delta produced by `value`.
pub fn encode_delta<T>(value: &T, delta: &T::Delta) -> CrdtResult<Vec<u8>>
where
    T: ReplicatedData,
    T::Delta: Serialize,
{
    Envelope::seal(value.kind(), Form::Delta, delta)
}

/// Decodes a delta destined for `value`.
pub fn decode_delta<T>(value: &T, bytes: &[u8]) -> CrdtResult<T::Delta>
where
    T: ReplicatedData,
    T::Delta: DeserializeOwned,
{
    let payload = Envelope::open(bytes, value.kind(), Form::Delta)?;
    Ok(serde_json::from_value(payload)?)
}

/// Encodes a full state.
pub fn encode_full_state<T>(state: &T) -> CrdtResult<Vec<u8>>
where
    T: ReplicatedData + Serialize,
{
    Envelope::seal(state.kind(), Form::FullState, state)
}

/// Decodes a full state that must be of `kind`.
pub fn decode_full_state<T>(kind: CrdtKind, bytes: &[u8]) -> CrdtResult<T>
where
    T: ReplicatedData + DeserializeOwned,
{
    let payload = Envelope::open(bytes, kind, Form::FullState)?;
    let state: T = serde_json::from_value(payload)?;
    if state.kind() != kind {
        return Err(CrdtError::TypeMismatch {
            expected: kind,
            found: state.kind(),
        });
    }
    Ok(state)
}
