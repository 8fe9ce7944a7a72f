//! Error types for the CRDT core.

use crate::CrdtKind;
use replikit_types::ReplicaId;
use thiserror::Error;

/// Result type for CRDT operations.
pub type CrdtResult<T> = Result<T, CrdtError>;

/// Errors that can occur while mutating, merging or decoding replicated data.
#[derive(Debug, Error)]
pub enum CrdtError {
    /// An existing value has a different CRDT type than the caller expected.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: CrdtKind, found: CrdtKind },

    /// The key is not present in the map.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A remote delta failed validation and was not applied.
    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    /// A remote full state failed validation and was not applied.
    #[error("malformed state: {0}")]
    MalformedState(String),

    /// The replica has allocated every dot counter it can.
    #[error("dot counters exhausted for replica {0}")]
    DotsExhausted(ReplicaId),

    /// Encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The payload was produced by an incompatible encoder.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The replica identity is missing or unusable.
    #[error("invalid replica id: {0}")]
    InvalidReplicaId(String),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// Configuration could not be read.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<replikit_types::Error> for CrdtError {
    fn from(err: replikit_types::Error) -> Self {
        match err {
            replikit_types::Error::InvalidReplicaId(msg) => Self::InvalidReplicaId(msg),
            replikit_types::Error::InvalidUuid(e) => Self::InvalidReplicaId(e.to_string()),
            replikit_types::Error::Serialization(e) => Self::Codec(e),
            replikit_types::Error::InvalidTimestamp(msg) => Self::MalformedState(msg),
        }
    }
}
