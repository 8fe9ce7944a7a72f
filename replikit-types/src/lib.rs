//! Core type definitions for replikit.
//!
//! This crate defines the fundamental types every replicated data type
//! depends on:
//! - Replica identifiers (UUID v7), the deterministic tie-break key
//! - Hybrid Logical Clock timestamps for last-writer-wins ordering
//! - Dots, which identify a single local mutation event
//!
//! The CRDTs themselves live in `replikit-crdt`.

mod dot;
mod ids;
mod timestamp;

pub use dot::Dot;
pub use ids::ReplicaId;
pub use timestamp::HybridTimestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid replica id: {0}")]
    InvalidReplicaId(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
