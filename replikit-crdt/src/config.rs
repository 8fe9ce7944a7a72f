//! Replica configuration, read from `replica.toml`.
//!
//! ```toml
//! replica_id = "01936f3e-9c1a-7b4e-8d2f-4a5b6c7d8e9f"
//! label = "edge-eu-1"
//! ```
//!
//! The identity drives every last-writer-wins tie-break, so a missing,
//! unparsable or nil `replica_id` is rejected when the file is loaded
//! rather than at first use.

use crate::{CrdtError, CrdtResult};
use replikit_types::ReplicaId;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

/// Validated replica configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaConfig {
    replica_id: ReplicaId,
    label: Option<String>,
}

/// Raw TOML structure matching the config file.
#[derive(Deserialize)]
struct ReplicaFile {
    #[serde(default)]
    replica_id: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

impl ReplicaConfig {
    /// Builds a configuration from an already validated identity.
    pub fn new(replica_id: ReplicaId) -> CrdtResult<Self> {
        Ok(Self {
            replica_id: replica_id.validate()?,
            label: None,
        })
    }

    /// Attaches a human-readable label, used only in logs.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> CrdtResult<Self> {
        let file: ReplicaFile = toml::from_str(contents)?;
        let raw = file
            .replica_id
            .ok_or_else(|| CrdtError::InvalidReplicaId("replica_id is not configured".into()))?;
        Ok(Self {
            replica_id: ReplicaId::from_config(&raw)?,
            label: file.label.filter(|label| !label.trim().is_empty()),
        })
    }

    /// Reads and validates a config file.
    pub fn load_from(path: impl AsRef<Path>) -> CrdtResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!(
            replica_id = %config.replica_id,
            label = config.label.as_deref().unwrap_or(""),
            "loaded replica config from {:?}",
            path
        );
        Ok(config)
    }

    #[must_use]
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}
