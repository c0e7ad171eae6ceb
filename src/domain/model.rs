//! Published-model records as the registry reports them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::id::ModelId;

/// Definition of a servable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub model_id: ModelId,
    /// Location of the model's serving definition.
    pub model_path: String,
    /// Location of the checkpoint to load.
    pub checkpoint_path: String,
    /// Number of modelet replicas the registry should keep serving this model.
    pub requested_replicas: u32,
    /// Free-form per-model settings passed through to modelets.
    #[serde(default)]
    pub overrides: BTreeMap<String, String>,
}

impl Model {
    pub fn new(
        model_id: impl Into<ModelId>,
        model_path: impl Into<String>,
        checkpoint_path: impl Into<String>,
        requested_replicas: u32,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            model_path: model_path.into(),
            checkpoint_path: checkpoint_path.into(),
            requested_replicas,
            overrides: BTreeMap::new(),
        }
    }
}

/// A model together with the modelets currently serving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedModel {
    pub model: Model,
    #[serde(default)]
    pub modelet_addresses: Vec<String>,
}

/// Replica counts for one kind of serving hardware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTypeStats {
    pub chip_type: String,
    pub chip_topology: String,
    pub replicas: u32,
}

/// Operational statistics for a cluster, optionally narrowed to one model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStats {
    #[serde(default)]
    pub server_types: Vec<ServerTypeStats>,
}

impl ClusterStats {
    /// Total replicas across all server types.
    #[must_use]
    pub fn total_replicas(&self) -> u32 {
        self.server_types.iter().map(|s| s.replicas).sum()
    }
}
