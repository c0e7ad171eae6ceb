//! Wire types for the resumable address subscription.
//!
//! A subscription response carries either a full snapshot of a model's
//! address set, an ordered list of incremental [`Mutation`]s, or both (the
//! snapshot is applied first). The [`WatchCursor`] is what the caller presents
//! on the next call to resume where the previous response left off.

use serde::{Deserialize, Serialize};

/// Kind of an incremental change to an address set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    Add,
    Remove,
    /// A kind this client does not understand. Carries the raw wire tag.
    Unknown(i32),
}

/// One incremental change to a model's address set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: MutationKind,
    pub address: String,
}

impl Mutation {
    pub fn add(address: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Add,
            address: address.into(),
        }
    }

    pub fn remove(address: impl Into<String>) -> Self {
        Self {
            kind: MutationKind::Remove,
            address: address.into(),
        }
    }
}

/// A unit of change delivered by one subscription response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffBatch {
    /// Full replacement set, in registry order.
    pub snapshot: Option<Vec<String>>,
    /// Incremental changes to apply in order, after `snapshot` if present.
    #[serde(default)]
    pub log: Vec<Mutation>,
    /// Sequence number to present on the next call.
    pub next_seqno: u64,
}

impl DiffBatch {
    pub fn full(addresses: Vec<String>, next_seqno: u64) -> Self {
        Self {
            snapshot: Some(addresses),
            log: Vec::new(),
            next_seqno,
        }
    }

    pub fn incremental(log: Vec<Mutation>, next_seqno: u64) -> Self {
        Self {
            snapshot: None,
            log,
            next_seqno,
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.snapshot.is_some()
    }
}

/// Resume point of a subscription.
///
/// The default (empty instance id, sequence zero) asks the registry for a
/// fresh full snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchCursor {
    pub registry_instance: String,
    pub seqno: u64,
}

impl WatchCursor {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry_instance.is_empty() && self.seqno == 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Response to one subscription call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchResponse {
    /// Identity of the registry process that served the call.
    pub registry_instance: String,
    pub batch: DiffBatch,
}

impl WatchResponse {
    /// Cursor to present on the next call.
    #[must_use]
    pub fn next_cursor(&self) -> WatchCursor {
        WatchCursor {
            registry_instance: self.registry_instance.clone(),
            seqno: self.batch.next_seqno,
        }
    }
}
