//! Registry domain types: identifiers, model records, and the watch wire format.

pub mod id;
pub mod model;
pub mod watch;

pub use id::{ClusterId, ModelId};
pub use model::{ClusterStats, Model, PublishedModel, ServerTypeStats};
pub use watch::{DiffBatch, Mutation, MutationKind, WatchCursor, WatchResponse};
