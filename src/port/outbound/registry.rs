//! Registry RPC port.
//!
//! [`Dialer`] opens a connection to a registry address and hands back a
//! [`RegistryStub`]; the stub is shared by every operation of one client
//! until the connection is poisoned, at which point it is closed and a new
//! one is dialed.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ClusterStats, Model, ModelId, PublishedModel, WatchCursor, WatchResponse};
use crate::error::Error;

/// Registry operations over one open connection.
///
/// Implementations map transport failures to [`Error::Unavailable`] so the
/// retry executor knows to discard the connection.
#[async_trait]
pub trait RegistryStub: Send + Sync {
    async fn publish(&self, model: &Model) -> Result<(), Error>;

    async fn update(&self, model: &Model) -> Result<(), Error>;

    async fn unpublish(&self, model_id: &ModelId) -> Result<(), Error>;

    /// List published models. `None` lists every model.
    async fn list(&self, model_id: Option<&ModelId>) -> Result<Vec<PublishedModel>, Error>;

    async fn stats(&self, model_id: &ModelId) -> Result<ClusterStats, Error>;

    /// Long-poll for changes to `model_id`'s address set after `cursor`.
    ///
    /// Returns [`Error::NotFound`] once the model is no longer published.
    async fn watch(&self, model_id: &ModelId, cursor: &WatchCursor)
        -> Result<WatchResponse, Error>;

    /// Close the underlying connection. In-flight calls may fail afterwards.
    fn close(&self);
}

/// Opens registry connections.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Connect to the registry at `address`.
    ///
    /// The caller bounds this call with its own dial timeout.
    async fn dial(&self, address: &str) -> Result<Arc<dyn RegistryStub>, Error>;
}
