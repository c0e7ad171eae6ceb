//! Cluster address resolution port.

use async_trait::async_trait;

use crate::domain::ClusterId;
use crate::error::Error;

/// Maps a cluster identifier to the address of its registry.
///
/// Resolution may involve I/O (a location service, a file on shared
/// storage), so it is async and is only ever called while dialing.
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Resolve the current registry address for `cluster`.
    ///
    /// Returns [`Error::NotFound`] when the cluster is unknown.
    async fn resolve(&self, cluster: &ClusterId) -> Result<String, Error>;
}
