//! Process-wide registry clients, one per cluster.
//!
//! A [`ClientCache`] is an explicit object: construct one at startup and pass
//! it to whatever needs registry access. Asking for the same cluster twice
//! yields the same [`RegistryClient`], and therefore the same connection
//! and the same address replicas.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::client::RegistryClient;
use crate::adapter::outbound::resolver::StaticResolver;
use crate::domain::{ClusterId, ModelId};
use crate::error::Result;
use crate::infrastructure::config::registry::RegistryConfig;
use crate::infrastructure::config::retry::RetryConfig;
use crate::infrastructure::config::settings::Config;
use crate::port::{AddressResolver, Dialer};

/// Get-or-create cache of [`RegistryClient`]s keyed by cluster.
pub struct ClientCache {
    resolver: Arc<dyn AddressResolver>,
    dialer: Arc<dyn Dialer>,
    registry: RegistryConfig,
    retry: RetryConfig,
    clients: Mutex<HashMap<ClusterId, Arc<RegistryClient>>>,
}

impl ClientCache {
    pub fn new(
        resolver: Arc<dyn AddressResolver>,
        dialer: Arc<dyn Dialer>,
        registry: RegistryConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            resolver,
            dialer,
            registry,
            retry,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Build a cache that resolves clusters from `config.clusters`.
    pub fn from_config(config: &Config, dialer: Arc<dyn Dialer>) -> Self {
        Self::new(
            Arc::new(StaticResolver::from_config(config)),
            dialer,
            config.registry.clone(),
            config.retry.clone(),
        )
    }

    /// Return the client for `cluster`, creating it on first use.
    ///
    /// Never performs network I/O.
    pub fn get_or_create(&self, cluster: &ClusterId) -> Arc<RegistryClient> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(cluster) {
            return client.clone();
        }

        debug!(cluster = %cluster, "Creating registry client");
        let client = Arc::new(RegistryClient::new(
            cluster.clone(),
            self.resolver.clone(),
            self.dialer.clone(),
            self.registry.clone(),
            self.retry.clone(),
        ));
        clients.insert(cluster.clone(), client.clone());
        client
    }

    /// Shorthand for [`get_or_create`](Self::get_or_create).
    pub fn open(&self, cluster: impl Into<ClusterId>) -> Arc<RegistryClient> {
        self.get_or_create(&cluster.into())
    }

    /// Pick up to `want` addresses serving `model` in `cluster`.
    ///
    /// See [`RegistryClient::resolve_addresses`].
    ///
    /// # Errors
    ///
    /// Only [`Error::Internal`](crate::error::Error::Internal), when a new
    /// watch has to be started outside a Tokio runtime.
    pub fn resolve_addresses(
        &self,
        cluster: &ClusterId,
        model: &ModelId,
        want: usize,
    ) -> Result<Vec<String>> {
        self.get_or_create(cluster).resolve_addresses(model, want)
    }

    /// Number of clusters with a client.
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
