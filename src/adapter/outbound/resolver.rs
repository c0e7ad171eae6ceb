//! Table-driven cluster address resolution.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::ClusterId;
use crate::error::Error;
use crate::infrastructure::config::settings::Config;
use crate::port::AddressResolver;

/// Resolves clusters from a fixed table, typically the `[clusters]` section
/// of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    addresses: HashMap<ClusterId, String>,
}

impl StaticResolver {
    pub fn new<I, C, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (C, A)>,
        C: Into<ClusterId>,
        A: Into<String>,
    {
        Self {
            addresses: entries
                .into_iter()
                .map(|(cluster, address)| (cluster.into(), address.into()))
                .collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config
                .clusters
                .iter()
                .map(|(cluster, address)| (cluster.as_str(), address.as_str())),
        )
    }

    /// Point `cluster` at a new address, e.g. after a registry failover.
    pub fn set(&mut self, cluster: impl Into<ClusterId>, address: impl Into<String>) {
        self.addresses.insert(cluster.into(), address.into());
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn resolve(&self, cluster: &ClusterId) -> Result<String, Error> {
        self.addresses
            .get(cluster)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no registry address for cluster {cluster}")))
    }
}
