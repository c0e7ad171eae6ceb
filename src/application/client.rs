//! Registry client for one cluster.
//!
//! Administrative calls go straight through the retry executor with a fixed
//! deadline. Address resolution reads a locally replicated address set that
//! a background watch keeps in sync, so lookups never wait on the network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, info};

use super::replica::AddressReplica;
use super::watch::{self, ReplicaMap};
use crate::domain::{ClusterId, ClusterStats, Model, ModelId, PublishedModel};
use crate::error::{Error, Result};
use crate::infrastructure::config::registry::RegistryConfig;
use crate::infrastructure::config::retry::RetryConfig;
use crate::infrastructure::connection::ConnectionManager;
use crate::infrastructure::retry::RetryExecutor;
use crate::port::{AddressResolver, Dialer};

/// Client for one cluster's registry.
///
/// Construction performs no I/O; the registry connection is dialed on first
/// use and shared by every call made through this client.
pub struct RegistryClient {
    cluster: ClusterId,
    executor: RetryExecutor,
    config: RegistryConfig,
    replicas: Arc<ReplicaMap>,
    watches_started: AtomicU64,
}

impl RegistryClient {
    pub fn new(
        cluster: ClusterId,
        resolver: Arc<dyn AddressResolver>,
        dialer: Arc<dyn Dialer>,
        config: RegistryConfig,
        retry: RetryConfig,
    ) -> Self {
        let connections = Arc::new(ConnectionManager::new(
            cluster.clone(),
            resolver,
            dialer,
            config.dial_timeout(),
        ));
        Self {
            cluster,
            executor: RetryExecutor::new(connections, retry),
            config,
            replicas: Arc::new(ReplicaMap::default()),
            watches_started: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn cluster(&self) -> &ClusterId {
        &self.cluster
    }

    /// Connection state shared by this client's calls.
    #[must_use]
    pub fn connections(&self) -> &ConnectionManager {
        self.executor.connections()
    }

    fn admin_deadline(&self) -> Option<Instant> {
        Some(Instant::now() + self.config.admin_timeout())
    }

    /// Publish a new model.
    pub async fn publish(
        &self,
        model_id: &ModelId,
        model_path: &str,
        checkpoint_path: &str,
        replicas: u32,
    ) -> Result<()> {
        let model = Model::new(model_id.clone(), model_path, checkpoint_path, replicas);
        info!(cluster = %self.cluster, model = %model_id, replicas, "Publishing model");
        self.executor
            .execute(self.admin_deadline(), |stub| {
                let model = &model;
                async move { stub.publish(model).await }
            })
            .await
    }

    /// Replace the definition of a published model.
    pub async fn update(&self, model: &Model) -> Result<()> {
        info!(cluster = %self.cluster, model = %model.model_id, "Updating model");
        self.executor
            .execute(self.admin_deadline(), |stub| async move {
                stub.update(model).await
            })
            .await
    }

    pub async fn unpublish(&self, model_id: &ModelId) -> Result<()> {
        info!(cluster = %self.cluster, model = %model_id, "Unpublishing model");
        self.executor
            .execute(self.admin_deadline(), |stub| async move {
                stub.unpublish(model_id).await
            })
            .await
    }

    /// Status of one published model.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] unless the registry reports exactly one
    /// matching model.
    pub async fn list(&self, model_id: &ModelId) -> Result<PublishedModel> {
        let mut models = self
            .executor
            .execute(self.admin_deadline(), |stub| async move {
                stub.list(Some(model_id)).await
            })
            .await?;

        if models.len() != 1 {
            return Err(Error::NotFound(format!(
                "one model expected for {model_id} but found {}",
                models.len()
            )));
        }
        Ok(models.remove(0))
    }

    /// Status of every published model.
    pub async fn list_all(&self) -> Result<Vec<PublishedModel>> {
        self.executor
            .execute(self.admin_deadline(), |stub| async move { stub.list(None).await })
            .await
    }

    pub async fn stats(&self, model_id: &ModelId) -> Result<ClusterStats> {
        self.executor
            .execute(self.admin_deadline(), |stub| async move {
                stub.stats(model_id).await
            })
            .await
    }

    /// Pick up to `want` modelet addresses serving `model_id`.
    ///
    /// The first call for a model starts replicating its address set in the
    /// background and typically returns nothing; later calls read the
    /// replica. Duplicates are possible when fewer than all addresses are
    /// requested.
    ///
    /// Registry trouble never surfaces here: the background watch retries on
    /// its own and the replica keeps serving its last known addresses.
    ///
    /// # Errors
    ///
    /// The only error is [`Error::Internal`], returned when the call is made
    /// outside a Tokio runtime and the model's watch has to be started.
    pub fn resolve_addresses(&self, model_id: &ModelId, want: usize) -> Result<Vec<String>> {
        let replica = self.replica_or_watch(model_id)?;
        Ok(replica.sample(want))
    }

    fn replica_or_watch(&self, model_id: &ModelId) -> Result<Arc<AddressReplica>> {
        let mut replicas = self.replicas.lock();
        if let Some(replica) = replicas.get(model_id) {
            return Ok(replica.clone());
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::Internal(
                "address watch requires a Tokio runtime".to_string(),
            ));
        }

        debug!(cluster = %self.cluster, model = %model_id, "First lookup, starting address watch");
        let replica = Arc::new(AddressReplica::new(model_id.clone()));
        replicas.insert(model_id.clone(), replica.clone());
        watch::spawn(
            replica.clone(),
            self.replicas.clone(),
            self.executor.clone(),
            self.config.watch_retry_delay(),
            self.config.watch_channel_capacity,
        );
        self.watches_started.fetch_add(1, Ordering::Relaxed);
        Ok(replica)
    }

    /// Models whose address sets are currently replicated.
    #[must_use]
    pub fn tracked_models(&self) -> Vec<ModelId> {
        let mut models: Vec<_> = self.replicas.lock().keys().cloned().collect();
        models.sort();
        models
    }

    /// Number of address watches started over this client's lifetime.
    #[must_use]
    pub fn watches_started(&self) -> u64 {
        self.watches_started.load(Ordering::Relaxed)
    }

    /// Snapshot of replica sizes per model.
    #[must_use]
    pub fn replica_sizes(&self) -> HashMap<ModelId, usize> {
        self.replicas
            .lock()
            .iter()
            .map(|(model, replica)| (model.clone(), replica.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testkit;
    use crate::testkit::registry::FakeRegistry;
    use crate::testkit::wait::eventually;

    fn client(fake: &Arc<FakeRegistry>) -> RegistryClient {
        RegistryClient::new(
            ClusterId::from("/cells/test"),
            fake.clone(),
            fake.clone(),
            testkit::config::registry(),
            testkit::config::retry(),
        )
    }

    #[test]
    fn test_new_client_is_idle() {
        let fake = FakeRegistry::new();
        let c = client(&fake);

        assert!(!c.connections().is_connected());
        assert!(c.tracked_models().is_empty());
        assert_eq!(fake.dial_count(), 0);
    }

    #[test]
    fn test_resolve_outside_runtime_fails() {
        let fake = FakeRegistry::new();
        let c = client(&fake);

        let err = c.resolve_addresses(&ModelId::from("lm"), 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(c.tracked_models().is_empty());
    }

    #[tokio::test]
    async fn test_publish_then_list() {
        let fake = FakeRegistry::new();
        let c = client(&fake);
        let model_id = ModelId::from("lm");

        c.publish(&model_id, "/models/lm", "/ckpt/lm", 3).await.unwrap();
        let published = c.list(&model_id).await.unwrap();

        assert_eq!(published.model.model_path, "/models/lm");
        assert_eq!(published.model.checkpoint_path, "/ckpt/lm");
        assert_eq!(published.model.requested_replicas, 3);
    }

    #[tokio::test]
    async fn test_list_unknown_model_is_not_found() {
        let fake = FakeRegistry::new();
        let c = client(&fake);

        let err = c.list(&ModelId::from("missing")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("found 0"));
    }

    #[tokio::test]
    async fn test_update_and_unpublish() {
        let fake = FakeRegistry::new();
        let c = client(&fake);
        let model_id = ModelId::from("lm");
        c.publish(&model_id, "/models/lm", "/ckpt/1", 1).await.unwrap();

        let mut model = c.list(&model_id).await.unwrap().model;
        model.checkpoint_path = "/ckpt/2".to_string();
        c.update(&model).await.unwrap();
        assert_eq!(c.list(&model_id).await.unwrap().model.checkpoint_path, "/ckpt/2");

        c.unpublish(&model_id).await.unwrap();
        assert!(c.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stats_reports_serving_replicas() {
        let fake = FakeRegistry::new();
        fake.publish_model(testkit::registry::model("lm"), &["a:1", "b:1"]);
        let c = client(&fake);

        let stats = c.stats(&ModelId::from("lm")).await.unwrap();
        assert_eq!(stats.total_replicas(), 2);
    }

    #[tokio::test]
    async fn test_admin_calls_share_one_connection() {
        let fake = FakeRegistry::new();
        let c = client(&fake);
        c.publish(&ModelId::from("a"), "/m/a", "/c/a", 1).await.unwrap();
        c.publish(&ModelId::from("b"), "/m/b", "/c/b", 1).await.unwrap();
        c.list_all().await.unwrap();

        assert_eq!(fake.dial_count(), 1);
    }

    #[tokio::test]
    async fn test_first_resolve_starts_watch_and_converges() {
        let fake = FakeRegistry::new();
        fake.publish_model(testkit::registry::model("lm"), &["a:1", "b:1", "c:1"]);
        let c = client(&fake);
        let model_id = ModelId::from("lm");

        c.resolve_addresses(&model_id, 2).unwrap();
        assert_eq!(c.tracked_models(), vec![model_id.clone()]);

        assert!(eventually(|| c.resolve_addresses(&model_id, 4).unwrap().len() == 3).await);
        assert_eq!(c.watches_started(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_resolves_start_one_watch() {
        let fake = FakeRegistry::new();
        fake.publish_model(testkit::registry::model("lm"), &["a:1"]);
        let c = Arc::new(client(&fake));
        let model_id = ModelId::from("lm");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = c.clone();
                let model_id = model_id.clone();
                tokio::spawn(async move { c.resolve_addresses(&model_id, 1) })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(c.watches_started(), 1);
        assert!(eventually(|| c.replica_sizes().get(&model_id) == Some(&1)).await);
        assert!(eventually(|| fake.open_watches(&model_id) == 1).await);
    }

    #[tokio::test]
    async fn test_unpublished_model_is_forgotten_then_rewatched() {
        let fake = FakeRegistry::new();
        fake.publish_model(testkit::registry::model("lm"), &["a:1"]);
        let c = client(&fake);
        let model_id = ModelId::from("lm");

        c.resolve_addresses(&model_id, 1).unwrap();
        assert!(eventually(|| c.resolve_addresses(&model_id, 1).unwrap().len() == 1).await);

        fake.unpublish_model(&model_id);
        assert!(eventually(|| c.tracked_models().is_empty()).await);

        fake.publish_model(testkit::registry::model("lm"), &["b:1"]);
        c.resolve_addresses(&model_id, 1).unwrap();
        assert_eq!(c.watches_started(), 2);
        assert!(eventually(|| c.resolve_addresses(&model_id, 1).unwrap() == ["b:1"]).await);
    }
}
