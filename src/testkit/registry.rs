//! In-memory registry double.
//!
//! [`FakeRegistry`] plays every external collaborator at once: it is the
//! [`AddressResolver`], the [`Dialer`], and (through the stubs it hands out)
//! the registry itself. Its watch call long-polls like the real service:
//! a caller whose cursor is current blocks until the model's address set
//! changes, the model is unpublished, or the connection is closed.
//!
//! Tests drive it with plain synchronous helpers (`publish_model`,
//! `add_address`, `restart_with`, ...) and script failures with
//! `fail_next_dials` / `fail_next_calls`.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};

use crate::domain::{
    ClusterId, ClusterStats, DiffBatch, Model, ModelId, Mutation, PublishedModel,
    ServerTypeStats, WatchCursor, WatchResponse,
};
use crate::error::{Error, Result};
use crate::port::{AddressResolver, Dialer, RegistryStub};

/// Model definition with conventional paths and one requested replica.
pub fn model(id: &str) -> Model {
    Model::new(id, format!("/models/{id}"), format!("/checkpoints/{id}"), 1)
}

struct ModelEntry {
    model: Model,
    addrs: Vec<String>,
    log: Vec<Mutation>,
    log_start: u64,
}

impl ModelEntry {
    fn new(model: Model, addrs: Vec<String>) -> Self {
        Self {
            model,
            addrs,
            log: Vec::new(),
            log_start: 0,
        }
    }

    fn next_seqno(&self) -> u64 {
        self.log_start + self.log.len() as u64
    }

    fn published(&self) -> PublishedModel {
        PublishedModel {
            model: self.model.clone(),
            modelet_addresses: self.addrs.clone(),
        }
    }
}

struct State {
    instance: String,
    models: BTreeMap<ModelId, ModelEntry>,
}

/// In-memory registry, resolver, and dialer.
pub struct FakeRegistry {
    me: Weak<FakeRegistry>,
    state: Mutex<State>,
    changed: Notify,
    epoch: AtomicU64,
    dial_hold: watch::Sender<bool>,
    dial_failures: Mutex<VecDeque<Error>>,
    call_failures: Mutex<VecDeque<Error>>,
    unknown_clusters: Mutex<HashSet<ClusterId>>,
    resolves: AtomicU32,
    dials: AtomicU32,
    closes: AtomicU32,
    cursors: Mutex<HashMap<ModelId, Vec<WatchCursor>>>,
    open_watches: Mutex<HashMap<ModelId, usize>>,
}

impl FakeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            state: Mutex::new(State {
                instance: uuid::Uuid::new_v4().to_string(),
                models: BTreeMap::new(),
            }),
            changed: Notify::new(),
            epoch: AtomicU64::new(0),
            dial_hold: watch::Sender::new(false),
            dial_failures: Mutex::new(VecDeque::new()),
            call_failures: Mutex::new(VecDeque::new()),
            unknown_clusters: Mutex::new(HashSet::new()),
            resolves: AtomicU32::new(0),
            dials: AtomicU32::new(0),
            closes: AtomicU32::new(0),
            cursors: Mutex::new(HashMap::new()),
            open_watches: Mutex::new(HashMap::new()),
        })
    }

    // -----------------------------------------------------------------------
    // Registry state
    // -----------------------------------------------------------------------

    /// Publish (or republish) `model` served by `addrs`.
    pub fn publish_model(&self, model: Model, addrs: &[&str]) {
        let addrs = addrs.iter().map(|a| a.to_string()).collect();
        self.state
            .lock()
            .models
            .insert(model.model_id.clone(), ModelEntry::new(model, addrs));
        self.changed.notify_waiters();
    }

    pub fn unpublish_model(&self, model_id: &ModelId) {
        self.state.lock().models.remove(model_id);
        self.changed.notify_waiters();
    }

    /// A modelet for `model_id` came up at `addr`.
    pub fn add_address(&self, model_id: &ModelId, addr: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.models.get_mut(model_id) {
            if !entry.addrs.iter().any(|a| a == addr) {
                entry.addrs.push(addr.to_string());
                entry.log.push(Mutation::add(addr));
            }
        }
        drop(state);
        self.changed.notify_waiters();
    }

    /// The modelet for `model_id` at `addr` went away.
    pub fn remove_address(&self, model_id: &ModelId, addr: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.models.get_mut(model_id) {
            if entry.addrs.iter().any(|a| a == addr) {
                entry.addrs.retain(|a| a != addr);
                entry.log.push(Mutation::remove(addr));
            }
        }
        drop(state);
        self.changed.notify_waiters();
    }

    /// Simulate a registry failover: a new instance identity, change logs
    /// lost, and `model_id` now served by `addrs`.
    pub fn restart_with(&self, model_id: &ModelId, addrs: &[&str]) {
        let mut state = self.state.lock();
        state.instance = uuid::Uuid::new_v4().to_string();
        for entry in state.models.values_mut() {
            entry.log_start = entry.next_seqno();
            entry.log.clear();
        }
        if let Some(entry) = state.models.get_mut(model_id) {
            entry.addrs = addrs.iter().map(|a| a.to_string()).collect();
        }
        drop(state);
        self.changed.notify_waiters();
    }

    /// Break every connection handed out so far.
    pub fn drop_connections(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    // -----------------------------------------------------------------------
    // Failure scripting
    // -----------------------------------------------------------------------

    /// The next dials fail with these errors, in order.
    pub fn fail_next_dials(&self, errors: Vec<Error>) {
        self.dial_failures.lock().extend(errors);
    }

    /// The next registry calls (of any kind) fail with these errors, in order.
    pub fn fail_next_calls(&self, errors: Vec<Error>) {
        self.call_failures.lock().extend(errors);
    }

    /// Block dials until [`release_dials`](Self::release_dials).
    pub fn hold_dials(&self) {
        self.dial_hold.send_replace(true);
    }

    pub fn release_dials(&self) {
        self.dial_hold.send_replace(false);
    }

    /// Make `cluster` unresolvable.
    pub fn forget_cluster(&self, cluster: &ClusterId) {
        self.unknown_clusters.lock().insert(cluster.clone());
    }

    /// Undo [`forget_cluster`](Self::forget_cluster).
    pub fn remember_cluster(&self, cluster: &ClusterId) {
        self.unknown_clusters.lock().remove(cluster);
    }

    // -----------------------------------------------------------------------
    // Observations
    // -----------------------------------------------------------------------

    /// Address lookups attempted, successful or not.
    pub fn resolve_count(&self) -> u32 {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn dial_count(&self) -> u32 {
        self.dials.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Watch calls received for `model_id`.
    pub fn watch_calls(&self, model_id: &ModelId) -> usize {
        self.cursors.lock().get(model_id).map_or(0, Vec::len)
    }

    /// Cursors presented by each watch call for `model_id`, in arrival order.
    pub fn cursors(&self, model_id: &ModelId) -> Vec<WatchCursor> {
        self.cursors
            .lock()
            .get(model_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Watch calls for `model_id` currently blocked in the registry.
    pub fn open_watches(&self, model_id: &ModelId) -> usize {
        self.open_watches
            .lock()
            .get(model_id)
            .copied()
            .unwrap_or(0)
    }

    fn take_call_failure(&self) -> Result<()> {
        match self.call_failures.lock().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Answer a watch immediately, or `None` if the cursor is current.
    fn poll_watch(&self, model_id: &ModelId, cursor: &WatchCursor) -> Result<Option<WatchResponse>> {
        let state = self.state.lock();
        let entry = state
            .models
            .get(model_id)
            .ok_or_else(|| Error::NotFound(format!("model {model_id} is not published")))?;
        let next = entry.next_seqno();

        let batch = if cursor.registry_instance != state.instance
            || cursor.seqno < entry.log_start
            || cursor.seqno > next
        {
            DiffBatch::full(entry.addrs.clone(), next)
        } else if cursor.seqno < next {
            let from = (cursor.seqno - entry.log_start) as usize;
            DiffBatch::incremental(entry.log[from..].to_vec(), next)
        } else {
            return Ok(None);
        };

        Ok(Some(WatchResponse {
            registry_instance: state.instance.clone(),
            batch,
        }))
    }
}

/// Counts a watch as open for as long as it is alive.
struct OpenWatch<'a> {
    registry: &'a FakeRegistry,
    model_id: ModelId,
}

impl<'a> OpenWatch<'a> {
    fn new(registry: &'a FakeRegistry, model_id: &ModelId) -> Self {
        *registry
            .open_watches
            .lock()
            .entry(model_id.clone())
            .or_default() += 1;
        Self {
            registry,
            model_id: model_id.clone(),
        }
    }
}

impl Drop for OpenWatch<'_> {
    fn drop(&mut self) {
        if let Some(open) = self.registry.open_watches.lock().get_mut(&self.model_id) {
            *open = open.saturating_sub(1);
        }
    }
}

#[async_trait]
impl AddressResolver for FakeRegistry {
    async fn resolve(&self, cluster: &ClusterId) -> Result<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.unknown_clusters.lock().contains(cluster) {
            return Err(Error::NotFound(format!("unknown cluster {cluster}")));
        }
        Ok(format!("fake://{cluster}"))
    }
}

#[async_trait]
impl Dialer for FakeRegistry {
    async fn dial(&self, _address: &str) -> Result<Arc<dyn RegistryStub>> {
        self.dials.fetch_add(1, Ordering::SeqCst);

        let mut hold = self.dial_hold.subscribe();
        loop {
            let held = *hold.borrow_and_update();
            if !held || hold.changed().await.is_err() {
                break;
            }
        }

        let failure = self.dial_failures.lock().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }

        let registry = self
            .me
            .upgrade()
            .ok_or_else(|| Error::Unavailable("registry shut down".to_string()))?;
        let epoch = registry.epoch.load(Ordering::SeqCst);
        Ok(Arc::new(FakeStub {
            registry,
            epoch,
            closed: AtomicBool::new(false),
        }))
    }
}

/// One open connection to a [`FakeRegistry`].
struct FakeStub {
    registry: Arc<FakeRegistry>,
    epoch: u64,
    closed: AtomicBool,
}

impl FakeStub {
    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst)
            || self.registry.epoch.load(Ordering::SeqCst) != self.epoch
        {
            return Err(Error::Unavailable("connection closed".to_string()));
        }
        Ok(())
    }

    fn begin_call(&self) -> Result<()> {
        self.check_open()?;
        self.registry.take_call_failure()
    }
}

#[async_trait]
impl RegistryStub for FakeStub {
    async fn publish(&self, model: &Model) -> Result<()> {
        self.begin_call()?;
        let mut state = self.registry.state.lock();
        if state.models.contains_key(&model.model_id) {
            return Err(Error::InvalidArgument(format!(
                "model {} is already published",
                model.model_id
            )));
        }
        state.models.insert(
            model.model_id.clone(),
            ModelEntry::new(model.clone(), Vec::new()),
        );
        Ok(())
    }

    async fn update(&self, model: &Model) -> Result<()> {
        self.begin_call()?;
        let mut state = self.registry.state.lock();
        let entry = state
            .models
            .get_mut(&model.model_id)
            .ok_or_else(|| Error::NotFound(format!("model {} is not published", model.model_id)))?;
        entry.model = model.clone();
        Ok(())
    }

    async fn unpublish(&self, model_id: &ModelId) -> Result<()> {
        self.begin_call()?;
        let removed = self.registry.state.lock().models.remove(model_id);
        self.registry.changed.notify_waiters();
        match removed {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("model {model_id} is not published"))),
        }
    }

    async fn list(&self, model_id: Option<&ModelId>) -> Result<Vec<PublishedModel>> {
        self.begin_call()?;
        let state = self.registry.state.lock();
        Ok(match model_id {
            Some(id) => state.models.get(id).map(ModelEntry::published).into_iter().collect(),
            None => state.models.values().map(ModelEntry::published).collect(),
        })
    }

    async fn stats(&self, model_id: &ModelId) -> Result<ClusterStats> {
        self.begin_call()?;
        let state = self.registry.state.lock();
        let entry = state
            .models
            .get(model_id)
            .ok_or_else(|| Error::NotFound(format!("model {model_id} is not published")))?;
        Ok(ClusterStats {
            server_types: vec![ServerTypeStats {
                chip_type: "cpu".to_string(),
                chip_topology: "1".to_string(),
                replicas: entry.addrs.len() as u32,
            }],
        })
    }

    async fn watch(&self, model_id: &ModelId, cursor: &WatchCursor) -> Result<WatchResponse> {
        self.registry
            .cursors
            .lock()
            .entry(model_id.clone())
            .or_default()
            .push(cursor.clone());
        self.begin_call()?;

        let _open = OpenWatch::new(&self.registry, model_id);
        loop {
            let notified = self.registry.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            self.check_open()?;
            if let Some(response) = self.registry.poll_watch(model_id, cursor)? {
                return Ok(response);
            }
            notified.await;
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.registry.closes.fetch_add(1, Ordering::SeqCst);
            self.registry.changed.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stub(fake: &Arc<FakeRegistry>) -> Arc<dyn RegistryStub> {
        fake.dial("fake://test").await.unwrap_or_else(|_| panic!("dial failed"))
    }

    #[tokio::test]
    async fn test_empty_cursor_gets_full_snapshot() {
        let fake = FakeRegistry::new();
        fake.publish_model(model("lm"), &["a", "b"]);
        let stub = stub(&fake).await;

        let resp = stub
            .watch(&ModelId::from("lm"), &WatchCursor::default())
            .await
            .unwrap();
        assert_eq!(resp.batch.snapshot, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[tokio::test]
    async fn test_current_cursor_gets_only_new_mutations() {
        let fake = FakeRegistry::new();
        fake.publish_model(model("lm"), &["a"]);
        let stub = stub(&fake).await;
        let lm = ModelId::from("lm");

        let first = stub.watch(&lm, &WatchCursor::default()).await.unwrap();
        fake.add_address(&lm, "b");
        let second = stub.watch(&lm, &first.next_cursor()).await.unwrap();

        assert!(!second.batch.is_full());
        assert_eq!(second.batch.log, vec![Mutation::add("b")]);
    }

    #[tokio::test]
    async fn test_closed_stub_is_unavailable() {
        let fake = FakeRegistry::new();
        let stub = stub(&fake).await;
        stub.close();

        let err = stub.list(None).await.unwrap_err();
        assert!(err.should_poison());
        assert_eq!(fake.close_count(), 1);
    }
}
