//! Background replication of one model's address set.
//!
//! Two tasks cooperate per model:
//!
//! - the **producer** long-polls the registry's watch call through the
//!   retry executor and pushes each diff batch onto a bounded channel;
//! - the **consumer** drains the channel into the model's
//!   [`AddressReplica`] in receive order.
//!
//! The pair runs until the registry reports the model as not found. The
//! producer then sends a terminal [`WatchUpdate::Gone`], and the consumer
//! removes the replica from its client's map so that the next resolution
//! starts over from scratch. Nothing else stops them.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::replica::AddressReplica;
use crate::domain::{DiffBatch, ModelId, WatchCursor};
use crate::error::Error;
use crate::infrastructure::retry::RetryExecutor;

/// Replicas of one client, keyed by model.
pub(crate) type ReplicaMap = Mutex<HashMap<ModelId, Arc<AddressReplica>>>;

/// Message from a model's producer to its consumer.
#[derive(Debug)]
pub(crate) enum WatchUpdate {
    Batch(DiffBatch),
    /// The model is gone; no further updates follow.
    Gone(Error),
}

/// Spawn the producer/consumer pair for `replica`.
///
/// Both tasks are detached. The caller must hold the `replicas` lock and have
/// just inserted `replica`, so that each replica gets exactly one pair.
pub(crate) fn spawn(
    replica: Arc<AddressReplica>,
    replicas: Arc<ReplicaMap>,
    executor: RetryExecutor,
    retry_delay: Duration,
    channel_capacity: usize,
) {
    let (tx, rx) = mpsc::channel(channel_capacity);
    let model_id = replica.model_id().clone();

    tokio::spawn(produce(model_id, executor, retry_delay, tx));
    tokio::spawn(consume(replica, replicas, rx));
}

async fn produce(
    model_id: ModelId,
    executor: RetryExecutor,
    retry_delay: Duration,
    tx: mpsc::Sender<WatchUpdate>,
) {
    let cluster = executor.connections().cluster().clone();
    let mut cursor = WatchCursor::default();
    info!(cluster = %cluster, model = %model_id, "Address watch starting");

    loop {
        // Any failed attempt, even one the executor retries on its own,
        // means the next attempt asks for a full snapshot.
        let mut resume = true;
        let result = executor
            .execute(None, |stub| {
                let request = if std::mem::take(&mut resume) {
                    cursor.clone()
                } else {
                    WatchCursor::default()
                };
                let model_id = model_id.clone();
                async move { stub.watch(&model_id, &request).await }
            })
            .await;

        match result {
            Ok(response) => {
                let next = response.next_cursor();
                if !cursor.registry_instance.is_empty()
                    && cursor.registry_instance != next.registry_instance
                {
                    info!(
                        cluster = %cluster,
                        model = %model_id,
                        from = %cursor.registry_instance,
                        to = %next.registry_instance,
                        "Registry instance changed"
                    );
                }
                if tx.send(WatchUpdate::Batch(response.batch)).await.is_err() {
                    debug!(model = %model_id, "Replica consumer gone, stopping address watch");
                    return;
                }
                cursor = next;
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    cluster = %cluster,
                    model = %model_id,
                    error = %e,
                    "Model no longer published, stopping address watch"
                );
                let _ = tx.send(WatchUpdate::Gone(e)).await;
                return;
            }
            Err(e) => {
                error!(
                    cluster = %cluster,
                    model = %model_id,
                    error = %e,
                    "Address watch failed, resubscribing from scratch"
                );
                cursor.reset();
                sleep(retry_delay).await;
            }
        }
    }
}

async fn consume(
    replica: Arc<AddressReplica>,
    replicas: Arc<ReplicaMap>,
    mut rx: mpsc::Receiver<WatchUpdate>,
) {
    while let Some(update) = rx.recv().await {
        match update {
            WatchUpdate::Batch(batch) => replica.apply(&batch),
            WatchUpdate::Gone(reason) => {
                let model_id = replica.model_id();
                let mut map = replicas.lock();
                if map
                    .get(model_id)
                    .is_some_and(|current| Arc::ptr_eq(current, &replica))
                {
                    map.remove(model_id);
                }
                info!(model = %model_id, reason = %reason, "Dropped address replica");
                return;
            }
        }
    }
    debug!(model = %replica.model_id(), "Address watch channel closed");
}
