//! Integration tests for modelet address discovery.
//!
//! Routers call `resolve_addresses` synchronously; these tests check that
//! the background watch converges the local replica onto the registry's
//! address set and forgets models the registry no longer knows.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use modelet_admin::testkit;
use modelet_admin::testkit::registry::FakeRegistry;
use modelet_admin::testkit::wait::eventually;
use modelet_admin::{ClientCache, ClusterId, Error, ModelId};

fn cache(fake: &Arc<FakeRegistry>) -> ClientCache {
    ClientCache::new(
        fake.clone(),
        fake.clone(),
        testkit::config::registry(),
        testkit::config::retry(),
    )
}

fn set(addrs: Vec<String>) -> HashSet<String> {
    addrs.into_iter().collect()
}

fn expected(addrs: &[&str]) -> HashSet<String> {
    addrs.iter().map(|a| a.to_string()).collect()
}

// ---------------------------------------------------------------------------
// Convergence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_lookup_is_empty_then_converges() {
    let fake = FakeRegistry::new();
    fake.hold_dials();
    fake.publish_model(testkit::registry::model("lm"), &["a:1", "b:1", "c:1"]);
    let cache = cache(&fake);
    let cluster = ClusterId::from("/cells/test");
    let lm = ModelId::from("lm");

    assert!(cache.resolve_addresses(&cluster, &lm, 2).unwrap().is_empty());

    fake.release_dials();
    assert!(eventually(|| cache.resolve_addresses(&cluster, &lm, 3).unwrap().len() == 3).await);
    assert_eq!(
        set(cache.resolve_addresses(&cluster, &lm, 10).unwrap()),
        expected(&["a:1", "b:1", "c:1"])
    );
}

#[tokio::test]
async fn partial_lookup_draws_from_replica() {
    let fake = FakeRegistry::new();
    fake.publish_model(testkit::registry::model("lm"), &["a:1", "b:1", "c:1", "d:1"]);
    let client = cache(&fake).open("/cells/test");
    let lm = ModelId::from("lm");

    client.resolve_addresses(&lm, 1).unwrap();
    assert!(eventually(|| client.resolve_addresses(&lm, 4).unwrap().len() == 4).await);

    let all = expected(&["a:1", "b:1", "c:1", "d:1"]);
    for _ in 0..20 {
        let picked = client.resolve_addresses(&lm, 2).unwrap();
        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|p| all.contains(p)));
    }
}

#[tokio::test]
async fn replica_follows_adds_and_removes() {
    let fake = FakeRegistry::new();
    fake.publish_model(testkit::registry::model("lm"), &["a:1", "b:1"]);
    let client = cache(&fake).open("/cells/test");
    let lm = ModelId::from("lm");

    client.resolve_addresses(&lm, 1).unwrap();
    assert!(eventually(|| client.replica_sizes().get(&lm) == Some(&2)).await);

    fake.add_address(&lm, "c:1");
    fake.remove_address(&lm, "a:1");
    fake.add_address(&lm, "d:1");

    assert!(
        eventually(|| set(client.resolve_addresses(&lm, 10).unwrap())
            == expected(&["b:1", "c:1", "d:1"]))
        .await
    );
}

#[tokio::test]
async fn registry_failover_replaces_replica_with_snapshot() {
    let fake = FakeRegistry::new();
    fake.publish_model(testkit::registry::model("lm"), &["a:1", "b:1"]);
    let client = cache(&fake).open("/cells/test");
    let lm = ModelId::from("lm");

    client.resolve_addresses(&lm, 1).unwrap();
    assert!(eventually(|| client.replica_sizes().get(&lm) == Some(&2)).await);

    fake.restart_with(&lm, &["x:1"]);

    assert!(eventually(|| client.resolve_addresses(&lm, 5).unwrap() == ["x:1"]).await);
    assert_eq!(client.watches_started(), 1);
}

#[tokio::test]
async fn watch_survives_connection_loss() {
    let fake = FakeRegistry::new();
    fake.publish_model(testkit::registry::model("lm"), &["a:1"]);
    let client = cache(&fake).open("/cells/test");
    let lm = ModelId::from("lm");

    client.resolve_addresses(&lm, 1).unwrap();
    assert!(eventually(|| client.replica_sizes().get(&lm) == Some(&1)).await);

    fake.drop_connections();
    fake.add_address(&lm, "b:1");

    assert!(eventually(|| client.replica_sizes().get(&lm) == Some(&2)).await);
    assert!(fake.dial_count() >= 2);
}

#[tokio::test]
async fn transient_watch_errors_keep_model_tracked() {
    let fake = FakeRegistry::new();
    fake.publish_model(testkit::registry::model("lm"), &["a:1"]);
    let client = cache(&fake).open("/cells/test");
    let lm = ModelId::from("lm");

    client.resolve_addresses(&lm, 1).unwrap();
    assert!(eventually(|| client.replica_sizes().get(&lm) == Some(&1)).await);

    fake.fail_next_calls(vec![
        Error::Internal("lost".into()),
        Error::ResourceExhausted("busy".into()),
    ]);
    fake.add_address(&lm, "b:1");

    assert!(eventually(|| client.replica_sizes().get(&lm) == Some(&2)).await);
    assert_eq!(client.tracked_models(), vec![lm]);
}

#[tokio::test]
async fn unresolvable_cluster_does_not_drop_published_model() {
    let fake = FakeRegistry::new();
    fake.publish_model(testkit::registry::model("lm"), &["a:1", "b:1"]);
    let client = cache(&fake).open("/cells/test");
    let cluster = ClusterId::from("/cells/test");
    let lm = ModelId::from("lm");

    client.resolve_addresses(&lm, 2).unwrap();
    assert!(eventually(|| client.replica_sizes().get(&lm) == Some(&2)).await);

    fake.forget_cluster(&cluster);
    fake.drop_connections();
    let lookups = fake.resolve_count();
    assert!(eventually(|| fake.resolve_count() >= lookups + 3).await);

    assert_eq!(client.tracked_models(), vec![lm.clone()]);
    assert_eq!(set(client.resolve_addresses(&lm, 2).unwrap()), expected(&["a:1", "b:1"]));
    assert_eq!(client.watches_started(), 1);

    fake.remember_cluster(&cluster);
    fake.add_address(&lm, "c:1");
    assert!(eventually(|| client.replica_sizes().get(&lm) == Some(&3)).await);
    assert_eq!(client.watches_started(), 1);
}

// ---------------------------------------------------------------------------
// Watch lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn concurrent_first_lookups_share_one_watch() {
    let fake = FakeRegistry::new();
    fake.publish_model(testkit::registry::model("lm"), &["a:1"]);
    let cache = Arc::new(cache(&fake));
    let cluster = ClusterId::from("/cells/test");
    let lm = ModelId::from("lm");

    let lookups = (0..16).map(|_| {
        let cache = cache.clone();
        let cluster = cluster.clone();
        let lm = lm.clone();
        tokio::spawn(async move { cache.resolve_addresses(&cluster, &lm, 1) })
    });
    for result in join_all(lookups).await {
        result.unwrap().unwrap();
    }

    let client = cache.get_or_create(&cluster);
    assert_eq!(client.watches_started(), 1);
    assert!(eventually(|| fake.open_watches(&lm) == 1).await);
    assert_eq!(fake.dial_count(), 1);
}

#[tokio::test]
async fn unknown_model_is_dropped_and_retried_on_next_lookup() {
    let fake = FakeRegistry::new();
    let client = cache(&fake).open("/cells/test");
    let lm = ModelId::from("lm");

    assert!(client.resolve_addresses(&lm, 1).unwrap().is_empty());
    assert!(eventually(|| client.tracked_models().is_empty()).await);

    fake.publish_model(testkit::registry::model("lm"), &["a:1"]);
    client.resolve_addresses(&lm, 1).unwrap();

    assert!(eventually(|| client.resolve_addresses(&lm, 1).unwrap() == ["a:1"]).await);
    assert_eq!(client.watches_started(), 2);
}

#[tokio::test]
async fn unpublishing_one_model_leaves_others_tracked() {
    let fake = FakeRegistry::new();
    fake.publish_model(testkit::registry::model("a"), &["a:1"]);
    fake.publish_model(testkit::registry::model("b"), &["b:1"]);
    let client = cache(&fake).open("/cells/test");
    let (a, b) = (ModelId::from("a"), ModelId::from("b"));

    client.resolve_addresses(&a, 1).unwrap();
    client.resolve_addresses(&b, 1).unwrap();
    assert!(eventually(|| client.replica_sizes().len() == 2
        && client.replica_sizes().values().all(|n| *n == 1))
    .await);

    client.unpublish(&a).await.unwrap();

    assert!(eventually(|| client.tracked_models() == vec![b.clone()]).await);
    assert!(eventually(|| fake.open_watches(&a) == 0).await);
    assert_eq!(client.resolve_addresses(&b, 1).unwrap(), ["b:1"]);
}
