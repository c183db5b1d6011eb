//! Contract Test: Lazy Expiry
//!
//! This test verifies that readers never observe expired state.
//!
//! Constraints verified:
//! - Bindings with `expires <= now` are absent after a read
//! - An AoR with no live binding has no subscriptions
//! - Expired subscriptions are absent while bindings remain
//! - Expiry on read does not touch the store until the next write

mod common;

use common::*;
use regstore_core::codec;
use regstore_core::model::Aor;
use regstore_core::store::MemoryKvStore;
use regstore_core::traits::KvStore;

/// Store `aor` directly, bypassing the manager
async fn seed(store: &MemoryKvStore, aor: &Aor) -> u64 {
    store
        .write_if_match(ALICE, &codec::encode(aor).unwrap(), 0)
        .await
        .expect("seed write succeeds")
}

#[tokio::test]
async fn expired_bindings_are_absent_after_read() {
    let store = MemoryKvStore::new();
    let timers = RecordingTimerService::new();
    let (manager, _events) = manager_with(&store, &timers);

    let t = now();
    let mut aor = Aor::new(ALICE);
    *aor.get_binding("past") = contact("sip:alice@192.0.2.1", t - 10);
    *aor.get_binding("boundary") = contact("sip:alice@192.0.2.2", t);
    *aor.get_binding("live") = contact("sip:alice@192.0.2.3", t + 300);
    let version = seed(&store, &aor).await;

    let pair = manager.get_aor_data(ALICE).await.unwrap();

    let ids: Vec<&String> = pair.original().bindings().keys().collect();
    assert_eq!(ids, vec!["live"]);
    assert_eq!(pair.original(), pair.current());
    assert_eq!(pair.original().version_token(), version);
    assert_eq!(pair.original().uri(), ALICE);

    // Nothing was written back
    let stored = store.fetch(ALICE).await.unwrap().unwrap();
    assert_eq!(stored.version, version);
    assert_eq!(codec::decode(&stored.data).unwrap().bindings().len(), 3);
}

#[tokio::test]
async fn no_live_binding_means_no_subscriptions() {
    let store = MemoryKvStore::new();
    let timers = RecordingTimerService::new();
    let (manager, _events) = manager_with(&store, &timers);

    let t = now();
    let mut aor = Aor::new(ALICE);
    *aor.get_binding("b1") = contact("sip:alice@192.0.2.1", t - 1);
    *aor.get_subscription("s1") = subscription(t + 3600);
    seed(&store, &aor).await;

    let pair = manager.get_aor_data(ALICE).await.unwrap();

    assert!(pair.original().is_empty());
    assert!(pair.original().subscriptions().is_empty());
}

#[tokio::test]
async fn expired_subscriptions_are_dropped_while_bindings_remain() {
    let store = MemoryKvStore::new();
    let timers = RecordingTimerService::new();
    let (manager, _events) = manager_with(&store, &timers);

    let t = now();
    let mut aor = Aor::new(ALICE);
    *aor.get_binding("b1") = contact("sip:alice@192.0.2.1", t + 300);
    *aor.get_subscription("stale") = subscription(t - 5);
    *aor.get_subscription("fresh") = subscription(t + 300);
    seed(&store, &aor).await;

    let pair = manager.get_aor_data(ALICE).await.unwrap();

    let ids: Vec<&String> = pair.original().subscriptions().keys().collect();
    assert_eq!(ids, vec!["fresh"]);
}

#[tokio::test]
async fn missing_record_reads_as_empty_aor() {
    let store = MemoryKvStore::new();
    let timers = RecordingTimerService::new();
    let (manager, _events) = manager_with(&store, &timers);

    let pair = manager.get_aor_data(ALICE).await.unwrap();

    assert_eq!(pair.original().uri(), ALICE);
    assert_eq!(pair.original().version_token(), 0);
    assert_eq!(pair.original().timer_id(), "");
    assert!(pair.original().is_empty());
    assert!(pair.original().subscriptions().is_empty());

    // Writing it back unchanged stores nothing
    let mut pair = pair;
    assert!(manager.set_aor_data(ALICE, &[], &mut pair).await);
    assert!(store.is_empty().await);
    assert_eq!(timers.total_calls(), 0);
}
