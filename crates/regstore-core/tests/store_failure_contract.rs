//! Contract Test: Corrupt Records and Store Failures
//!
//! This test verifies that bad data and a bad store are reported, never
//! papered over.
//!
//! Constraints verified:
//! - A corrupt payload fails the read with CorruptRecord, never an empty AoR
//! - A store failure or timeout fails the read with StoreUnavailable
//! - A store failure or timeout makes the write return false

mod common;

use common::*;
use regstore_core::error::ErrorKind;
use regstore_core::store::MemoryKvStore;
use regstore_core::traits::KvStore;
use regstore_core::{AorPair, RegistrationManager};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

async fn seed_raw(store: &MemoryKvStore, payload: &[u8]) {
    store
        .write_if_match(ALICE, payload, 0)
        .await
        .expect("seed write succeeds");
}

#[tokio::test]
async fn payload_without_bindings_is_corrupt() {
    let store = MemoryKvStore::new();
    let timers = RecordingTimerService::new();
    let (manager, _events) = manager_with(&store, &timers);

    seed_raw(&store, b"{}").await;

    let err = assert_err!(manager.get_aor_data(ALICE).await);
    assert_eq!(err.kind(), ErrorKind::CorruptRecord);
    assert!(err.to_string().contains(ALICE));
}

#[tokio::test]
async fn malformed_and_mistyped_payloads_are_corrupt() {
    let cases: [&[u8]; 4] = [
        b"not json at all",
        b"{\"bindings\":{}",
        b"{\"bindings\":{},\"notify_cseq\":\"three\"}",
        b"{\"bindings\":{\"b1\":{\"uri\":\"sip:a\",\"cid\":\"c\",\"cseq\":\"1\"}}}",
    ];

    for payload in cases {
        let store = MemoryKvStore::new();
        let timers = RecordingTimerService::new();
        let (manager, _events) = manager_with(&store, &timers);
        seed_raw(&store, payload).await;

        let err = assert_err!(manager.get_aor_data(ALICE).await);
        assert_eq!(
            err.kind(),
            ErrorKind::CorruptRecord,
            "payload {:?}",
            String::from_utf8_lossy(payload)
        );
    }
}

#[tokio::test]
async fn minimal_valid_payload_is_an_empty_aor() {
    let store = MemoryKvStore::new();
    let timers = RecordingTimerService::new();
    let (manager, _events) = manager_with(&store, &timers);

    seed_raw(&store, b"{\"bindings\":{}}").await;

    let pair: AorPair = assert_ok!(manager.get_aor_data(ALICE).await);
    assert!(pair.original().is_empty());
    assert_eq!(pair.original().notify_cseq(), 1);
    assert!(pair.original().version_token() > 0);
}

#[tokio::test]
async fn store_failure_fails_read_and_write() {
    let failing = FailingStore::new();
    let timers = RecordingTimerService::new();
    let (manager, _events) = RegistrationManager::new(
        Box::new(FailingStore::sharing_counters_with(&failing)),
        Box::new(RecordingTimerService::sharing_counters_with(&timers)),
        test_config(),
    )
    .unwrap();

    let err = assert_err!(manager.get_aor_data(ALICE).await);
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

    let mut pair = AorPair::new(regstore_core::Aor::new(ALICE));
    *pair.current_mut().get_binding("b1") = contact("sip:alice@192.0.2.1", now() + 300);
    let before = pair.current().clone();

    assert!(!manager.set_aor_data(ALICE, &[], &mut pair).await);
    assert_eq!(pair.current(), &before);
    assert_eq!(failing.call_count(), 2);
}

#[tokio::test]
async fn slow_store_times_out() {
    let inner = MemoryKvStore::new();
    let timers = RecordingTimerService::new();
    let (manager, _events) = RegistrationManager::new(
        Box::new(SlowStore::new(inner.clone(), Duration::from_millis(500))),
        Box::new(RecordingTimerService::sharing_counters_with(&timers)),
        test_config(),
    )
    .unwrap();

    let err = assert_err!(manager.get_aor_data(ALICE).await);
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);

    let mut pair = AorPair::new(regstore_core::Aor::new(ALICE));
    *pair.current_mut().get_binding("b1") = contact("sip:alice@192.0.2.1", now() + 300);
    assert!(!manager.set_aor_data(ALICE, &[], &mut pair).await);
    assert_eq!(pair.current().timer_id(), "");
}
