//! Test doubles and common utilities for contract tests
//!
//! This module provides minimal test doubles for the store and timer
//! collaborators, plus builders for records.

#![allow(dead_code)]

use regstore_core::config::ManagerConfig;
use regstore_core::error::{Error, Result};
use regstore_core::model::{Binding, Subscription};
use regstore_core::store::MemoryKvStore;
use regstore_core::traits::{KvStore, TimerRequest, TimerService, VersionedValue};
use regstore_core::{RegistrationEvent, RegistrationManager};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

pub const ALICE: &str = "sip:alice@example.com";

/// A timer service call as seen by the double
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerCall {
    Create(TimerRequest),
    Update(String, TimerRequest),
    Delete(String),
}

/// A TimerService that records every call and can be made to fail
pub struct RecordingTimerService {
    create_count: Arc<AtomicUsize>,
    update_count: Arc<AtomicUsize>,
    delete_count: Arc<AtomicUsize>,
    calls: Arc<std::sync::Mutex<Vec<TimerCall>>>,
    failing: Arc<AtomicBool>,
    delay: Option<Duration>,
}

impl RecordingTimerService {
    pub fn new() -> Self {
        Self {
            create_count: Arc::new(AtomicUsize::new(0)),
            update_count: Arc::new(AtomicUsize::new(0)),
            delete_count: Arc::new(AtomicUsize::new(0)),
            calls: Arc::new(std::sync::Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
            delay: None,
        }
    }

    /// Delay every call by `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Create a new RecordingTimerService that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            create_count: Arc::clone(&other.create_count),
            update_count: Arc::clone(&other.update_count),
            delete_count: Arc::clone(&other.delete_count),
            calls: Arc::clone(&other.calls),
            failing: Arc::clone(&other.failing),
            delay: other.delay,
        }
    }

    /// Make every subsequent call fail (or succeed again)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn create_count(&self) -> usize {
        self.create_count.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_count.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.delete_count.load(Ordering::SeqCst)
    }

    /// Total number of calls of any kind
    pub fn total_calls(&self) -> usize {
        self.create_count() + self.update_count() + self.delete_count()
    }

    pub fn calls(&self) -> Vec<TimerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// The most recent call, if any
    pub fn last_call(&self) -> Option<TimerCall> {
        self.calls.lock().unwrap().last().cloned()
    }

    async fn answer(&self) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::timer_service("503 Service Unavailable"));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl TimerService for RecordingTimerService {
    async fn create(&self, request: &TimerRequest) -> Result<String> {
        let n = self.create_count.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls
            .lock()
            .unwrap()
            .push(TimerCall::Create(request.clone()));
        self.answer().await?;
        Ok(format!("timer-{}", n))
    }

    async fn update(&self, timer_id: &str, request: &TimerRequest) -> Result<()> {
        self.update_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push(TimerCall::Update(timer_id.to_string(), request.clone()));
        self.answer().await
    }

    async fn delete(&self, timer_id: &str) -> Result<()> {
        self.delete_count.fetch_add(1, Ordering::SeqCst);
        self.calls
            .lock()
            .unwrap()
            .push(TimerCall::Delete(timer_id.to_string()));
        self.answer().await
    }

    fn service_name(&self) -> &'static str {
        "recording"
    }
}

/// A KvStore that answers every call after a fixed delay
pub struct SlowStore {
    inner: MemoryKvStore,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: MemoryKvStore, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait::async_trait]
impl KvStore for SlowStore {
    async fn fetch(&self, key: &str) -> Result<Option<VersionedValue>> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch(key).await
    }

    async fn write_if_match(&self, key: &str, data: &[u8], version: u64) -> Result<u64> {
        tokio::time::sleep(self.delay).await;
        self.inner.write_if_match(key, data, version).await
    }

    async fn delete_if_match(&self, key: &str, version: u64) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete_if_match(key, version).await
    }

    fn store_name(&self) -> &'static str {
        "slow"
    }
}

/// A KvStore whose backend is down
pub struct FailingStore {
    call_count: Arc<AtomicUsize>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self {
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            call_count: Arc::clone(&other.call_count),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        Err(Error::store_unavailable("connection refused"))
    }
}

#[async_trait::async_trait]
impl KvStore for FailingStore {
    async fn fetch(&self, _key: &str) -> Result<Option<VersionedValue>> {
        self.fail()
    }

    async fn write_if_match(&self, _key: &str, _data: &[u8], _version: u64) -> Result<u64> {
        self.fail()
    }

    async fn delete_if_match(&self, _key: &str, _version: u64) -> Result<()> {
        self.fail()
    }

    fn store_name(&self) -> &'static str {
        "failing"
    }
}

/// Current time in epoch seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// A fully populated binding expiring at `expires`
pub fn contact(uri: &str, expires: i64) -> Binding {
    Binding {
        uri: uri.to_string(),
        call_id: format!("{}-call", uri),
        cseq: 1,
        expires,
        priority: 1000,
        path_uris: vec!["sip:edge.example.com;lr".to_string()],
        path_headers: vec!["<sip:edge.example.com;lr>".to_string()],
        params: [("reg-id".to_string(), "1".to_string())].into_iter().collect(),
        private_id: "alice@example.com".to_string(),
        emergency_registration: false,
    }
}

/// A reg-event subscription expiring at `expires`
pub fn subscription(expires: i64) -> Subscription {
    Subscription {
        req_uri: "sip:scscf.example.com".to_string(),
        from_uri: "sip:alice@example.com".to_string(),
        from_tag: "from-tag".to_string(),
        to_uri: "sip:alice@example.com".to_string(),
        to_tag: "to-tag".to_string(),
        call_id: "sub-call".to_string(),
        route_uris: vec!["sip:pcscf.example.com;lr".to_string()],
        expires,
    }
}

/// Manager config with short timeouts for tests
pub fn test_config() -> ManagerConfig {
    ManagerConfig {
        store_timeout_ms: 200,
        timer_timeout_ms: 200,
        event_channel_capacity: 100,
    }
}

/// Build a manager over a shared memory store and a recording timer service
pub fn manager_with(
    store: &MemoryKvStore,
    timers: &RecordingTimerService,
) -> (RegistrationManager, mpsc::Receiver<RegistrationEvent>) {
    RegistrationManager::new(
        Box::new(store.clone()),
        Box::new(RecordingTimerService::sharing_counters_with(timers)),
        test_config(),
    )
    .expect("manager construction succeeds")
}

/// Add one binding to `aor_key` through a full read/modify/write
pub async fn register(manager: &RegistrationManager, aor_key: &str, id: &str, binding: Binding) {
    let mut pair = manager
        .get_aor_data(aor_key)
        .await
        .expect("read succeeds");
    *pair.current_mut().get_binding(id) = binding;
    assert!(
        manager.set_aor_data(aor_key, &[], &mut pair).await,
        "registration write should succeed"
    );
}

/// Drain every event currently queued
pub fn drain(rx: &mut mpsc::Receiver<RegistrationEvent>) -> Vec<RegistrationEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
