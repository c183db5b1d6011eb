// # Timer Service Trait
//
// Defines the interface to the external timer service that fires a callback
// at an AoR's soonest expiry, so expired registrations are reaped even when
// no client re-reads the record.
//
// ## Implementations
//
// - HTTP (Chronos-style REST API): `regstore-timer-http` crate
//
// ## Usage
//
// ```rust,ignore
// use regstore_core::traits::{TimerRequest, TimerService, TimerTags};
//
// let request = TimerRequest::new("sip:alice@example.com", 1767225600, TimerTags::new(1, 1, 0));
// let timer_id = service.create(&request).await?;
// service.update(&timer_id, &request).await?;
// service.delete(&timer_id).await?;
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Population counters reported to the timer service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerTags {
    /// 1 if the AoR has at least one binding, else 0
    #[serde(rename = "REG")]
    pub reg: u32,
    /// Number of bindings
    #[serde(rename = "BIND")]
    pub bind: u32,
    /// Number of subscriptions
    #[serde(rename = "SUB")]
    pub sub: u32,
}

impl TimerTags {
    /// Create a tag set
    pub fn new(reg: u32, bind: u32, sub: u32) -> Self {
        Self { reg, bind, sub }
    }
}

/// A timer to create or reschedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerRequest {
    /// Callback context: the AoR key the timer fires for
    pub aor_key: String,
    /// When the timer should fire (epoch seconds)
    pub deliver_at: i64,
    /// Population counters
    pub tags: TimerTags,
}

impl TimerRequest {
    /// Create a timer request
    pub fn new(aor_key: impl Into<String>, deliver_at: i64, tags: TimerTags) -> Self {
        Self {
            aor_key: aor_key.into(),
            deliver_at,
            tags,
        }
    }
}

/// Trait for timer service clients
///
/// # Responsibilities
///
/// Clients issue exactly one request per call and report success or
/// failure. They never retry and never inspect records; whether and when to
/// call is decided by `TimerCoordinator`.
#[async_trait]
pub trait TimerService: Send + Sync {
    /// Create a timer
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The new timer id
    /// - `Err(Error)`: Any non-success outcome
    async fn create(&self, request: &TimerRequest) -> Result<String, crate::Error>;

    /// Reschedule an existing timer
    async fn update(&self, timer_id: &str, request: &TimerRequest) -> Result<(), crate::Error>;

    /// Delete an existing timer
    async fn delete(&self, timer_id: &str) -> Result<(), crate::Error>;

    /// Get the service name (for logging/debugging)
    fn service_name(&self) -> &'static str;
}
