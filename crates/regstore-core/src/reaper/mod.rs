//! Timer-pop handling
//!
//! When the external timer fires for an AoR, the stored record may hold
//! bindings that have since expired. The Reaper re-reads the record (which
//! applies lazy expiry) and writes it back, so the expired entries are
//! removed from the store and the timer is rescheduled or deleted.
//!
//! ## Event Flow
//!
//! 1. Timer pop received for an AoR key
//! 2. Fetch the record (expired bindings dropped)
//! 3. If the pop is for the record's current timer, forget that handle
//! 4. Write back; a fresh timer is created if bindings remain
//! 5. On a lost write race, re-fetch and retry
//!
//! A pop whose timer id does not match the stored one (an orphan left by a
//! failed delete) still reaps, but leaves the live timer handle in place.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, info, warn};

use crate::config::ReaperConfig;
use crate::error::{Error, Result};
use crate::manager::RegistrationManager;

/// A timer firing for an AoR
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerPop {
    /// Callback context the timer was created with
    pub aor_key: String,
    /// Handle of the timer that fired
    pub timer_id: String,
}

impl TimerPop {
    /// Create a timer pop
    pub fn new(aor_key: impl Into<String>, timer_id: impl Into<String>) -> Self {
        Self {
            aor_key: aor_key.into(),
            timer_id: timer_id.into(),
        }
    }
}

/// Result of reaping one AoR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReapOutcome {
    /// Attempts used, including the successful one
    pub attempts: usize,
    /// Bindings left after expiry
    pub bindings: usize,
    /// Subscriptions left after expiry
    pub subscriptions: usize,
}

/// Persists lazy expiry when timers fire
pub struct Reaper {
    manager: Arc<RegistrationManager>,
    max_attempts: usize,
    retry_delay: Duration,
}

impl Reaper {
    /// Create a reaper over a shared manager
    pub fn new(manager: Arc<RegistrationManager>, config: ReaperConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            manager,
            max_attempts: config.max_attempts,
            retry_delay: config.retry_delay(),
        })
    }

    /// Handle a single timer pop
    pub async fn handle_pop(&self, pop: &TimerPop) -> Result<ReapOutcome> {
        self.reap(&pop.aor_key, Some(&pop.timer_id)).await
    }

    /// Remove expired members of `aor_key` from the store
    ///
    /// # Parameters
    ///
    /// - `aor_key`: The AoR to reap
    /// - `fired_timer`: The timer that fired, if any. When it matches the
    ///   stored handle, the handle is treated as consumed.
    ///
    /// # Returns
    ///
    /// - `Ok(ReapOutcome)`: The record was written back
    /// - `Err(Error::CorruptRecord | Error::StoreUnavailable)`: The read failed
    /// - `Err(Error::VersionConflict)`: Every attempt lost its write
    pub async fn reap(&self, aor_key: &str, fired_timer: Option<&str>) -> Result<ReapOutcome> {
        for attempt in 1..=self.max_attempts {
            let mut pair = self.manager.get_aor_data(aor_key).await?;

            if let Some(fired) = fired_timer
                && !fired.is_empty()
                && pair.original().timer_id() == fired
            {
                pair.forget_timer();
            }

            if self.manager.set_aor_data(aor_key, &[], &mut pair).await {
                let outcome = ReapOutcome {
                    attempts: attempt,
                    bindings: pair.current().bindings().len(),
                    subscriptions: pair.current().subscriptions().len(),
                };
                debug!("Reaped {}: {:?}", aor_key, outcome);
                return Ok(outcome);
            }

            warn!("Reap attempt {} failed for {}", attempt, aor_key);

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(Error::version_conflict(format!(
            "gave up reaping {} after {} attempts",
            aor_key, self.max_attempts
        )))
    }

    /// Consume timer pops until SIGINT/SIGTERM or the stream ends
    pub async fn run<S>(&self, pops: S) -> Result<()>
    where
        S: Stream<Item = TimerPop> + Unpin,
    {
        self.run_internal(pops, None).await
    }

    /// Consume timer pops until the shutdown signal fires or the stream ends
    ///
    /// Used by tests and by embedders that own shutdown themselves.
    pub async fn run_with_shutdown<S>(
        &self,
        pops: S,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()>
    where
        S: Stream<Item = TimerPop> + Unpin,
    {
        self.run_internal(pops, shutdown_rx).await
    }

    async fn run_internal<S>(
        &self,
        mut pops: S,
        shutdown_rx: Option<tokio::sync::oneshot::Receiver<()>>,
    ) -> Result<()>
    where
        S: Stream<Item = TimerPop> + Unpin,
    {
        info!("Reaper started");

        if let Some(mut rx) = shutdown_rx {
            loop {
                tokio::select! {
                    pop = pops.next() => match pop {
                        Some(pop) => self.handle_logged(&pop).await,
                        None => {
                            info!("Timer pop stream ended");
                            break;
                        }
                    },

                    _ = &mut rx => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        } else {
            loop {
                tokio::select! {
                    pop = pops.next() => match pop {
                        Some(pop) => self.handle_logged(&pop).await,
                        None => {
                            info!("Timer pop stream ended");
                            break;
                        }
                    },

                    _ = tokio::signal::ctrl_c() => {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        info!("Reaper stopped");
        Ok(())
    }

    async fn handle_logged(&self, pop: &TimerPop) {
        if let Err(e) = self.handle_pop(pop).await {
            // Keep running; the next write or pop for this AoR reaps it
            error!("Failed to reap {} (timer {}): {}", pop.aor_key, pop.timer_id, e);
        }
    }
}
