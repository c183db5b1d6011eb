//! Timer coordination
//!
//! Keeps the external timer service consistent with an AoR's population.
//! The decision is a pure function of the `original` and `current`
//! snapshots ([`plan`]); [`TimerCoordinator::sync`] performs the resulting
//! call and applies the outcome to `current.timer_id`.
//!
//! | original timer | current bindings | change                          | action |
//! |----------------|------------------|---------------------------------|--------|
//! | empty          | non-empty        | any                             | create |
//! | set            | non-empty        | none, or soonest expiry later   | none   |
//! | set            | non-empty        | tags changed or soonest earlier | update |
//! | set            | empty            | any                             | delete |
//! | empty          | empty            | any                             | none   |
//!
//! The timer fires at the single soonest deadline of the whole AoR, so a
//! later deadline is already covered by the existing timer.
//!
//! Timer failures never fail the caller: they are logged and reported as
//! [`TimerOutcome::Failed`]. A failed create leaves `timer_id` empty, which
//! makes the next write retry the create.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::model::Aor;
use crate::traits::{TimerRequest, TimerService, TimerTags};

/// Compute the REG/BIND/SUB tags for an AoR
pub fn tag_counts(aor: &Aor) -> TimerTags {
    let bind = aor.bindings().len() as u32;
    TimerTags {
        reg: u32::from(bind > 0),
        bind,
        sub: aor.subscriptions().len() as u32,
    }
}

/// Soonest expiry across all bindings and subscriptions
pub fn soonest_expiry(aor: &Aor) -> Option<i64> {
    aor.bindings()
        .values()
        .map(|b| b.expires)
        .chain(aor.subscriptions().values().map(|s| s.expires))
        .min()
}

/// What to do with the external timer for one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerAction {
    /// Leave the timer alone
    Keep,
    /// Create a new timer
    Create(TimerRequest),
    /// Reschedule the existing timer
    Update {
        /// Existing timer handle
        timer_id: String,
        /// New schedule and tags
        request: TimerRequest,
    },
    /// Remove the existing timer
    Delete {
        /// Existing timer handle
        timer_id: String,
    },
}

/// Decide the timer action for a write of `current` over `original`
pub fn plan(aor_key: &str, original: &Aor, current: &Aor) -> TimerAction {
    let timer_id = original.timer_id();

    if current.is_empty() {
        if timer_id.is_empty() {
            return TimerAction::Keep;
        }
        return TimerAction::Delete {
            timer_id: timer_id.to_string(),
        };
    }

    let tags = tag_counts(current);
    let Some(deliver_at) = soonest_expiry(current) else {
        return TimerAction::Keep;
    };
    let request = TimerRequest::new(aor_key, deliver_at, tags);

    if timer_id.is_empty() {
        return TimerAction::Create(request);
    }

    let tags_changed = tag_counts(original) != tags;
    let deadline_tightened = match soonest_expiry(original) {
        Some(previous) => deliver_at < previous,
        None => true,
    };

    if tags_changed || deadline_tightened {
        TimerAction::Update {
            timer_id: timer_id.to_string(),
            request,
        }
    } else {
        TimerAction::Keep
    }
}

/// Result of synchronizing the timer for one write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerOutcome {
    /// No call was needed
    Unchanged,
    /// A timer was created and adopted
    Created {
        /// Handle returned by the service
        timer_id: String,
    },
    /// The existing timer was rescheduled
    Updated,
    /// The existing timer was removed
    Deleted,
    /// The call failed; the write proceeds anyway
    Failed {
        /// Which call failed ("create", "update" or "delete")
        action: &'static str,
        /// Failure message
        error: String,
    },
}

/// Drives the timer service on behalf of the manager
pub struct TimerCoordinator {
    service: Box<dyn TimerService>,
    timeout: Duration,
}

impl TimerCoordinator {
    /// Create a coordinator over `service`, bounding each call by `timeout`
    pub fn new(service: Box<dyn TimerService>, timeout: Duration) -> Self {
        Self { service, timeout }
    }

    /// Bring the external timer in line with `current`
    ///
    /// Mutates `current.timer_id` on a successful create (adopts the new
    /// handle) or delete (clears it).
    pub async fn sync(&self, aor_key: &str, original: &Aor, current: &mut Aor) -> TimerOutcome {
        match plan(aor_key, original, current) {
            TimerAction::Keep => {
                debug!("Timer for {} unchanged", aor_key);
                TimerOutcome::Unchanged
            }
            TimerAction::Create(request) => {
                match self.call(self.service.create(&request)).await {
                    Ok(timer_id) => {
                        info!(
                            "Created timer {} for {} (deliver at {}, tags {:?})",
                            timer_id, aor_key, request.deliver_at, request.tags
                        );
                        current.set_timer_id(timer_id.clone());
                        TimerOutcome::Created { timer_id }
                    }
                    Err(e) => {
                        warn!("Failed to create timer for {}: {}", aor_key, e);
                        current.set_timer_id(String::new());
                        TimerOutcome::Failed {
                            action: "create",
                            error: e.to_string(),
                        }
                    }
                }
            }
            TimerAction::Update { timer_id, request } => {
                match self.call(self.service.update(&timer_id, &request)).await {
                    Ok(()) => {
                        debug!(
                            "Updated timer {} for {} (deliver at {}, tags {:?})",
                            timer_id, aor_key, request.deliver_at, request.tags
                        );
                        TimerOutcome::Updated
                    }
                    Err(e) => {
                        warn!("Failed to update timer {} for {}: {}", timer_id, aor_key, e);
                        TimerOutcome::Failed {
                            action: "update",
                            error: e.to_string(),
                        }
                    }
                }
            }
            TimerAction::Delete { timer_id } => {
                match self.call(self.service.delete(&timer_id)).await {
                    Ok(()) => {
                        info!("Deleted timer {} for {}", timer_id, aor_key);
                        current.set_timer_id(String::new());
                        TimerOutcome::Deleted
                    }
                    Err(e) => {
                        // An orphaned timer firing for a gone AoR is harmless
                        warn!("Failed to delete timer {} for {}: {}", timer_id, aor_key, e);
                        TimerOutcome::Failed {
                            action: "delete",
                            error: e.to_string(),
                        }
                    }
                }
            }
        }
    }

    async fn call<T>(
        &self,
        fut: impl std::future::Future<Output = crate::Result<T>>,
    ) -> crate::Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(crate::Error::timer_service(format!(
                "{} call timed out after {:?}",
                self.service.service_name(),
                self.timeout
            ))),
        }
    }
}
