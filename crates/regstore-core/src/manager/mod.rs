//! Registration manager
//!
//! The RegistrationManager owns the read/modify/write protocol for AoR
//! records:
//! - Fetching a record at a version and applying lazy expiry
//! - Keeping the external timer in line with the record's population
//! - Writing the record back under compare-and-swap
//! - Publishing change events after a successful write
//!
//! ## Architecture
//!
//! ```text
//!                    get_aor_data                set_aor_data
//!                         │                           │
//!                         ▼                           ▼
//! ┌─────────────┐  ┌──────────────┐         ┌──────────────────┐
//! │   KvStore   │◄─│ fetch/decode │         │ TimerCoordinator │
//! │   (CAS)     │  │ lazy expiry  │         │ (create/update/  │
//! └─────────────┘  └──────────────┘         │  delete)         │
//!        ▲                                  └──────────────────┘
//!        │                                            │
//!        └──────── write_if_match / delete_if_match ◄─┘
//!                                                     │
//!                                                     ▼
//!                                          ┌───────────────────┐
//!                                          │ RegistrationEvent │
//!                                          └───────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! The manager holds no per-AoR state and is shared through `Arc`. The
//! store's version check is the only serialization point: of two writers
//! holding the same version, exactly one succeeds. The manager never retries
//! a lost write; callers re-fetch and redo their change.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::codec;
use crate::config::ManagerConfig;
use crate::error::{Error, Result};
use crate::model::{Aor, AorPair};
use crate::timer::{TimerCoordinator, TimerOutcome};
use crate::traits::{KvStore, TimerService};

/// Events emitted by the RegistrationManager after a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationEvent {
    /// A binding was added, refreshed with a new expiry, or removed
    BindingChanged {
        aor_uri: String,
        binding_id: String,
        contact_uri: String,
        /// New absolute expiry, or 0 when the binding was removed
        expires: i64,
    },

    /// The binding or subscription set changed; subscribers are due a NOTIFY
    SubscriberStateChanged {
        aor_uri: String,
        associated_uris: Vec<String>,
        notify_cseq: u64,
        bindings: usize,
        subscriptions: usize,
    },
}

/// Registration-state manager
///
/// ## Lifecycle
///
/// 1. Create with [`RegistrationManager::new()`]
/// 2. Read with [`RegistrationManager::get_aor_data()`]
/// 3. Mutate `pair.current_mut()`
/// 4. Write with [`RegistrationManager::set_aor_data()`]
///
/// On a `false` write, re-fetch and redo the change.
pub struct RegistrationManager {
    /// CAS store holding encoded AoR records
    store: Box<dyn KvStore>,

    /// Timer lifecycle driver
    timers: TimerCoordinator,

    /// Bound on each store call
    store_timeout: Duration,

    /// Event sender for external consumers
    event_tx: mpsc::Sender<RegistrationEvent>,
}

impl RegistrationManager {
    /// Create a new registration manager
    ///
    /// # Parameters
    ///
    /// - `store`: CAS store implementation
    /// - `timer_service`: Timer service implementation
    /// - `config`: Manager configuration
    ///
    /// # Returns
    ///
    /// A tuple of (manager, event_receiver) where event_receiver yields
    /// registration events
    pub fn new(
        store: Box<dyn KvStore>,
        timer_service: Box<dyn TimerService>,
        config: ManagerConfig,
    ) -> Result<(Self, mpsc::Receiver<RegistrationEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        info!(
            "Registration manager using {} store and {} timer service",
            store.store_name(),
            timer_service.service_name()
        );

        let manager = Self {
            store,
            timers: TimerCoordinator::new(timer_service, config.timer_timeout()),
            store_timeout: config.store_timeout(),
            event_tx: tx,
        };

        Ok((manager, rx))
    }

    /// Fetch the AoR stored under `aor_key`
    ///
    /// A missing key yields an empty AoR at version 0. Expired bindings are
    /// removed before the pair is built, and if none survive every
    /// subscription goes with them.
    ///
    /// # Returns
    ///
    /// - `Ok(AorPair)`: Identical `original` and `current` snapshots
    /// - `Err(Error::CorruptRecord)`: The stored payload failed to decode
    /// - `Err(Error::StoreUnavailable)`: Store failure or timeout
    pub async fn get_aor_data(&self, aor_key: &str) -> Result<AorPair> {
        let fetched = self
            .bounded("fetch", aor_key, self.store.fetch(aor_key))
            .await?;

        let mut aor = match fetched {
            None => {
                debug!("No record for {}, returning empty AoR", aor_key);
                Aor::new(aor_key)
            }
            Some(value) => {
                let mut aor = codec::decode(&value.data).map_err(|e| {
                    error!("Stored record for {} is corrupt: {}", aor_key, e);
                    Error::corrupt_record(aor_key, e.to_string())
                })?;
                aor.set_uri(aor_key);
                aor.set_version_token(value.version);
                aor
            }
        };

        let expired = aor.expire(now());
        if expired > 0 {
            debug!("Dropped {} expired bindings from {}", expired, aor_key);
        }

        Ok(AorPair::new(aor))
    }

    /// Write `pair.current()` back under `pair.original()`'s version
    ///
    /// The timer is synchronized first; a timer failure is logged and the
    /// write proceeds. A write that leaves no bindings removes the record and
    /// ends every subscription with it.
    ///
    /// # Returns
    ///
    /// - `true`: The write succeeded; `pair.current()` reflects what was
    ///   stored (timer id, notify CSeq and version)
    /// - `false`: Version conflict, store failure or timeout;
    ///   `pair.current()` is unchanged
    pub async fn set_aor_data(
        &self,
        aor_key: &str,
        associated_uris: &[String],
        pair: &mut AorPair,
    ) -> bool {
        let original = pair.original();
        let version = original.version_token();
        let mut staged = pair.current().clone();
        if staged.is_empty() {
            // No binding left to notify; subscriptions end with the record
            staged.clear_subscriptions();
        }

        if let TimerOutcome::Failed { action, error } =
            self.timers.sync(aor_key, original, &mut staged).await
        {
            debug!("Proceeding with write of {} after timer {} failure: {}", aor_key, action, error);
        }

        let binding_events = binding_changes(aor_key, original, &staged);
        let subscriber_state_changed = original.bindings() != staged.bindings()
            || original.subscriptions() != staged.subscriptions();
        if subscriber_state_changed {
            staged.bump_notify_cseq();
        }

        let written = if staged.is_empty() {
            self.remove(aor_key, version).await
        } else {
            self.store_record(aor_key, &staged, version).await
        };

        let new_version = match written {
            Ok(new_version) => new_version,
            Err(e) if e.is_version_conflict() => {
                debug!("Lost write race for {}: {}", aor_key, e);
                return false;
            }
            Err(e) => {
                warn!("Failed to write {}: {}", aor_key, e);
                return false;
            }
        };

        debug!(
            "Wrote {} (version {} -> {}, {} bindings, {} subscriptions)",
            aor_key,
            version,
            new_version,
            staged.bindings().len(),
            staged.subscriptions().len()
        );

        staged.set_version_token(new_version);

        for event in binding_events {
            self.emit_event(event);
        }
        if subscriber_state_changed {
            self.emit_event(RegistrationEvent::SubscriberStateChanged {
                aor_uri: aor_key.to_string(),
                associated_uris: associated_uris.to_vec(),
                notify_cseq: staged.notify_cseq(),
                bindings: staged.bindings().len(),
                subscriptions: staged.subscriptions().len(),
            });
        }

        pair.set_current(staged);
        true
    }

    /// Remove the record for an AoR left without bindings
    ///
    /// Returns the resulting version: 0, since the key no longer exists.
    async fn remove(&self, aor_key: &str, version: u64) -> Result<u64> {
        if version == 0 {
            debug!("{} was never stored and has no bindings, nothing to write", aor_key);
            return Ok(0);
        }

        self.bounded("delete", aor_key, self.store.delete_if_match(aor_key, version))
            .await?;
        info!("Removed record for {} (no bindings left)", aor_key);
        Ok(0)
    }

    /// Encode and conditionally write a record that still has bindings
    async fn store_record(&self, aor_key: &str, aor: &Aor, version: u64) -> Result<u64> {
        let data = codec::encode(aor)?;
        self.bounded("write", aor_key, self.store.write_if_match(aor_key, &data, version))
            .await
    }

    /// Run a store call under the configured timeout
    async fn bounded<T>(
        &self,
        op: &str,
        aor_key: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::store_unavailable(format!(
                "{} store {} of {} timed out after {:?}",
                self.store.store_name(),
                op,
                aor_key,
                self.store_timeout
            ))),
        }
    }

    /// Emit a registration event
    fn emit_event(&self, event: RegistrationEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Event receiver dropped, discarding event");
            }
        }
    }
}

/// One event per binding added, re-expired or removed between two snapshots
fn binding_changes(aor_key: &str, original: &Aor, current: &Aor) -> Vec<RegistrationEvent> {
    let mut events = Vec::new();

    for (id, binding) in current.bindings() {
        let changed = match original.binding(id) {
            Some(previous) => previous.expires != binding.expires,
            None => true,
        };
        if changed {
            events.push(RegistrationEvent::BindingChanged {
                aor_uri: aor_key.to_string(),
                binding_id: id.clone(),
                contact_uri: binding.uri.clone(),
                expires: binding.expires,
            });
        }
    }

    for (id, binding) in original.bindings() {
        if current.binding(id).is_none() {
            events.push(RegistrationEvent::BindingChanged {
                aor_uri: aor_key.to_string(),
                binding_id: id.clone(),
                contact_uri: binding.uri.clone(),
                expires: 0,
            });
        }
    }

    events
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Binding;

    fn binding(uri: &str, expires: i64) -> Binding {
        Binding {
            uri: uri.to_string(),
            expires,
            ..Default::default()
        }
    }

    #[test]
    fn test_binding_changes() {
        let mut original = Aor::new("sip:alice@example.com");
        *original.get_binding("kept") = binding("sip:kept", 100);
        *original.get_binding("refreshed") = binding("sip:refreshed", 100);
        *original.get_binding("gone") = binding("sip:gone", 100);

        let mut current = original.clone();
        current.get_binding("refreshed").expires = 500;
        current.remove_binding("gone");
        *current.get_binding("new") = binding("sip:new", 300);

        let events = binding_changes("sip:alice@example.com", &original, &current);

        let summary: Vec<(String, i64)> = events
            .iter()
            .map(|e| match e {
                RegistrationEvent::BindingChanged {
                    binding_id,
                    expires,
                    ..
                } => (binding_id.clone(), *expires),
                other => panic!("unexpected event {:?}", other),
            })
            .collect();

        assert_eq!(
            summary,
            vec![
                ("new".to_string(), 300),
                ("refreshed".to_string(), 500),
                ("gone".to_string(), 0),
            ]
        );
    }

    #[test]
    fn test_no_binding_changes_for_identical_snapshots() {
        let mut aor = Aor::new("sip:alice@example.com");
        *aor.get_binding("b1") = binding("sip:b1", 100);
        assert!(binding_changes("sip:alice@example.com", &aor, &aor.clone()).is_empty());
    }

    #[test]
    fn test_event_equality() {
        let event = RegistrationEvent::SubscriberStateChanged {
            aor_uri: "sip:alice@example.com".to_string(),
            associated_uris: vec!["tel:+15551234".to_string()],
            notify_cseq: 2,
            bindings: 1,
            subscriptions: 0,
        };
        assert_eq!(event.clone(), event);
    }
}
