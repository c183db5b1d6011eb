//! Address-of-record and the read/modify/write pair built around it

use std::collections::BTreeMap;

use super::{Binding, Subscription};

/// `notify_cseq` of an AoR that has never been written
pub const INITIAL_NOTIFY_CSEQ: u64 = 1;

/// Full registration record for one address-of-record
///
/// Bindings and subscriptions are owned by value, so `clone()` yields a fully
/// independent record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aor {
    uri: String,
    timer_id: String,
    notify_cseq: u64,
    version_token: u64,
    bindings: BTreeMap<String, Binding>,
    subscriptions: BTreeMap<String, Subscription>,
}

impl Aor {
    /// Create an empty, never-persisted AoR
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            timer_id: String::new(),
            notify_cseq: INITIAL_NOTIFY_CSEQ,
            version_token: 0,
            bindings: BTreeMap::new(),
            subscriptions: BTreeMap::new(),
        }
    }

    /// Assemble an AoR from its stored parts
    pub(crate) fn from_parts(
        timer_id: String,
        notify_cseq: u64,
        bindings: BTreeMap<String, Binding>,
        subscriptions: BTreeMap<String, Subscription>,
    ) -> Self {
        Self {
            uri: String::new(),
            timer_id,
            notify_cseq,
            version_token: 0,
            bindings,
            subscriptions,
        }
    }

    /// The AoR's own identity
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// External timer handle; empty when no timer is active
    pub fn timer_id(&self) -> &str {
        &self.timer_id
    }

    /// Sequence number for the next reg-event NOTIFY
    pub fn notify_cseq(&self) -> u64 {
        self.notify_cseq
    }

    /// CAS version this record was read at (0 if never persisted)
    pub fn version_token(&self) -> u64 {
        self.version_token
    }

    /// Bindings, keyed by binding id
    pub fn bindings(&self) -> &BTreeMap<String, Binding> {
        &self.bindings
    }

    /// Subscriptions, keyed by subscription id
    pub fn subscriptions(&self) -> &BTreeMap<String, Subscription> {
        &self.subscriptions
    }

    /// Look up a binding without creating it
    pub fn binding(&self, id: &str) -> Option<&Binding> {
        self.bindings.get(id)
    }

    /// Look up a subscription without creating it
    pub fn subscription(&self, id: &str) -> Option<&Subscription> {
        self.subscriptions.get(id)
    }

    /// Get the binding for `id`, inserting a zero-valued one first if absent
    ///
    /// The caller is expected to populate every field of a freshly created
    /// binding.
    pub fn get_binding(&mut self, id: &str) -> &mut Binding {
        self.bindings.entry(id.to_string()).or_default()
    }

    /// Remove the binding for `id`; no-op if absent
    pub fn remove_binding(&mut self, id: &str) {
        self.bindings.remove(id);
    }

    /// Get the subscription for `id`, inserting a zero-valued one first if absent
    pub fn get_subscription(&mut self, id: &str) -> &mut Subscription {
        self.subscriptions.entry(id.to_string()).or_default()
    }

    /// Remove the subscription for `id`; no-op if absent
    pub fn remove_subscription(&mut self, id: &str) {
        self.subscriptions.remove(id);
    }

    /// Remove all bindings
    pub fn clear_bindings(&mut self) {
        self.bindings.clear();
    }

    pub(crate) fn clear_subscriptions(&mut self) {
        self.subscriptions.clear();
    }

    /// Whether the AoR has no bindings
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub(crate) fn set_uri(&mut self, uri: impl Into<String>) {
        self.uri = uri.into();
    }

    pub(crate) fn set_timer_id(&mut self, timer_id: impl Into<String>) {
        self.timer_id = timer_id.into();
    }

    pub(crate) fn set_version_token(&mut self, version_token: u64) {
        self.version_token = version_token;
    }

    /// Advance the notify CSeq, holding at `u64::MAX`
    pub(crate) fn bump_notify_cseq(&mut self) {
        self.notify_cseq = self.notify_cseq.saturating_add(1);
    }

    /// Drop expired members as of `now` (epoch seconds)
    ///
    /// Removes bindings and subscriptions whose `expires <= now`. If no
    /// binding survives, every subscription is removed as well. Returns the
    /// number of bindings removed.
    pub(crate) fn expire(&mut self, now: i64) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|_, b| !b.is_expired(now));
        let removed = before - self.bindings.len();

        if self.bindings.is_empty() {
            self.subscriptions.clear();
        } else {
            self.subscriptions.retain(|_, s| !s.is_expired(now));
        }

        removed
    }
}

/// A read/modify/write unit of work over one AoR
///
/// `original` is the record exactly as fetched (after lazy expiry) and is not
/// exposed mutably. `current` is the caller's working copy. The manager
/// derives timer and change events from the difference between the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AorPair {
    original: Aor,
    current: Aor,
}

impl AorPair {
    /// Build a pair whose snapshots are both copies of `aor`
    pub fn new(aor: Aor) -> Self {
        Self {
            original: aor.clone(),
            current: aor,
        }
    }

    /// The record as fetched
    pub fn original(&self) -> &Aor {
        &self.original
    }

    /// The working copy
    pub fn current(&self) -> &Aor {
        &self.current
    }

    /// The working copy, for mutation
    pub fn current_mut(&mut self) -> &mut Aor {
        &mut self.current
    }

    /// Forget the external timer handle on both snapshots
    ///
    /// Used after the timer has fired: the handle is consumed, so the next
    /// write schedules a fresh timer if bindings remain.
    pub fn forget_timer(&mut self) {
        self.original.timer_id.clear();
        self.current.timer_id.clear();
    }

    pub(crate) fn set_current(&mut self, aor: Aor) {
        self.current = aor;
    }
}
