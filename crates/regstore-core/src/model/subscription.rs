//! Subscription: one reg-event SUBSCRIBE dialog on an AoR

use serde::{Deserialize, Serialize};

/// One reg-event subscription dialog
///
/// Only meaningful while the owning AoR still has a live binding; when the
/// binding set empties, every subscription is terminated regardless of its
/// own `expires`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Request-URI of the SUBSCRIBE
    pub req_uri: String,

    /// From URI
    pub from_uri: String,

    /// From tag
    pub from_tag: String,

    /// To URI
    pub to_uri: String,

    /// To tag
    pub to_tag: String,

    /// Dialog Call-ID
    #[serde(rename = "cid")]
    pub call_id: String,

    /// Route set, in order
    #[serde(rename = "routes")]
    pub route_uris: Vec<String>,

    /// Absolute expiry (epoch seconds)
    pub expires: i64,
}

impl Subscription {
    /// Whether this subscription has expired at `now` (epoch seconds)
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires <= now
    }
}
