//! Binding: one registered contact under an AoR

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One registered contact, produced by a single REGISTER Contact entry
///
/// `expires` is an absolute epoch time in seconds. A binding whose
/// `expires` is at or before "now" is logically deleted and is stripped by
/// the manager on read.
///
/// The serde field names are the persisted wire names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Contact URI
    pub uri: String,

    /// Call-ID of the REGISTER that produced this binding
    #[serde(rename = "cid")]
    pub call_id: String,

    /// CSeq of the last REGISTER that touched this binding
    pub cseq: i64,

    /// Absolute expiry (epoch seconds)
    pub expires: i64,

    /// q-value ordering, scaled to an integer
    pub priority: i32,

    /// Path URIs, in order
    #[serde(rename = "paths")]
    pub path_uris: Vec<String>,

    /// Raw Path header values, in order
    #[serde(default)]
    pub path_headers: Vec<String>,

    /// Contact parameters (e.g. `+sip.instance`, `reg-id`)
    pub params: BTreeMap<String, String>,

    /// Private identity used to authenticate the registration
    #[serde(default)]
    pub private_id: String,

    /// Whether this is an emergency registration
    #[serde(rename = "emergency_reg", default)]
    pub emergency_registration: bool,
}

impl Binding {
    /// Whether this binding has expired at `now` (epoch seconds)
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires <= now
    }

    /// The `+sip.instance` contact parameter, if present
    pub fn instance_id(&self) -> Option<&str> {
        self.params.get("+sip.instance").map(String::as_str)
    }
}
