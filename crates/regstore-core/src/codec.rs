// # Record Codec
//
// Converts an `Aor` to and from the byte payload held in the store.
//
// ## Wire Format
//
// ```json
// {
//   "bindings": {
//     "<binding-id>": {
//       "uri": "sip:alice@192.0.2.4:5060",
//       "cid": "a84b4c76e66710",
//       "cseq": 314159,
//       "expires": 1767225600,
//       "priority": 1000,
//       "paths": ["sip:edge.example.com;lr"],
//       "path_headers": ["<sip:edge.example.com;lr>"],
//       "params": {"+sip.instance": "\"<urn:uuid:...>\"", "reg-id": "1"},
//       "private_id": "alice@example.com",
//       "emergency_reg": false
//     }
//   },
//   "subscriptions": { "<subscription-id>": { ... } },
//   "notify_cseq": 3,
//   "timer_id": "a1b2c3"
// }
// ```
//
// `bindings` is required: `{}` is a corrupt record, an empty AoR is
// `{"bindings":{}}`. Maps are ordered, so encoding is deterministic.
//
// The AoR's `uri` and `version_token` are not part of the payload; they come
// from the store key and the store's CAS version.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::model::{Aor, Binding, INITIAL_NOTIFY_CSEQ, Subscription};

/// A payload that could not be decoded into an AoR
#[derive(Error, Debug)]
#[error("{0}")]
pub struct DecodeError(String);

#[derive(Serialize)]
struct AorDocumentRef<'a> {
    bindings: &'a BTreeMap<String, Binding>,
    subscriptions: &'a BTreeMap<String, Subscription>,
    notify_cseq: u64,
    timer_id: &'a str,
}

#[derive(Deserialize)]
struct AorDocument {
    bindings: BTreeMap<String, Binding>,
    #[serde(default)]
    subscriptions: BTreeMap<String, Subscription>,
    #[serde(default = "initial_notify_cseq")]
    notify_cseq: u64,
    #[serde(default)]
    timer_id: String,
}

fn initial_notify_cseq() -> u64 {
    INITIAL_NOTIFY_CSEQ
}

/// Serialize an AoR into its stored payload
pub fn encode(aor: &Aor) -> crate::error::Result<Vec<u8>> {
    let doc = AorDocumentRef {
        bindings: aor.bindings(),
        subscriptions: aor.subscriptions(),
        notify_cseq: aor.notify_cseq(),
        timer_id: aor.timer_id(),
    };

    Ok(serde_json::to_vec(&doc)?)
}

/// Parse a stored payload
///
/// Returns the raw stored state, including members that have since expired.
/// The result has an empty `uri` and a zero `version_token`; the caller
/// fills both in from the store.
pub fn decode(data: &[u8]) -> Result<Aor, DecodeError> {
    let doc: AorDocument =
        serde_json::from_slice(data).map_err(|e| DecodeError(e.to_string()))?;

    Ok(Aor::from_parts(
        doc.timer_id,
        doc.notify_cseq,
        doc.bindings,
        doc.subscriptions,
    ))
}
