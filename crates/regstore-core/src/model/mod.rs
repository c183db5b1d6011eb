//! Record model
//!
//! - [`Binding`]: one registered contact
//! - [`Subscription`]: one reg-event subscription dialog
//! - [`Aor`]: the full record for an address-of-record
//! - [`AorPair`]: original/current snapshots for one read/modify/write

pub mod aor;
pub mod binding;
pub mod subscription;

pub use aor::{Aor, AorPair, INITIAL_NOTIFY_CSEQ};
pub use binding::Binding;
pub use subscription::Subscription;
