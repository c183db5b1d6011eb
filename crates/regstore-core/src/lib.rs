// # regstore-core
//
// Registration-state core for a SIP registrar.
//
// ## Architecture Overview
//
// This library owns the authoritative record of which bindings and reg-event
// subscriptions exist for an address-of-record (AoR):
// - **Record model**: `Aor`, `Binding`, `Subscription` and the `AorPair`
//   read/modify/write unit
// - **Codec**: deterministic, strict JSON encoding of an AoR
// - **KvStore**: Trait for the compare-and-swap store holding the records
// - **TimerService**: Trait for the external timer that reaps expired records
// - **TimerCoordinator**: Decides and performs timer create/update/delete
// - **RegistrationManager**: `get_aor_data` / `set_aor_data`
// - **Reaper**: Persists expiry when a timer fires
//
// ## Design Principles
//
// 1. **Optimistic concurrency**: the store's version check is the only
//    serialization point; the manager holds no per-AoR state
// 2. **Lazy expiry**: readers never observe an expired binding
// 3. **Timer failures degrade, never block**: a failed timer call is logged
//    and the store write proceeds
// 4. **Library-First**: collaborators are traits; implementations plug in

pub mod codec;
pub mod config;
pub mod error;
pub mod manager;
pub mod model;
pub mod reaper;
pub mod store;
pub mod timer;
pub mod traits;

// Re-export core types for convenience
pub use config::{ManagerConfig, ReaperConfig, RegistrarConfig, StoreConfig, TimerServiceConfig};
pub use error::{Error, ErrorKind, Result};
pub use manager::{RegistrationEvent, RegistrationManager};
pub use model::{Aor, AorPair, Binding, Subscription};
pub use reaper::{ReapOutcome, Reaper, TimerPop};
pub use store::{FileKvStore, MemoryKvStore};
pub use timer::{TimerCoordinator, TimerOutcome};
pub use traits::{KvStore, TimerService};
