//! Core traits for regstore
//!
//! This module defines the interfaces to the external collaborators.
//!
//! - [`KvStore`]: Compare-and-swap key/value store holding AoR records
//! - [`TimerService`]: External timer service that reaps expired records

pub mod kv_store;
pub mod timer_service;

pub use kv_store::{KvStore, VersionedValue};
pub use timer_service::{TimerRequest, TimerService, TimerTags};
