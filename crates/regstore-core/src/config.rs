//! Configuration types for regstore
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main registrar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrarConfig {
    /// Record store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Timer service configuration
    pub timer_service: TimerServiceConfig,

    /// Manager settings
    #[serde(default)]
    pub manager: ManagerConfig,

    /// Reaper settings
    #[serde(default)]
    pub reaper: ReaperConfig,
}

impl RegistrarConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self {
            store: StoreConfig::default(),
            timer_service: TimerServiceConfig::default(),
            manager: ManagerConfig::default(),
            reaper: ReaperConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.timer_service.validate()?;
        self.manager.validate()?;
        self.reaper.validate()?;
        Ok(())
    }
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Record store configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// File-based store
    File {
        /// Path to the store file
        path: String,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Get the store type name
    pub fn type_name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
        }
    }
}

/// Timer service configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TimerServiceConfig {
    /// Chronos-style HTTP timer service
    Http {
        /// Base URL of the timer service (e.g. "http://127.0.0.1:7253")
        base_url: String,
        /// URI the timer service calls back when a timer pops
        callback_uri: String,
        /// Per-request timeout (in milliseconds)
        #[serde(default = "default_timer_http_timeout_ms")]
        timeout_ms: u64,
    },
}

impl TimerServiceConfig {
    /// Validate the timer service configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            TimerServiceConfig::Http {
                base_url,
                callback_uri,
                timeout_ms,
            } => {
                if base_url.is_empty() {
                    return Err(crate::Error::config("Timer service URL cannot be empty"));
                }
                if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                    return Err(crate::Error::config(format!(
                        "Timer service URL must be http(s): {}",
                        base_url
                    )));
                }
                if callback_uri.is_empty() {
                    return Err(crate::Error::config(
                        "Timer service callback URI cannot be empty",
                    ));
                }
                if *timeout_ms == 0 {
                    return Err(crate::Error::config("Timer service timeout must be > 0"));
                }
                Ok(())
            }
        }
    }

    /// Get the timer service type name
    pub fn type_name(&self) -> &'static str {
        match self {
            TimerServiceConfig::Http { .. } => "http",
        }
    }
}

impl Default for TimerServiceConfig {
    fn default() -> Self {
        TimerServiceConfig::Http {
            base_url: String::new(),
            callback_uri: String::new(),
            timeout_ms: default_timer_http_timeout_ms(),
        }
    }
}

/// Manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Bound on each store call (in milliseconds)
    ///
    /// A store call that exceeds it fails the operation.
    #[serde(default = "default_store_timeout_ms")]
    pub store_timeout_ms: u64,

    /// Bound on each timer service call (in milliseconds)
    #[serde(default = "default_timer_timeout_ms")]
    pub timer_timeout_ms: u64,

    /// Capacity of the registration event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ManagerConfig {
    /// Validate the manager configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.store_timeout_ms == 0 {
            return Err(crate::Error::config("Store timeout must be > 0"));
        }
        if self.timer_timeout_ms == 0 {
            return Err(crate::Error::config("Timer timeout must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }

    /// Store call timeout
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Timer service call timeout
    pub fn timer_timeout(&self) -> Duration {
        Duration::from_millis(self.timer_timeout_ms)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: default_store_timeout_ms(),
            timer_timeout_ms: default_timer_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Reaper configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReaperConfig {
    /// Attempts per timer pop before giving up on version conflicts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay between attempts (in milliseconds)
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl ReaperConfig {
    /// Validate the reaper configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("Reaper max attempts must be > 0"));
        }
        Ok(())
    }

    /// Delay between attempts
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_timer_http_timeout_ms() -> u64 {
    2000
}

fn default_store_timeout_ms() -> u64 {
    500
}

fn default_timer_timeout_ms() -> u64 {
    500
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_max_attempts() -> usize {
    3
}

fn default_retry_delay_ms() -> u64 {
    50
}
