//! Error types for the registration-state core
//!
//! Store, codec and timer failures all surface through [`Error`]. Callers
//! that need to branch on the failure class use [`Error::kind`].

use thiserror::Error;

/// Result type alias for regstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for regstore
#[derive(Error, Debug)]
pub enum Error {
    /// Stored payload could not be parsed or failed schema validation
    #[error("Corrupt record for {key}: {reason}")]
    CorruptRecord {
        /// Store key of the offending record
        key: String,
        /// Parser or validation message
        reason: String,
    },

    /// Another writer updated the record between fetch and write
    #[error("Version conflict: {0}")]
    VersionConflict(String),

    /// Store transport or backend failure (including timeouts)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Timer service call failed
    #[error("Timer service error: {0}")]
    TimerService(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors outside of record decoding (configuration, store files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unparseable or schema-invalid stored payload
    CorruptRecord,
    /// Optimistic-concurrency loss
    VersionConflict,
    /// Transport or backend failure
    StoreUnavailable,
    /// Timer service call failed
    TimerServiceFailure,
    /// Invalid configuration
    Config,
    /// Anything else
    Other,
}

impl Error {
    /// Create a corrupt-record error
    pub fn corrupt_record(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a version-conflict error
    pub fn version_conflict(msg: impl Into<String>) -> Self {
        Self::VersionConflict(msg.into())
    }

    /// Create a store-unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Create a timer service error
    pub fn timer_service(msg: impl Into<String>) -> Self {
        Self::TimerService(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            Self::VersionConflict(_) => ErrorKind::VersionConflict,
            Self::StoreUnavailable(_) | Self::Io(_) => ErrorKind::StoreUnavailable,
            Self::TimerService(_) => ErrorKind::TimerServiceFailure,
            Self::Config(_) => ErrorKind::Config,
            Self::Json(_) | Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether this is an optimistic-concurrency loss
    pub fn is_version_conflict(&self) -> bool {
        self.kind() == ErrorKind::VersionConflict
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::corrupt_record("sip:alice@example.com", "missing bindings").kind(),
            ErrorKind::CorruptRecord
        );
        assert_eq!(Error::version_conflict("cas 3").kind(), ErrorKind::VersionConflict);
        assert_eq!(Error::store_unavailable("timeout").kind(), ErrorKind::StoreUnavailable);
        assert_eq!(Error::timer_service("503").kind(), ErrorKind::TimerServiceFailure);
        assert!(Error::version_conflict("x").is_version_conflict());
        assert!(!Error::config("x").is_version_conflict());
    }

    #[test]
    fn test_corrupt_record_message_names_key() {
        let err = Error::corrupt_record("sip:bob@example.com", "expected integer");
        assert_eq!(
            err.to_string(),
            "Corrupt record for sip:bob@example.com: expected integer"
        );
    }
}
