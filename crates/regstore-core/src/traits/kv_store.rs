// # Store Gateway Trait
//
// Defines the interface to the replicated compare-and-swap key/value store
// that holds AoR records.
//
// ## Version Tokens
//
// Every stored value carries an opaque `u64` version. A conditional write
// or delete only applies if the caller's version still matches; otherwise
// the store reports `Error::VersionConflict` and nothing changes. Version `0`
// means "the key must not exist" and is used for the first write of a
// record.
//
// ## Implementations
//
// - `MemoryKvStore`: in-process, for tests and single-node use
// - `FileKvStore`: JSON file with atomic writes and backup recovery
// - Future: memcached/Astaire-style replicated stores

use async_trait::async_trait;

/// A stored payload together with its CAS version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    /// Raw payload bytes
    pub data: Vec<u8>,
    /// CAS version of this payload (never 0 for a stored value)
    pub version: u64,
}

impl VersionedValue {
    /// Create a versioned value
    pub fn new(data: impl Into<Vec<u8>>, version: u64) -> Self {
        Self {
            data: data.into(),
            version,
        }
    }
}

/// Trait for CAS key/value store implementations
///
/// # Thread Safety
///
/// All methods must be safe to call concurrently from multiple tasks. Two
/// racing conditional writes against the same key and version must result
/// in exactly one success.
///
/// # Responsibilities
///
/// Stores only move bytes. They never decode payloads, never retry, and
/// never decide whether a write is needed (owned by `RegistrationManager`).
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch the value for `key`
    ///
    /// # Returns
    ///
    /// - `Ok(Some(VersionedValue))`: The stored payload and its version
    /// - `Ok(None)`: No entry for this key
    /// - `Err(Error)`: Transport or backend failure
    async fn fetch(&self, key: &str) -> Result<Option<VersionedValue>, crate::Error>;

    /// Write `data` under `key` if the stored version equals `version`
    ///
    /// `version == 0` succeeds only if the key is absent.
    ///
    /// # Returns
    ///
    /// - `Ok(u64)`: The new version of the stored value
    /// - `Err(Error::VersionConflict)`: Stored version differs
    /// - `Err(Error)`: Transport or backend failure
    async fn write_if_match(
        &self,
        key: &str,
        data: &[u8],
        version: u64,
    ) -> Result<u64, crate::Error>;

    /// Delete `key` if the stored version equals `version`
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Deleted
    /// - `Err(Error::VersionConflict)`: Stored version differs or the key is gone
    /// - `Err(Error)`: Transport or backend failure
    async fn delete_if_match(&self, key: &str, version: u64) -> Result<(), crate::Error>;

    /// Get the store name (for logging/debugging)
    fn store_name(&self) -> &'static str;
}
