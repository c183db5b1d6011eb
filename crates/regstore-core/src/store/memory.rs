// # Memory KV Store
//
// In-process implementation of KvStore.
//
// ## Purpose
//
// Provides a fast CAS store that doesn't persist across restarts. Useful for
// tests and single-node deployments where losing registrations on restart
// is acceptable (clients re-register).
//
// ## Versions
//
// Versions come from one store-wide counter, so a key that is deleted and
// re-created never reuses a version a stale writer might still hold.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::traits::kv_store::{KvStore, VersionedValue};

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<String, VersionedValue>,
    last_version: u64,
}

/// In-memory CAS store implementation
///
/// Cloning shares the underlying map.
///
/// # Example
///
/// ```rust,no_run
/// use regstore_core::store::MemoryKvStore;
/// use regstore_core::traits::KvStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryKvStore::new();
///
///     let version = store.write_if_match("sip:alice@example.com", b"{\"bindings\":{}}", 0).await?;
///     let value = store.fetch("sip:alice@example.com").await?.unwrap();
///     assert_eq!(value.version, version);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    inner: Arc<RwLock<MemoryState>>,
}

impl MemoryKvStore {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of keys in the store
    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Clear all entries from the store
    pub async fn clear(&self) {
        self.inner.write().await.entries.clear();
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn fetch(&self, key: &str) -> Result<Option<VersionedValue>, Error> {
        let guard = self.inner.read().await;
        Ok(guard.entries.get(key).cloned())
    }

    async fn write_if_match(&self, key: &str, data: &[u8], version: u64) -> Result<u64, Error> {
        let mut guard = self.inner.write().await;

        let stored = guard.entries.get(key).map(|v| v.version).unwrap_or(0);
        if stored != version {
            return Err(Error::version_conflict(format!(
                "{}: expected version {}, found {}",
                key, version, stored
            )));
        }

        guard.last_version += 1;
        let new_version = guard.last_version;
        guard
            .entries
            .insert(key.to_string(), VersionedValue::new(data, new_version));
        Ok(new_version)
    }

    async fn delete_if_match(&self, key: &str, version: u64) -> Result<(), Error> {
        let mut guard = self.inner.write().await;

        match guard.entries.get(key) {
            Some(value) if value.version == version => {
                guard.entries.remove(key);
                Ok(())
            }
            Some(value) => Err(Error::version_conflict(format!(
                "{}: expected version {}, found {}",
                key, version, value.version
            ))),
            None => Err(Error::version_conflict(format!(
                "{}: expected version {}, key is gone",
                key, version
            ))),
        }
    }

    fn store_name(&self) -> &'static str {
        "memory"
    }
}
