// # File KV Store
//
// File-backed implementation of KvStore with crash recovery.
//
// ## Purpose
//
// Keeps AoR records across process restarts on a single node, with the same
// CAS semantics as a replicated store.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Backup: the previous file is copied to `.backup` before each rename
// - Recovery: a file that fails to parse is replaced by its backup
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "last_version": 7,
//   "entries": {
//     "sip:alice@example.com": { "version": 7, "data": "{\"bindings\":{...}}" }
//   }
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Error;
use crate::traits::kv_store::{KvStore, VersionedValue};

/// Store file format version
const STORE_FILE_VERSION: &str = "1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    version: u64,
    data: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreFileFormat {
    version: String,
    last_version: u64,
    entries: HashMap<String, StoredEntry>,
}

/// File-based CAS store
///
/// Every successful write or delete is flushed to disk before the call
/// returns. Payloads must be UTF-8 (the record codec always produces JSON).
///
/// # Example
///
/// ```rust,no_run
/// use regstore_core::store::FileKvStore;
/// use regstore_core::traits::KvStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileKvStore::new("/var/lib/regstore/records.json").await?;
///     let version = store.write_if_match("sip:alice@example.com", b"{\"bindings\":{}}", 0).await?;
///     assert!(version > 0);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileKvStore {
    path: PathBuf,
    state: Arc<Mutex<StoreFileFormat>>,
}

impl FileKvStore {
    /// Create or load a file store
    ///
    /// This will:
    /// 1. Create parent directories if needed
    /// 2. Load the existing file
    /// 3. If it is corrupted, load the backup instead
    /// 4. If both fail, start empty
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let state = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(Mutex::new(state)),
        })
    }

    /// Load the store file, falling back to the backup on corruption
    async fn load_with_recovery(path: &Path) -> Result<StoreFileFormat, Error> {
        match Self::load(path).await {
            Ok(state) => {
                tracing::debug!("Loaded store file: {} entries", state.entries.len());
                Ok(state)
            }
            Err(Error::Json(e)) => {
                tracing::warn!(
                    "Store file {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty store.");
                    return Ok(Self::empty_state());
                }

                match Self::load(&backup_path).await {
                    Ok(state) => {
                        tracing::info!("Recovered store from backup: {} entries", state.entries.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!(
                                "Failed to restore store file from backup: {}",
                                restore_err
                            );
                        }
                        Ok(state)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup also unreadable: {}. Starting with empty store.",
                            backup_err
                        );
                        Ok(Self::empty_state())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn load(path: &Path) -> Result<StoreFileFormat, Error> {
        if !path.exists() {
            tracing::debug!("Store file does not exist: {}", path.display());
            return Ok(Self::empty_state());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::store_unavailable(format!(
                "Failed to read store file {}: {}",
                path.display(),
                e
            ))
        })?;

        let state: StoreFileFormat = serde_json::from_str(&content)?;

        if state.version != STORE_FILE_VERSION {
            tracing::warn!(
                "Store file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STORE_FILE_VERSION,
                state.version
            );
        }

        Ok(state)
    }

    fn empty_state() -> StoreFileFormat {
        StoreFileFormat {
            version: STORE_FILE_VERSION.to_string(),
            ..Default::default()
        }
    }

    /// Write the given state to disk atomically
    async fn persist(&self, state: &StoreFileFormat) -> Result<(), Error> {
        let json = serde_json::to_string_pretty(state)?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.flush().await.map_err(|e| {
                Error::store_unavailable(format!(
                    "Failed to flush temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists()
            && let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await
        {
            tracing::warn!("Failed to create backup: {}", e);
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::store_unavailable(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Store written to file: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn fetch(&self, key: &str) -> Result<Option<VersionedValue>, Error> {
        let guard = self.state.lock().await;
        Ok(guard
            .entries
            .get(key)
            .map(|entry| VersionedValue::new(entry.data.as_bytes(), entry.version)))
    }

    async fn write_if_match(&self, key: &str, data: &[u8], version: u64) -> Result<u64, Error> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::store_unavailable(format!("Payload for {} is not UTF-8: {}", key, e)))?;

        // The lock is held across the disk write so writers are serialized
        let mut guard = self.state.lock().await;

        let stored = guard.entries.get(key).map(|e| e.version).unwrap_or(0);
        if stored != version {
            return Err(Error::version_conflict(format!(
                "{}: expected version {}, found {}",
                key, version, stored
            )));
        }

        let mut next = guard.clone();
        next.last_version += 1;
        let new_version = next.last_version;
        next.entries.insert(
            key.to_string(),
            StoredEntry {
                version: new_version,
                data: text.to_string(),
            },
        );

        self.persist(&next).await?;
        *guard = next;
        Ok(new_version)
    }

    async fn delete_if_match(&self, key: &str, version: u64) -> Result<(), Error> {
        let mut guard = self.state.lock().await;

        match guard.entries.get(key) {
            Some(entry) if entry.version == version => {}
            Some(entry) => {
                return Err(Error::version_conflict(format!(
                    "{}: expected version {}, found {}",
                    key, version, entry.version
                )));
            }
            None => {
                return Err(Error::version_conflict(format!(
                    "{}: expected version {}, key is gone",
                    key, version
                )));
            }
        }

        let mut next = guard.clone();
        next.entries.remove(key);

        self.persist(&next).await?;
        *guard = next;
        Ok(())
    }

    fn store_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_persists_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = FileKvStore::new(&path).await.unwrap();
        assert!(store.fetch("aor").await.unwrap().is_none());

        let version = store.write_if_match("aor", b"{\"bindings\":{}}", 0).await.unwrap();
        assert!(path.exists());

        let reopened = FileKvStore::new(&path).await.unwrap();
        let value = reopened.fetch("aor").await.unwrap().unwrap();
        assert_eq!(value.version, version);
        assert_eq!(value.data, b"{\"bindings\":{}}");

        // Version counter survives the restart
        let next = reopened.write_if_match("other", b"{}", 0).await.unwrap();
        assert!(next > version);
    }

    #[tokio::test]
    async fn test_file_store_cas_conflict_leaves_file_untouched() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = FileKvStore::new(&path).await.unwrap();
        let v1 = store.write_if_match("aor", b"one", 0).await.unwrap();
        store.write_if_match("aor", b"two", v1).await.unwrap();

        let err = store.write_if_match("aor", b"stale", v1).await.unwrap_err();
        assert!(err.is_version_conflict());

        let reopened = FileKvStore::new(&path).await.unwrap();
        assert_eq!(reopened.fetch("aor").await.unwrap().unwrap().data, b"two");
    }

    #[tokio::test]
    async fn test_file_store_delete() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = FileKvStore::new(&path).await.unwrap();
        let v1 = store.write_if_match("aor", b"one", 0).await.unwrap();
        store.delete_if_match("aor", v1).await.unwrap();

        assert!(store.delete_if_match("aor", v1).await.unwrap_err().is_version_conflict());

        let reopened = FileKvStore::new(&path).await.unwrap();
        assert!(reopened.fetch("aor").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_corruption_recovery() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        let store = FileKvStore::new(&path).await.unwrap();
        let v1 = store.write_if_match("aor", b"first", 0).await.unwrap();
        store.write_if_match("aor", b"second", v1).await.unwrap();

        let backup_path = FileKvStore::backup_path(&path);
        assert!(backup_path.exists(), "Backup file should exist after write");

        fs::write(&path, b"corrupted json data").await.unwrap();

        let recovered = FileKvStore::new(&path).await.unwrap();
        let value = recovered.fetch("aor").await.unwrap().unwrap();
        // Backup holds the state from before the last write
        assert_eq!(value.data, b"first");
        assert_eq!(value.version, v1);
    }

    #[tokio::test]
    async fn test_file_store_rejects_non_utf8_payload() {
        let dir = tempdir().unwrap();
        let store = FileKvStore::new(dir.path().join("records.json")).await.unwrap();

        let err = store.write_if_match("aor", &[0xff, 0xfe], 0).await.unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StoreUnavailable);
        assert!(store.fetch("aor").await.unwrap().is_none());
    }
}
