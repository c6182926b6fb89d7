//! Key/value local store
//!
//! [`LocalStore`] is deliberately synchronous: the unload flush must finish
//! before the process is torn down, so no write may depend on the runtime.
//! Writes are last-writer-wins; there is no cross-process locking.

use crate::error::StorageError;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// String key/value persistence
pub trait LocalStore: Send + Sync {
    /// Value stored under `key`
    ///
    /// # Errors
    /// Backend read failure
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    /// Backend write failure
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Delete `key`; deleting a missing key is not an error
    ///
    /// # Errors
    /// Backend write failure
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Keys starting with `prefix`, sorted
    ///
    /// # Errors
    /// Backend read failure
    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

impl<T: LocalStore + ?Sized> LocalStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        (**self).keys(prefix)
    }
}

/// Read and decode a JSON record
///
/// # Errors
/// Backend failure, or [`StorageError::Decode`] for a corrupt record
pub fn read_json<T: DeserializeOwned>(
    store: &dyn LocalStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    store
        .get(key)?
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StorageError::Decode {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
}

/// Encode and write a JSON record
///
/// # Errors
/// [`StorageError::Encode`] or backend failure
pub fn write_json<T: Serialize>(
    store: &dyn LocalStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let raw = serde_json::to_string(value).map_err(|source| StorageError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, &raw)
}

/// In-process store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        Ok(self
            .entries
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

/// One file per key under a directory
///
/// Writes go to a temporary sibling and are renamed into place, so a reader
/// sees either the old or the new record.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

const RECORD_EXT: &str = "json";

impl FileStore {
    /// Store rooted at `root`, created if missing
    ///
    /// # Errors
    /// [`StorageError::Io`] if the directory cannot be created
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io_error(&root, e))?;
        Ok(Self { root })
    }

    /// Root directory
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{RECORD_EXT}", encode_key(key)))
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io_error(path, e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, value).map_err(|e| StorageError::io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::io_error(&path, e))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io_error(path, e)),
        }
    }

    fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::io_error(&self.root, e))?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io_error(&self.root, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXT) {
                continue;
            }
            let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_key)
            else {
                continue;
            };
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Keys become file stems; everything outside `[A-Za-z0-9._~-]` is escaped
fn encode_key(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

fn decode_key(encoded: &str) -> Option<String> {
    urlencoding::decode(encoded).ok().map(|key| key.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn memory_store_filters_by_prefix() {
        let store = MemoryStore::new();
        store.set("wizsync:draft:a", "1").unwrap();
        store.set("wizsync:progress:r1", "2").unwrap();
        assert_eq!(store.keys("wizsync:draft:").unwrap(), vec!["wizsync:draft:a"]);
        store.remove("wizsync:draft:a").unwrap();
        store.remove("wizsync:draft:a").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn file_store_round_trips_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        store.set("wizsync:selected-websites:q/1", "[\"w1\"]").unwrap();

        assert_eq!(
            store.get("wizsync:selected-websites:q/1").unwrap().as_deref(),
            Some("[\"w1\"]")
        );
        assert_eq!(
            store.keys("wizsync:selected-websites:").unwrap(),
            vec!["wizsync:selected-websites:q/1"]
        );
        assert!(store.get("missing").unwrap().is_none());
        assert!(dir.path().join("wizsync%3Aselected-websites%3Aq%2F1.json").exists());
    }

    #[test]
    fn corrupt_record_is_reported() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        let err = read_json::<serde_json::Value>(&store, "k").unwrap_err();
        assert!(err.is_corrupt());
    }

    proptest! {
        #[test]
        fn prop_key_encoding_is_reversible(key in "\\PC{0,40}") {
            prop_assert_eq!(decode_key(&encode_key(&key)), Some(key));
        }
    }
}
