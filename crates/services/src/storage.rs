//! Durable key-value storage for client-side state.
//!
//! Values are opaque strings; callers own the serialization format.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("no storage directory available")]
    NoLocation,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    /// Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// One file per key inside a directory
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<data dir>/storage` for this application.
    pub fn default_location() -> Result<PathBuf, StorageError> {
        directories::ProjectDirs::from("com.local", "MindChat", "MindChat")
            .map(|p| p.data_dir().join("storage"))
            .ok_or(StorageError::NoLocation)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", name))
    }
}

fn io_err(key: &str) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        key: key.to_string(),
        source,
    }
}

impl KeyValueStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(key)(e)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(io_err(key))?;
        let path = self.path_for(key);
        // Readers never see a half-written value.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).map_err(io_err(key))?;
        fs::rename(&tmp, &path).map_err(io_err(key))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(key)(e)),
        }
    }
}

/// In-process store, used for tests and ephemeral sessions
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl KeyValueStore for MemoryStorage {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_storage_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path().join("nested"));

        assert_eq!(store.get("session").unwrap(), None);

        store.set("session", "[1,2,3]").unwrap();
        assert_eq!(store.get("session").unwrap().as_deref(), Some("[1,2,3]"));

        store.set("session", "[]").unwrap();
        assert_eq!(store.get("session").unwrap().as_deref(), Some("[]"));

        store.remove("session").unwrap();
        assert_eq!(store.get("session").unwrap(), None);
        store.remove("session").unwrap();
    }

    #[test]
    fn test_keys_are_sanitized_to_file_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStorage::new(dir.path());

        store.set("../escape/key", "x").unwrap();

        assert!(dir.path().join(".._escape_key.json").exists());
        assert_eq!(store.get("../escape/key").unwrap().as_deref(), Some("x"));
    }

    #[test]
    fn test_memory_storage() {
        let store = MemoryStorage::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.len(), 1);
        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert!(store.is_empty());
    }
}
