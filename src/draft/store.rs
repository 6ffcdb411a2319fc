//! String-keyed local storage for drafts.
//!
//! SYSTEM CONTEXT
//! ==============
//! Drafts outlive the process, so the store is a synchronous string map
//! with two backends: `MemoryStore` for tests and ephemeral sessions, and
//! `FileStore`, which keeps the whole map in one JSON file and replaces it
//! atomically on every write.

#[cfg(test)]
#[path = "store_test.rs"]
mod store_test;

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::DraftError;

/// Synchronous string map.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns `DraftError::Io` if the backend can't be read.
    fn get(&self, key: &str) -> Result<Option<String>, DraftError>;

    /// # Errors
    ///
    /// Returns `DraftError::Io` if the backend can't be written.
    fn set(&self, key: &str, value: &str) -> Result<(), DraftError>;

    /// # Errors
    ///
    /// Returns `DraftError::Io` if the backend can't be written.
    fn remove(&self, key: &str) -> Result<(), DraftError>;
}

/// Load and decode a JSON value stored under `key`.
///
/// # Errors
///
/// Propagates store errors; undecodable values are `DraftError::Corrupt`.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>, DraftError> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| DraftError::Corrupt { key: key.to_owned(), reason: e.to_string() })
}

/// Encode `value` as JSON and store it under `key`.
///
/// # Errors
///
/// Propagates store errors.
pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), DraftError> {
    let raw = serde_json::to_string(value).map_err(|e| DraftError::Encode(e.to_string()))?;
    store.set(key, &raw)
}

// =============================================================================
// MEMORY
// =============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set`/`remove` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, DraftError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DraftError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), DraftError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// =============================================================================
// FILE
// =============================================================================

/// Whole-map JSON file. Reads go to disk every time so several processes
/// sharing a file see each other's drafts.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, DraftError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(DraftError::Io(e.to_string())),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw).map_err(|e| DraftError::Corrupt {
            key: self.path.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), DraftError> {
        let raw = serde_json::to_vec_pretty(map).map_err(|e| DraftError::Encode(e.to_string()))?;
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| DraftError::Io(e.to_string()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp).map_err(|e| DraftError::Io(e.to_string()))?;
        file.write_all(&raw).map_err(|e| DraftError::Io(e.to_string()))?;
        file.sync_all().map_err(|e| DraftError::Io(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| DraftError::Io(e.to_string()))
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<(), DraftError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.read_map()?;
        f(&mut map);
        self.write_map(&map)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, DraftError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), DraftError> {
        self.update(|map| {
            map.insert(key.to_owned(), value.to_owned());
        })
    }

    fn remove(&self, key: &str) -> Result<(), DraftError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}
