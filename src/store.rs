//! Key/value configuration store.
//!
//! Layout parameters, key profiles, saved device settings and the detected
//! frame interval are all persisted through a [`ConfigStore`]. Values are
//! JSON documents keyed by slash-separated strings such as
//! `vcontroller/device/0` or `profile/keyboard/My Pad`.

use crate::error::PersistenceError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Backing storage for persisted settings.
pub trait ConfigStore {
    fn load_value(&self, key: &str) -> Result<Option<Value>, PersistenceError>;

    /// Store `value` under `key`. On failure the store may still hold the
    /// new value in memory; only the durable write failed.
    fn save_value(&mut self, key: &str, value: Value) -> Result<(), PersistenceError>;

    /// Returns whether the key existed.
    fn remove_value(&mut self, key: &str) -> Result<bool, PersistenceError>;

    fn keys(&self) -> Vec<String>;
}

/// Store kept in a single JSON file, rewritten atomically on every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file doesn't exist.
    /// A corrupt file is logged and replaced on the next write.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        let values = if path.exists() {
            let contents = fs::read_to_string(path).map_err(|e| PersistenceError::ReadFailed {
                path: path.display().to_string(),
                source: e,
            })?;
            match serde_json::from_str(&contents) {
                Ok(values) => values,
                Err(e) => {
                    warn!("Store file {:?} is corrupt ({}), starting empty", path, e);
                    BTreeMap::new()
                }
            }
        } else {
            info!("No store file at {:?}, starting empty", path);
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            values,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the whole map to disk using a temp file and rename.
    fn flush(&self) -> Result<(), PersistenceError> {
        let write_err = |e: std::io::Error| PersistenceError::WriteFailed {
            path: self.path.display().to_string(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(&self.values).map_err(|e| {
            PersistenceError::Encode {
                key: "*".to_string(),
                source: e,
            }
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&temp_path).map_err(write_err)?;
            file.write_all(json.as_bytes()).map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }
        fs::rename(&temp_path, &self.path).map_err(write_err)?;

        debug!("Flushed {} store entries to {:?}", self.values.len(), self.path);
        Ok(())
    }
}

impl ConfigStore for JsonFileStore {
    fn load_value(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.values.get(key).cloned())
    }

    fn save_value(&mut self, key: &str, value: Value) -> Result<(), PersistenceError> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }

    fn remove_value(&mut self, key: &str) -> Result<bool, PersistenceError> {
        if self.values.remove(key).is_none() {
            return Ok(false);
        }
        self.flush()?;
        Ok(true)
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// In-memory store. Writes can be made to fail through the failure switch.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, Value>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared flag that makes every subsequent write fail while set.
    pub fn failure_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fail_writes)
    }

    fn check_writable(&self, key: &str) -> Result<(), PersistenceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(PersistenceError::Rejected(key.to_string()));
        }
        Ok(())
    }
}

impl ConfigStore for MemoryStore {
    fn load_value(&self, key: &str) -> Result<Option<Value>, PersistenceError> {
        Ok(self.values.get(key).cloned())
    }

    fn save_value(&mut self, key: &str, value: Value) -> Result<(), PersistenceError> {
        self.check_writable(key)?;
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn remove_value(&mut self, key: &str) -> Result<bool, PersistenceError> {
        self.check_writable(key)?;
        Ok(self.values.remove(key).is_some())
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

/// Shared, typed access to a [`ConfigStore`].
#[derive(Clone)]
pub struct StoreHandle(Arc<Mutex<dyn ConfigStore + Send>>);

impl StoreHandle {
    pub fn new<S: ConfigStore + Send + 'static>(store: S) -> Self {
        let inner: Arc<Mutex<dyn ConfigStore + Send>> = Arc::new(Mutex::new(store));
        Self(inner)
    }

    /// Handle over a fresh [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistenceError> {
        let store = self.0.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        match store.load_value(key)? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| PersistenceError::Decode {
                    key: key.to_string(),
                    source: e,
                }),
            None => Ok(None),
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), PersistenceError> {
        let value = serde_json::to_value(value).map_err(|e| PersistenceError::Encode {
            key: key.to_string(),
            source: e,
        })?;
        let mut store = self.0.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        store.save_value(key, value)
    }

    pub fn remove(&self, key: &str) -> Result<bool, PersistenceError> {
        let mut store = self.0.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        store.remove_value(key)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, PersistenceError> {
        let store = self.0.lock().map_err(|_| PersistenceError::LockPoisoned)?;
        Ok(store
            .keys()
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle").finish_non_exhaustive()
    }
}
