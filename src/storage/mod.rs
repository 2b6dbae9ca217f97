use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to read state file: {path}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write state file: {path}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to encode or decode stored value for `{key}`")]
    Codec {
        key: String,
        source: serde_json::Error,
    },
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Small persisted key/value store for client-side state that must survive
/// restarts. Writers replace whole values; there are no partial updates.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> StorageResult<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> StorageResult<()>;
    fn remove(&self, key: &str) -> StorageResult<()>;
}

pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> StorageResult<Option<T>> {
    let Some(value) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_value(value)
        .map(Some)
        .map_err(|source| StorageError::Codec {
            key: key.to_string(),
            source,
        })
}

pub fn store_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> StorageResult<()> {
    let value = serde_json::to_value(value).map_err(|source| StorageError::Codec {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.lock().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// JSON object on disk, rewritten in full on every change. A missing or
/// corrupt file reads as empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> StorageResult<BTreeMap<String, Value>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(source) => {
                return Err(StorageError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_str(&contents) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                let path = self.path.display();
                tracing::warn!(?err, %path, "state file is corrupt; starting empty");
                Ok(BTreeMap::new())
            }
        }
    }

    fn write_all(&self, entries: &BTreeMap<String, Value>) -> StorageResult<()> {
        let write_err = |source| StorageError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let serialized = serde_json::to_string_pretty(entries).map_err(|source| {
            StorageError::Codec {
                key: "*".to_string(),
                source,
            }
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, serialized).map_err(write_err)?;
        fs::rename(&temp_path, &self.path).map_err(write_err)
    }

    fn modify(&self, apply: impl FnOnce(&mut BTreeMap<String, Value>)) -> StorageResult<()> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut entries = self.read_all()?;
        apply(&mut entries);
        self.write_all(&entries)
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}
