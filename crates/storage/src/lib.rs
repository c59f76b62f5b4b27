use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read store file '{path}': {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write store file '{path}': {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("store file '{path}' is not a JSON object: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to encode value for key '{key}': {source}")]
    Encode {
        key: String,
        source: serde_json::Error,
    },
}

/// Key/value storage that survives restarts.
///
/// `set` only touches the in-memory view; nothing reaches the backing medium
/// until `save` is called.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Option<&Value>;
    fn set(&mut self, key: &str, value: Value);
    fn save(&mut self) -> Result<(), StoreError>;
}

pub type SharedStore = Arc<Mutex<dyn KeyValueStore>>;

pub fn shared<S: KeyValueStore + 'static>(store: S) -> SharedStore {
    Arc::new(Mutex::new(store))
}

/// Reads `key` as `T`. A missing key or a value of the wrong shape yields `None`.
pub fn get_typed<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let value = store.get(key)?;
    match T::deserialize(value) {
        Ok(typed) => Some(typed),
        Err(err) => {
            debug!(key, %err, "stored value has unexpected shape; ignoring");
            None
        }
    }
}

pub fn set_typed<T: Serialize>(
    store: &mut dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StoreError> {
    let value = serde_json::to_value(value).map_err(|source| StoreError::Encode {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value);
    Ok(())
}

/// All keys live in one JSON object written to a single file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    objects: BTreeMap<String, Value>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let objects = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        debug!(path = %path.display(), keys = objects.len(), "opened key/value store");
        Ok(Self { path, objects })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.objects.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.objects.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let encoded = serde_json::to_string(&self.objects).map_err(|source| StoreError::Encode {
            key: String::new(),
            source,
        })?;
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, encoded).map_err(write_err)?;
        fs::rename(&staging, &self.path).map_err(write_err)?;
        Ok(())
    }
}

/// Store that never leaves memory. `save` only counts calls.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    objects: BTreeMap<String, Value>,
    saves: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: &str, value: Value) -> Self {
        self.objects.insert(key.to_string(), value);
        self
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<&Value> {
        self.objects.get(key)
    }

    fn set(&mut self, key: &str, value: Value) {
        self.objects.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<(), StoreError> {
        self.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
