//! Preference store.
//!
//! All widgets share one serialized blob shaped `{ aspect: { key: value } }`.
//! Writes go through [`PreferenceStore::update`], which re-reads the whole
//! blob, mutates one aspect and writes it back while holding the store lock,
//! so keys written by a sibling widget since our last read survive.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Key/value map of a single aspect.
pub type AspectMap = Map<String, Value>;

/// Error while persisting preferences
#[derive(Debug, Clone, PartialEq)]
pub struct StorageError {
    pub message: String,
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Backing medium for the serialized blob.
pub trait Storage: Send {
    /// The stored blob, `None` when nothing was written yet.
    fn read(&self) -> Result<Option<String>, StorageError>;
    fn write(&mut self, blob: &str) -> Result<(), StorageError>;
}

/// Volatile storage; the blob lives as long as the store.
#[derive(Default)]
pub struct MemoryStorage {
    blob: Option<String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Some(blob.into()),
        }
    }
}

impl Storage for MemoryStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        Ok(self.blob.clone())
    }

    fn write(&mut self, blob: &str) -> Result<(), StorageError> {
        self.blob = Some(blob.to_string());
        Ok(())
    }
}

/// JSON file storage, replaced atomically on every write.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Storage for FileStorage {
    fn read(&self) -> Result<Option<String>, StorageError> {
        if !self.path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&self.path)
            .map(Some)
            .map_err(|e| StorageError {
                message: format!("Could not read {}: {}", self.path.display(), e),
            })
    }

    fn write(&mut self, blob: &str) -> Result<(), StorageError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| StorageError {
                message: format!("Failed to create {}: {}", dir.display(), e),
            })?;
        }
        let temp = self
            .path
            .with_extension(format!("tmp.{}", std::process::id()));
        std::fs::write(&temp, blob).map_err(|e| StorageError {
            message: format!("Failed to write {}: {}", temp.display(), e),
        })?;
        std::fs::rename(&temp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&temp);
            StorageError {
                message: format!("Failed to commit {}: {}", self.path.display(), e),
            }
        })
    }
}

/// Shared handle to the preference blob.
#[derive(Clone)]
pub struct PreferenceStore {
    storage: Arc<Mutex<Box<dyn Storage>>>,
}

impl PreferenceStore {
    pub fn new(storage: impl Storage + 'static) -> Self {
        Self {
            storage: Arc::new(Mutex::new(Box::new(storage))),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryStorage::new())
    }

    /// Current values of one aspect. Unreadable or malformed blobs read as empty.
    pub fn snapshot(&self, aspect: &str) -> AspectMap {
        match self.storage.lock() {
            Ok(storage) => aspect_of(&read_record(&**storage), aspect),
            Err(_) => AspectMap::new(),
        }
    }

    /// Read-modify-write one aspect under the store lock and return the
    /// aspect as written.
    pub fn update<F>(&self, aspect: &str, mutate: F) -> Result<AspectMap, StorageError>
    where
        F: FnOnce(&mut AspectMap),
    {
        let mut storage = self.storage.lock().map_err(|_| StorageError {
            message: "preference store lock poisoned".into(),
        })?;
        let mut record = read_record(&**storage);
        let mut values = aspect_of(&record, aspect);
        mutate(&mut values);
        record.insert(aspect.to_string(), Value::Object(values.clone()));
        let blob = serde_json::to_string(&Value::Object(record)).map_err(|e| StorageError {
            message: format!("Failed to serialize preferences: {}", e),
        })?;
        storage.write(&blob)?;
        Ok(values)
    }
}

fn read_record(storage: &dyn Storage) -> Map<String, Value> {
    let blob = match storage.read() {
        Ok(Some(blob)) => blob,
        Ok(None) => return Map::new(),
        Err(e) => {
            log::warn!("{}; starting with empty preferences", e);
            return Map::new();
        }
    };
    match serde_json::from_str::<Value>(&blob) {
        Ok(Value::Object(record)) => record,
        Ok(_) | Err(_) => {
            log::warn!("malformed preference blob, resetting");
            Map::new()
        }
    }
}

fn aspect_of(record: &Map<String, Value>, aspect: &str) -> AspectMap {
    match record.get(aspect) {
        Some(Value::Object(values)) => values.clone(),
        _ => AspectMap::new(),
    }
}

/// One widget's view of the store, scoped to its aspect.
pub struct Profile {
    aspect: String,
    store: PreferenceStore,
    values: AspectMap,
}

impl Profile {
    pub fn new(store: &PreferenceStore, aspect: &str) -> Self {
        let mut profile = Self {
            aspect: aspect.to_string(),
            store: store.clone(),
            values: AspectMap::new(),
        };
        profile.load();
        profile
    }

    pub fn aspect(&self) -> &str {
        &self.aspect
    }

    /// Re-read the aspect from the store.
    pub fn load(&mut self) {
        self.values = self.store.snapshot(&self.aspect);
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Typed read; a stored value of the wrong shape reads as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Store `value` under `key`, durably. The profile also picks up
    /// whatever siblings wrote to the aspect meanwhile.
    pub fn set<T: Serialize>(&mut self, key: &str, value: T) -> Result<(), StorageError> {
        let value = serde_json::to_value(value).map_err(|e| StorageError {
            message: format!("Failed to serialize {}: {}", key, e),
        })?;
        let key = key.to_string();
        self.values = self.store.update(&self.aspect, move |values| {
            values.insert(key, value);
        })?;
        Ok(())
    }

    /// Remove `key` from the aspect.
    pub fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.values = self.store.update(&self.aspect, move |values| {
            values.remove(&key);
        })?;
        Ok(())
    }
}
