use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use engine_logging::engine_warn;
use sifter_core::{Patch, PersistedRecord};
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::ContextId;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("could not serialize record: {0}")]
    Serialize(String),
    #[error("could not deserialize record: {0}")]
    Deserialize(String),
}

/// A write observed by other contexts of the same origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreChange {
    pub key: String,
    pub writer: ContextId,
    pub old_value: Option<String>,
    pub new_value: String,
}

/// Origin-scoped synchronous key-value storage.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, writer: ContextId, key: &str, value: &str) -> Result<(), StoreError>;

    /// Change notifications, if the backing storage can produce them.
    /// The writing context never sees its own changes.
    fn subscribe(&self) -> Option<broadcast::Receiver<StoreChange>>;

    /// Whether `get`/`set` block on disk I/O.
    fn is_blocking(&self) -> bool {
        false
    }
}

/// In-process storage shared by every context of an origin.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    changes: broadcast::Sender<StoreChange>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            changes,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, writer: ContextId, key: &str, value: &str) -> Result<(), StoreError> {
        let old_value = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.insert(key.to_string(), value.to_string())
        };
        if old_value.as_deref() != Some(value) {
            // No subscribers is fine.
            let _ = self.changes.send(StoreChange {
                key: key.to_string(),
                writer,
                old_value,
                new_value: value.to_string(),
            });
        }
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StoreChange>> {
        Some(self.changes.subscribe())
    }
}

/// One file per key under `dir`, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.ron"))
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, _writer: ContextId, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let target = self.path_for(key);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(value.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;
        tmp.persist(&target).map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<StoreChange>> {
        None
    }

    fn is_blocking(&self) -> bool {
        true
    }
}

/// The session record kept under a single namespaced key.
#[derive(Clone)]
pub struct RecordStore {
    store: Arc<dyn DurableStore>,
    key: String,
}

impl RecordStore {
    pub fn new(store: Arc<dyn DurableStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> Result<Option<PersistedRecord>, StoreError> {
        self.store
            .get(&self.key)?
            .map(|text| decode_record(&text))
            .transpose()
    }

    /// Read-merge-write: fields written by other contexts since our last read
    /// are kept. Returns whether anything was written.
    pub fn merge_write(&self, writer: ContextId, patch: &Patch) -> Result<bool, StoreError> {
        let current = match self.load() {
            Ok(record) => record,
            Err(err) => {
                engine_warn!(ctx = writer; "Replacing unreadable record {}: {}", self.key, err);
                None
            }
        };
        let existed = current.is_some();
        let before = current.unwrap_or_default();
        let mut merged = before.clone();
        merged.apply(patch);
        if existed && merged == before {
            return Ok(false);
        }
        self.store.set(writer, &self.key, &encode_record(&merged)?)?;
        Ok(true)
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<StoreChange>> {
        self.store.subscribe()
    }

    pub fn is_blocking(&self) -> bool {
        self.store.is_blocking()
    }
}

pub fn encode_record(record: &PersistedRecord) -> Result<String, StoreError> {
    let pretty = ron::ser::PrettyConfig::new();
    ron::ser::to_string_pretty(record, pretty).map_err(|err| StoreError::Serialize(err.to_string()))
}

pub fn decode_record(text: &str) -> Result<PersistedRecord, StoreError> {
    ron::from_str(text).map_err(|err| StoreError::Deserialize(err.to_string()))
}
