//! Client-local key-value persistence shared by the foreground view and the
//! background worker.
//!
//! Values are plain strings. Structured entries (medication list, daily status)
//! are stored as JSON, markers and the reminder time as bare strings. There is
//! no transaction spanning several keys: every `set` lands on its own.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;
use tracing::warn;

use crate::error::StoreError;

/// Logical store keys.
pub mod keys {
    pub const MEDICATIONS: &str = "medications";
    pub const DAILY_STATUS: &str = "dailyStatus";
    pub const REMINDER_TIME: &str = "reminderTime";
    pub const LAST_RESET: &str = "lastReset";
    /// Last reminder date as seen by the foreground view.
    pub const LAST_REMINDER_SENT: &str = "lastReminderSent";
    /// Last reminder date as seen by the background worker.
    pub const WORKER_LAST_REMINDER_SENT: &str = "worker.lastReminderSent";
}

pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Typed JSON helpers available on every store, including `dyn LocalStore`.
pub trait LocalStoreExt: LocalStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

impl<S: LocalStore + ?Sized> LocalStoreExt for S {}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk.
///
/// The file is re-read on every access, so a write is visible to every later
/// read of the same file. Writes are read-modify-write under a lock held by
/// this handle and land through a uniquely named sibling temporary file that
/// is renamed over the target. Contexts that write different keys of one file
/// must share a single handle (for example through an `Arc`); separate
/// handles or processes get no lock between them and may drop each other's
/// concurrent writes.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;
        let payload = serde_json::to_string_pretty(map)?;
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(payload.as_bytes())?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut BTreeMap<String, String>),
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock();
        let mut map = match self.read_map() {
            Ok(map) => map,
            Err(StoreError::Serde(err)) => {
                warn!(path = %self.path.display(), %err, "store file is corrupt, starting over");
                BTreeMap::new()
            }
            Err(err) => return Err(err),
        };
        apply(&mut map);
        self.write_map(&map)
    }
}

impl LocalStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.read_map()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.update(|map| {
            map.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.update(|map| {
            map.remove(key);
        })
    }
}
