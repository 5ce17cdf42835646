//! ==============================================================================
//! store.rs - flat key/value non-volatile store
//! ==============================================================================
//!
//! purpose:
//!     the persistence boundary used by the history log. it mirrors the shape
//!     of an NVS partition: a flat namespace of short keys holding either a u16
//!     or a string, a fixed capacity, and an explicit commit.
//!
//! backends:
//!     - FileStore: json file on disk. writes are staged in memory and
//!       commit() replaces the file atomically (temp file + fsync + rename).
//!     - MemoryStore: volatile map, used by tests and as the fallback when the
//!       data directory is unusable.
//!
//! "open" is construction and "close" is Drop.
//!
//! ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key '{0}' not found")]
    NotFound(String),
    #[error("key '{0}' holds a different type")]
    TypeMismatch(String),
    #[error("store is full ({capacity} entries)")]
    Full { capacity: usize },
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("store contents are corrupt: {0}")]
    Corrupt(String),
    #[error("storage operation timed out")]
    Timeout,
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoredValue {
    U16(u16),
    Str(String),
}

pub trait KvStore: Send {
    fn get_u16(&self, key: &str) -> Result<u16, StorageError>;
    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StorageError>;
    fn get_str(&self, key: &str) -> Result<String, StorageError>;
    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn erase_all(&mut self) -> Result<(), StorageError>;
    /// make every write so far durable before returning
    fn commit(&mut self) -> Result<(), StorageError>;
}

// ==============================================================================
// shared map logic
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Entries {
    namespace: String,
    entries: BTreeMap<String, StoredValue>,
}

impl Entries {
    fn get_u16(&self, key: &str) -> Result<u16, StorageError> {
        match self.entries.get(key) {
            Some(StoredValue::U16(v)) => Ok(*v),
            Some(_) => Err(StorageError::TypeMismatch(key.to_string())),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    fn get_str(&self, key: &str) -> Result<String, StorageError> {
        match self.entries.get(key) {
            Some(StoredValue::Str(s)) => Ok(s.clone()),
            Some(_) => Err(StorageError::TypeMismatch(key.to_string())),
            None => Err(StorageError::NotFound(key.to_string())),
        }
    }

    fn insert(&mut self, key: &str, value: StoredValue, capacity: usize) -> Result<(), StorageError> {
        if !self.entries.contains_key(key) && self.entries.len() >= capacity {
            return Err(StorageError::Full { capacity });
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

// ==============================================================================
// memory store
// ==============================================================================

pub struct MemoryStore {
    map: Entries,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(namespace: &str, capacity: usize) -> Self {
        Self {
            map: Entries { namespace: namespace.to_string(), entries: BTreeMap::new() },
            capacity,
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.entries.len()
    }
}

impl KvStore for MemoryStore {
    fn get_u16(&self, key: &str) -> Result<u16, StorageError> {
        self.map.get_u16(key)
    }

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StorageError> {
        self.map.insert(key, StoredValue::U16(value), self.capacity)
    }

    fn get_str(&self, key: &str) -> Result<String, StorageError> {
        self.map.get_str(key)
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map.insert(key, StoredValue::Str(value.to_string()), self.capacity)
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        self.map.entries.clear();
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

// ==============================================================================
// file store
// ==============================================================================

pub struct FileStore {
    path: PathBuf,
    map: Entries,
    capacity: usize,
    dirty: bool,
}

impl FileStore {
    /// open an existing data file, or start empty if there is none yet
    pub fn open<P: AsRef<Path>>(path: P, namespace: &str, capacity: usize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let map = match fs::read_to_string(&path) {
            Ok(content) => {
                let map: Entries = serde_json::from_str(&content)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                if map.namespace != namespace {
                    return Err(StorageError::Corrupt(format!(
                        "namespace '{}' does not match '{}'",
                        map.namespace, namespace
                    )));
                }
                map
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Entries { namespace: namespace.to_string(), entries: BTreeMap::new() }
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, map, capacity, dirty: false })
    }

    /// create an empty store, overwriting whatever the data file held
    pub fn create_empty<P: AsRef<Path>>(path: P, namespace: &str, capacity: usize) -> Result<Self, StorageError> {
        let mut store = Self {
            path: path.as_ref().to_path_buf(),
            map: Entries { namespace: namespace.to_string(), entries: BTreeMap::new() },
            capacity,
            dirty: true,
        };
        store.commit()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_file(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_vec_pretty(&self.map)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        sync_parent_dir(&self.path)?;
        Ok(())
    }
}

/// fsync the directory holding `path` so a completed rename survives a crash
#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> Result<(), StorageError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

/// directories cannot be opened for syncing here; the rename is the best we get
#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> Result<(), StorageError> {
    Ok(())
}

impl KvStore for FileStore {
    fn get_u16(&self, key: &str) -> Result<u16, StorageError> {
        self.map.get_u16(key)
    }

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StorageError> {
        self.map.insert(key, StoredValue::U16(value), self.capacity)?;
        self.dirty = true;
        Ok(())
    }

    fn get_str(&self, key: &str) -> Result<String, StorageError> {
        self.map.get_str(key)
    }

    fn set_str(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map.insert(key, StoredValue::Str(value.to_string()), self.capacity)?;
        self.dirty = true;
        Ok(())
    }

    fn erase_all(&mut self) -> Result<(), StorageError> {
        self.map.entries.clear();
        self.dirty = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        self.write_file()?;
        self.dirty = false;
        Ok(())
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if self.dirty {
            tracing::debug!("[STORE] Closing {} with uncommitted writes", self.path.display());
        }
    }
}
