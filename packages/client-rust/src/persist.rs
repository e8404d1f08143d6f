//! Durable key-value storage for client state.
//!
//! Table definitions, sync preferences and the auth session are each
//! serialized as JSON under a stable key. Values are loaded once at startup
//! and written back on every mutation.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Key under which the ordered table list is stored.
pub const TABLES_KEY: &str = "tables";
/// Key under which the table-id to enabled map is stored.
pub const SYNC_PREFERENCES_KEY: &str = "sync_preferences";
/// Key under which the auth credential is stored.
pub const SESSION_KEY: &str = "session";

/// Pluggable persistence backend for client state.
/// Implementations: JSON files on disk, memory (tests).
pub trait KeyValueStore: Send + Sync {
    /// Load the raw value stored under `key`, if any.
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Delete the value under `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Loads and deserializes the JSON value under `key`.
///
/// # Errors
///
/// Returns an error if the backend fails or the stored value is not valid
/// JSON for `T`.
pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serializes `value` as JSON and stores it under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the backend write fails.
pub fn save_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw)
}

/// Serialized value awaiting its write, stamped with the order it was taken in.
#[derive(Debug)]
pub struct Snapshot {
    version: u64,
    raw: String,
}

/// Writes one key's snapshots outside the owner's state lock.
///
/// Callers take a snapshot while holding their own lock, release it, then
/// write. Writes for one key are serialized here, and a snapshot older than
/// the last one written is dropped, so a slow write never reorders state.
#[derive(Debug)]
pub struct SnapshotWriter {
    key: &'static str,
    taken: AtomicU64,
    written: Mutex<u64>,
}

impl SnapshotWriter {
    #[must_use]
    pub fn new(key: &'static str) -> Self {
        Self {
            key,
            taken: AtomicU64::new(0),
            written: Mutex::new(0),
        }
    }

    /// Serializes `value`. Call under the lock that guards `value`.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn take<T: Serialize + ?Sized>(&self, value: &T) -> anyhow::Result<Snapshot> {
        let raw = serde_json::to_string(value)?;
        let version = self.taken.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Snapshot { version, raw })
    }

    /// Stores `snapshot` unless a newer one was already written. Returns
    /// whether it was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn write(&self, store: &dyn KeyValueStore, snapshot: Snapshot) -> anyhow::Result<bool> {
        let mut written = self.written.lock();
        if snapshot.version <= *written {
            return Ok(false);
        }
        store.put(self.key, &snapshot.raw)?;
        *written = snapshot.version;
        Ok(true)
    }
}

/// In-memory store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a data directory.
///
/// Writes go to a temporary sibling file first and are renamed into place,
/// so a crash never leaves a half-written value behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Opens (creating if needed) the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            anyhow::bail!("invalid storage key: {key:?}");
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        match fs::read_to_string(self.path_for(key)?) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        match fs::remove_file(self.path_for(key)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
