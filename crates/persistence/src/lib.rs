#![deny(unsafe_code)]
#![deny(missing_docs)]

//! # Overview
//!
//! `upload-persistence` implements the one piece of crash-safety the whole
//! service leans on: a mapping from key to value, persisted as a single JSON
//! document, whose `save` is atomic with respect to a process crash
//! mid-write. It is used twice in this workspace — for the server's
//! upload-id-to-session-record registry, and for the client's small local
//! resume file — so the store is generic over its value type rather than
//! hard-coded to [`core::record::SessionRecord`].
//!
//! # Design
//!
//! [`Store`] wraps a [`std::sync::Mutex`] guarding both the in-memory map and
//! knowledge of the on-disk path. `save` writes to a sibling temporary file
//! in the same directory (so the rename stays on one filesystem) and
//! replaces the target path with [`std::fs::rename`], which is atomic on the
//! filesystems this service targets. `load` treats a missing or malformed
//! file as an empty map: corrupt state must never prevent the server from
//! accepting new uploads.
//!
//! [`Store::update`], [`Store::get`], [`Store::delete`], and [`Store::transact`]
//! are read-modify-write compositions that hold the mutex for the entire
//! sequence, so a concurrent `save` can never interleave with one of them.

use std::collections::HashMap;
use std::fs::{self, File};
use std::hash::Hash;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A crash-safe, mutex-serialized key/value store backed by a single JSON
/// file on disk.
pub struct Store<K, V> {
    path: PathBuf,
    map: Mutex<HashMap<K, V>>,
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    /// Opens a store at `path`, loading any existing document.
    ///
    /// A missing or malformed file is treated as an empty map rather than an
    /// error; see [`Store::load_from_disk`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let map = Self::load_from_disk(&path)?;
        Ok(Self {
            path,
            map: Mutex::new(map),
        })
    }

    /// Reads and parses the document at `path`.
    ///
    /// Returns an empty map if the file does not exist or fails to parse.
    /// A parse failure is reported via `Ok` with an empty map, not an `Err`,
    /// because corrupt persisted state must not stop the server from
    /// starting; it is logged at `warn` before falling back, so an operator
    /// can still notice and investigate.
    fn load_from_disk(path: &Path) -> Result<HashMap<K, V>, PersistenceError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(err) => return Err(PersistenceError::Io(err)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => Ok(map),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "persisted state is malformed, starting from an empty map");
                Ok(HashMap::new())
            }
        }
    }

    /// Returns a clone of the current value for `key`, if present.
    pub fn get(&self, key: &K) -> Option<V> {
        let map = self.lock();
        map.get(key).cloned()
    }

    /// Inserts or replaces `value` under `key` and persists the whole map.
    pub fn update(&self, key: K, value: V) -> Result<(), PersistenceError> {
        let mut map = self.lock();
        map.insert(key, value);
        self.save_locked(&map)
    }

    /// Removes `key` and persists the whole map, returning the removed value.
    pub fn delete(&self, key: &K) -> Result<Option<V>, PersistenceError> {
        let mut map = self.lock();
        let removed = map.remove(key);
        self.save_locked(&map)?;
        Ok(removed)
    }

    /// Atomically reads, transforms, and persists the value under `key`.
    ///
    /// `f` receives the current value (`None` if absent) and returns the new
    /// value to store, or `None` to delete the key. The read, the transform,
    /// and the persist all happen under a single mutex acquisition, so two
    /// concurrent callers transforming the same key can never interleave —
    /// this is what lets callers like the session registry implement a state
    /// machine transition as one atomic step instead of a separate
    /// [`Store::get`] followed by a [`Store::update`].
    pub fn transact<F, E>(&self, key: &K, f: F) -> Result<Option<V>, E>
    where
        F: FnOnce(Option<V>) -> Result<Option<V>, E>,
        E: From<PersistenceError>,
    {
        let mut map = self.lock();
        let current = map.get(key).cloned();
        let outcome = f(current)?;
        match &outcome {
            Some(value) => {
                map.insert(key.clone(), value.clone());
            }
            None => {
                map.remove(key);
            }
        }
        self.save_locked(&map)?;
        Ok(outcome)
    }

    /// Returns a clone of the entire map.
    pub fn snapshot(&self) -> HashMap<K, V> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, V>> {
        match self.map.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Atomically replaces the on-disk document with the current map.
    fn save_locked(&self, map: &HashMap<K, V>) -> Result<(), PersistenceError> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let temp_path = dir.join(format!(
            ".{}.tmp",
            self.path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("upload-state")
        ));

        let payload = serde_json::to_vec_pretty(map)?;
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// Errors returned by [`Store`] operations.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// An I/O error occurred while reading or writing the document.
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The in-memory map could not be serialized to JSON.
    #[error("failed to serialize persisted state: {0}")]
    Serialize(#[from] serde_json::Error),
}
