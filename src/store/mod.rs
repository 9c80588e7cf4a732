//! Key store: the only component that touches persistent state.
//!
//! The in-memory map is authoritative and is published to readers as an
//! immutable snapshot. Writers serialize on one async mutex, apply their
//! change to a copy, persist it through [`KeyFile`], and publish the copy
//! only once the file write succeeded. Readers therefore never see a save
//! in progress, and a failed save leaves both disk and memory unchanged.

pub mod file;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;

use crate::models::key::KeyRecord;

pub use file::KeyFile;

/// Mapping from key code to record.
pub type KeyMap = BTreeMap<String, KeyRecord>;

/// Errors raised while reading or writing the key file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The file could not be read or written.
    #[error("I/O error on key store {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but does not hold a valid key mapping.
    ///
    /// Never treated as an empty store.
    #[error("Key store {} is corrupted: {reason}", .path.display())]
    Corrupted { path: PathBuf, reason: String },

    /// The mapping could not be serialized.
    #[error("Failed to encode key store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What a mutation did to the working copy.
pub enum Mutation<T> {
    /// The map changed and must be persisted.
    Changed(T),
    /// Nothing to write.
    Unchanged(T),
}

/// Shared, concurrently usable key store.
#[derive(Debug)]
pub struct KeyStore {
    file: KeyFile,
    snapshot: RwLock<Arc<KeyMap>>,
    writer: Mutex<()>,
}

impl KeyStore {
    /// Open the store at `path`, loading whatever is on disk.
    ///
    /// # Errors
    ///
    /// - `StoreError::Corrupted` if the file exists but cannot be parsed
    /// - `StoreError::Io` if the file exists but cannot be read
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let file = KeyFile::new(path);
        let keys = file.load().await?;

        tracing::info!(
            path = %file.path().display(),
            keys = keys.len(),
            "Key store loaded"
        );

        Ok(Self {
            file,
            snapshot: RwLock::new(Arc::new(keys)),
            writer: Mutex::new(()),
        })
    }

    /// Current committed state. Does not wait for writers.
    pub fn snapshot(&self) -> Arc<KeyMap> {
        let guard = self.snapshot.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    /// Run a read-modify-persist step under the writer lock.
    ///
    /// `apply` receives a private copy of the current map. If it returns
    /// `Mutation::Changed`, the copy is saved and then published; on any
    /// error nothing is published.
    pub async fn mutate<T, E, F>(&self, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut KeyMap) -> Result<Mutation<T>, E>,
        E: From<StoreError>,
    {
        let _writer = self.writer.lock().await;

        let mut keys = KeyMap::clone(&self.snapshot());
        match apply(&mut keys)? {
            Mutation::Unchanged(value) => Ok(value),
            Mutation::Changed(value) => {
                self.file.save(&keys).await?;
                self.publish(keys);
                Ok(value)
            }
        }
    }

    fn publish(&self, keys: KeyMap) {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(keys);
    }
}
