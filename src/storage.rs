//! Durable key/value storage collaborators.
//!
//! DESIGN
//! ======
//! `DurableStore` is the seam between in-memory state and whatever survives a
//! restart. Calls are synchronous: browser-style local storage is synchronous,
//! and undo/redo must be durable by the time they return.
//!
//! ERROR HANDLING
//! ==============
//! Stores report failures as `StorageError`, but callers in this crate treat
//! durability as best-effort: failures are logged and in-memory state stays
//! authoritative.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// STORE TRAIT
// =============================================================================

/// A durable key/value medium holding JSON values.
pub trait DurableStore: Send + Sync {
    /// Read the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium cannot be written.
    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;

    /// Delete `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium cannot be written.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Delete every key in this store.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the medium cannot be written.
    fn clear(&self) -> Result<(), StorageError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Process-local store. Serves as session-scoped storage and as a test double.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_owned(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Ok(())
    }
}

// =============================================================================
// FILE STORE
// =============================================================================

/// All keys live in one JSON object document at `path`.
///
/// Every write rewrites the document through a sibling temp file and a rename,
/// so a crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<BTreeMap<String, Value>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(raw) if raw.is_empty() => Ok(BTreeMap::new()),
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_document(&self, document: &BTreeMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, serde_json::to_vec_pretty(document)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn modify<F>(&self, apply: F) -> Result<(), StorageError>
    where
        F: FnOnce(&mut BTreeMap<String, Value>),
    {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut document = self.read_document()?;
        apply(&mut document);
        self.write_document(&document)
    }
}

impl DurableStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.read_document()?.remove(key))
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        self.modify(|document| {
            document.insert(key.to_owned(), value.clone());
        })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.modify(|document| {
            document.remove(key);
        })
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// STORAGE SCOPES
// =============================================================================

/// The two client-side storage scopes: durable local storage and storage that
/// only lives as long as the session.
#[derive(Clone)]
pub struct StorageScopes {
    pub local: Arc<dyn DurableStore>,
    pub session: Arc<dyn DurableStore>,
}

impl StorageScopes {
    #[must_use]
    pub fn new(local: Arc<dyn DurableStore>, session: Arc<dyn DurableStore>) -> Self {
        Self { local, session }
    }

    /// Clear every key in both scopes. Each scope is attempted even if the
    /// other fails; failures are logged, not returned.
    pub fn purge_all(&self) {
        if let Err(e) = self.local.clear() {
            tracing::warn!(error = %e, scope = "local", "storage purge failed");
        }
        if let Err(e) = self.session.clear() {
            tracing::warn!(error = %e, scope = "session", "storage purge failed");
        }
    }
}

impl std::fmt::Debug for StorageScopes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageScopes").finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;
