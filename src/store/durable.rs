//! Durable store — sled-backed origin storage.
//!
//! ERROR HANDLING
//! ==============
//! The [`LocalStore`] contract is infallible: backend IO errors on reads
//! and writes are logged and swallowed so a disk hiccup degrades a single
//! operation instead of poisoning the sync layer. Only `open` is fallible.

use std::path::Path;

use tracing::error;

use super::LocalStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to open store: {0}")]
    Open(#[from] sled::Error),
}

pub struct DurableStore {
    db: sled::Db,
}

impl DurableStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] when the underlying database cannot be
    /// opened, e.g. the path is unwritable or held by another process.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self { db: sled::open(path)? })
    }
}

impl LocalStore for DurableStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.db.get(key) {
            Ok(value) => value.and_then(|v| String::from_utf8(v.to_vec()).ok()),
            Err(e) => {
                error!(error = %e, key, "store read failed");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) {
        if let Err(e) = self.db.insert(key, value.as_bytes()) {
            error!(error = %e, key, "store write failed");
        }
    }

    fn remove(&self, key: &str) {
        if let Err(e) = self.db.remove(key) {
            error!(error = %e, key, "store remove failed");
        }
    }
}

#[cfg(test)]
#[path = "durable_test.rs"]
mod tests;
