//! Record backends — optional third-party record-keeping integrations.
//!
//! DESIGN
//! ======
//! One capability trait ([`RecordStore`]) over three thin HTTP adapters.
//! The [`RecordClient`] enum dispatches to the backend selected by
//! `RECORD_BACKEND`; when nothing is configured the app runs without one
//! and the proxy routes answer service-unavailable. All adapters are glue:
//! the value is in the external APIs, not here.

pub mod document;
pub mod spreadsheet;
pub mod types;
pub mod workspace;

use serde_json::Value;

pub use document::DocumentBackend;
pub use spreadsheet::SpreadsheetBackend;
pub use types::{RecordError, RecordStore};
pub use workspace::WorkspaceBackend;

use crate::config::env_string;

// =============================================================================
// CLIENT DISPATCH
// =============================================================================

/// Concrete record client dispatching to the configured backend.
#[derive(Debug)]
pub struct RecordClient {
    inner: RecordProvider,
}

#[derive(Debug)]
enum RecordProvider {
    Spreadsheet(SpreadsheetBackend),
    Workspace(WorkspaceBackend),
    Document(DocumentBackend),
}

impl RecordClient {
    /// Build a record client from environment variables.
    ///
    /// - `RECORD_BACKEND`: "spreadsheet", "workspace", or "document"
    /// - plus the selected backend's own variables (see its module)
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Config`] when `RECORD_BACKEND` is unset or
    /// unknown, or when the selected backend is missing configuration.
    pub fn from_env() -> Result<Self, RecordError> {
        let kind = env_string("RECORD_BACKEND")
            .ok_or_else(|| RecordError::Config("RECORD_BACKEND not set".into()))?;
        let inner = match kind.as_str() {
            "spreadsheet" => RecordProvider::Spreadsheet(SpreadsheetBackend::from_env()?),
            "workspace" => RecordProvider::Workspace(WorkspaceBackend::from_env()?),
            "document" => RecordProvider::Document(DocumentBackend::from_env()?),
            other => return Err(RecordError::Config(format!("unknown RECORD_BACKEND: {other}"))),
        };
        Ok(Self { inner })
    }

    /// Name of the configured backend, for logs.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        match self.inner {
            RecordProvider::Spreadsheet(_) => "spreadsheet",
            RecordProvider::Workspace(_) => "workspace",
            RecordProvider::Document(_) => "document",
        }
    }

    fn store(&self) -> &dyn RecordStore {
        match &self.inner {
            RecordProvider::Spreadsheet(backend) => backend,
            RecordProvider::Workspace(backend) => backend,
            RecordProvider::Document(backend) => backend,
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for RecordClient {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, RecordError> {
        self.store().list(collection).await
    }

    async fn create(&self, collection: &str, record: Value) -> Result<Value, RecordError> {
        self.store().create(collection, record).await
    }

    async fn update(&self, collection: &str, id: &str, record: Value) -> Result<Value, RecordError> {
        self.store().update(collection, id, record).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RecordError> {
        self.store().delete(collection, id).await
    }

    async fn test_connection(&self) -> Result<(), RecordError> {
        self.store().test_connection().await
    }
}

#[cfg(test)]
#[path = "records_test.rs"]
mod tests;
