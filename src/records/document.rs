//! Document-database backend.
//!
//! Thin wrapper over a project-scoped document REST API: collections hold
//! documents addressed by id, records pass through verbatim.

use serde_json::Value;

use super::types::{RecordError, RecordStore, build_http, request_json};
use crate::config::env_string;

#[derive(Debug)]
pub struct DocumentBackend {
    http: reqwest::Client,
    api_url: String,
    project_id: String,
    api_key: String,
}

impl DocumentBackend {
    /// Build from `DOCUMENT_API_URL`, `DOCUMENT_PROJECT_ID`, and
    /// `DOCUMENT_API_KEY`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Config`] for a missing variable and
    /// [`RecordError::HttpClientBuild`] when the client cannot be built.
    pub fn from_env() -> Result<Self, RecordError> {
        let api_url = env_string("DOCUMENT_API_URL")
            .ok_or_else(|| RecordError::Config("DOCUMENT_API_URL not set".into()))?;
        let project_id = env_string("DOCUMENT_PROJECT_ID")
            .ok_or_else(|| RecordError::Config("DOCUMENT_PROJECT_ID not set".into()))?;
        let api_key = env_string("DOCUMENT_API_KEY")
            .ok_or_else(|| RecordError::Config("DOCUMENT_API_KEY not set".into()))?;
        Self::new(api_url, project_id, api_key)
    }

    pub(crate) fn new(api_url: String, project_id: String, api_key: String) -> Result<Self, RecordError> {
        Ok(Self {
            http: build_http()?,
            api_url: api_url.trim_end_matches('/').to_owned(),
            project_id,
            api_key,
        })
    }

    fn project_url(&self) -> String {
        format!("{}/v1/projects/{}", self.api_url, self.project_id)
    }

    fn documents_url(&self, collection: &str) -> String {
        format!("{}/collections/{collection}/documents", self.project_url())
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("X-Api-Key", &self.api_key)
    }
}

#[async_trait::async_trait]
impl RecordStore for DocumentBackend {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, RecordError> {
        let body = request_json(self.auth(self.http.get(self.documents_url(collection)))).await?;
        let documents = body
            .get("documents")
            .and_then(Value::as_array)
            .ok_or_else(|| RecordError::Parse("missing documents array".into()))?;
        Ok(documents.clone())
    }

    async fn create(&self, collection: &str, record: Value) -> Result<Value, RecordError> {
        request_json(self.auth(self.http.post(self.documents_url(collection))).json(&record)).await
    }

    async fn update(&self, collection: &str, id: &str, record: Value) -> Result<Value, RecordError> {
        let url = format!("{}/{id}", self.documents_url(collection));
        request_json(self.auth(self.http.patch(url)).json(&record)).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RecordError> {
        let url = format!("{}/{id}", self.documents_url(collection));
        request_json(self.auth(self.http.delete(url))).await.map(|_| ())
    }

    async fn test_connection(&self) -> Result<(), RecordError> {
        request_json(self.auth(self.http.get(self.project_url()))).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "document_test.rs"]
mod tests;
