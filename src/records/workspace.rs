//! Workspace-database backend.
//!
//! Thin wrapper over a page-oriented workspace API: a collection name is a
//! database id, records are page property maps, deletion is archival.

use serde_json::{Value, json};

use super::types::{RecordError, RecordStore, build_http, request_json};
use crate::config::env_string;

const DEFAULT_API_VERSION: &str = "2024-05-01";

#[derive(Debug)]
pub struct WorkspaceBackend {
    http: reqwest::Client,
    api_url: String,
    token: String,
    api_version: String,
}

impl WorkspaceBackend {
    /// Build from `WORKSPACE_API_URL`, `WORKSPACE_TOKEN`, and optional
    /// `WORKSPACE_API_VERSION`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Config`] for a missing variable and
    /// [`RecordError::HttpClientBuild`] when the client cannot be built.
    pub fn from_env() -> Result<Self, RecordError> {
        let api_url = env_string("WORKSPACE_API_URL")
            .ok_or_else(|| RecordError::Config("WORKSPACE_API_URL not set".into()))?;
        let token = env_string("WORKSPACE_TOKEN")
            .ok_or_else(|| RecordError::Config("WORKSPACE_TOKEN not set".into()))?;
        let api_version = env_string("WORKSPACE_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.into());
        Self::new(api_url, token, api_version)
    }

    pub(crate) fn new(api_url: String, token: String, api_version: String) -> Result<Self, RecordError> {
        Ok(Self {
            http: build_http()?,
            api_url: api_url.trim_end_matches('/').to_owned(),
            token,
            api_version,
        })
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header("X-API-Version", &self.api_version)
    }

    fn query_url(&self, collection: &str) -> String {
        format!("{}/databases/{collection}/query", self.api_url)
    }

    fn page_url(&self, id: &str) -> String {
        format!("{}/pages/{id}", self.api_url)
    }
}

#[async_trait::async_trait]
impl RecordStore for WorkspaceBackend {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, RecordError> {
        let body = request_json(self.auth(self.http.post(self.query_url(collection))).json(&json!({}))).await?;
        let results = body
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| RecordError::Parse("missing results array".into()))?;
        Ok(results.clone())
    }

    async fn create(&self, collection: &str, record: Value) -> Result<Value, RecordError> {
        request_json(self.auth(self.http.post(format!("{}/pages", self.api_url))).json(&json!({
            "parent": { "database_id": collection },
            "properties": record,
        })))
        .await
    }

    async fn update(&self, _collection: &str, id: &str, record: Value) -> Result<Value, RecordError> {
        request_json(
            self.auth(self.http.patch(self.page_url(id)))
                .json(&json!({ "properties": record })),
        )
        .await
    }

    async fn delete(&self, _collection: &str, id: &str) -> Result<(), RecordError> {
        request_json(
            self.auth(self.http.patch(self.page_url(id)))
                .json(&json!({ "archived": true })),
        )
        .await
        .map(|_| ())
    }

    async fn test_connection(&self) -> Result<(), RecordError> {
        request_json(self.auth(self.http.get(format!("{}/users/me", self.api_url))))
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
#[path = "workspace_test.rs"]
mod tests;
