//! Spreadsheet-database backend.
//!
//! Thin wrapper over a row-oriented REST API: collections are tables under
//! a base, rows arrive as `{id, fields}` envelopes that we flatten for the
//! proxy layer.

use serde_json::{Value, json};

use super::types::{RecordError, RecordStore, build_http, request_json};
use crate::config::env_string;

#[derive(Debug)]
pub struct SpreadsheetBackend {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    base: String,
}

impl SpreadsheetBackend {
    /// Build from `SPREADSHEET_API_URL`, `SPREADSHEET_API_KEY`, and
    /// `SPREADSHEET_BASE`.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::Config`] for a missing variable and
    /// [`RecordError::HttpClientBuild`] when the client cannot be built.
    pub fn from_env() -> Result<Self, RecordError> {
        let api_url = env_string("SPREADSHEET_API_URL")
            .ok_or_else(|| RecordError::Config("SPREADSHEET_API_URL not set".into()))?;
        let api_key = env_string("SPREADSHEET_API_KEY")
            .ok_or_else(|| RecordError::Config("SPREADSHEET_API_KEY not set".into()))?;
        let base = env_string("SPREADSHEET_BASE")
            .ok_or_else(|| RecordError::Config("SPREADSHEET_BASE not set".into()))?;
        Self::new(api_url, api_key, base)
    }

    pub(crate) fn new(api_url: String, api_key: String, base: String) -> Result<Self, RecordError> {
        Ok(Self { http: build_http()?, api_url: api_url.trim_end_matches('/').to_owned(), api_key, base })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}/{}", self.api_url, self.base, collection)
    }

    fn auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }
}

/// Merge a `{id, fields}` row envelope into one flat record object.
fn flatten_row(row: &Value) -> Value {
    let mut record = row.get("fields").cloned().unwrap_or_else(|| json!({}));
    if let (Some(obj), Some(id)) = (record.as_object_mut(), row.get("id")) {
        obj.insert("id".into(), id.clone());
    }
    record
}

#[async_trait::async_trait]
impl RecordStore for SpreadsheetBackend {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, RecordError> {
        let body = request_json(self.auth(self.http.get(self.collection_url(collection)))).await?;
        let rows = body
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| RecordError::Parse("missing records array".into()))?;
        Ok(rows.iter().map(flatten_row).collect())
    }

    async fn create(&self, collection: &str, record: Value) -> Result<Value, RecordError> {
        let body = request_json(
            self.auth(self.http.post(self.collection_url(collection)))
                .json(&json!({ "fields": record })),
        )
        .await?;
        Ok(flatten_row(&body))
    }

    async fn update(&self, collection: &str, id: &str, record: Value) -> Result<Value, RecordError> {
        let url = format!("{}/{id}", self.collection_url(collection));
        let body = request_json(self.auth(self.http.patch(url)).json(&json!({ "fields": record }))).await?;
        Ok(flatten_row(&body))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RecordError> {
        let url = format!("{}/{id}", self.collection_url(collection));
        request_json(self.auth(self.http.delete(url))).await.map(|_| ())
    }

    async fn test_connection(&self) -> Result<(), RecordError> {
        let url = format!("{}/{}", self.api_url, self.base);
        request_json(self.auth(self.http.get(url))).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "spreadsheet_test.rs"]
mod tests;
