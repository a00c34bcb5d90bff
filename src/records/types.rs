//! Backend-neutral record types and errors.

use std::time::Duration;

use serde_json::Value;

const REQUEST_TIMEOUT_SECS: u64 = 30;
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Errors produced by record backend operations.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// A required configuration value is missing or unusable.
    #[error("record backend config: {0}")]
    Config(String),

    /// The HTTP request to the backend failed before a response arrived.
    #[error("backend request failed: {0}")]
    Request(String),

    /// The backend returned a non-success HTTP status.
    #[error("backend response error: status {status}")]
    Response { status: u16, body: String },

    /// The backend response body could not be deserialized.
    #[error("backend response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

/// Record CRUD over a named collection, plus a connection probe.
///
/// Records are raw JSON objects; the proxy layer never interprets them
/// beyond routing on an `id`.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, RecordError>;
    async fn create(&self, collection: &str, record: Value) -> Result<Value, RecordError>;
    async fn update(&self, collection: &str, id: &str, record: Value) -> Result<Value, RecordError>;
    async fn delete(&self, collection: &str, id: &str) -> Result<(), RecordError>;
    async fn test_connection(&self) -> Result<(), RecordError>;
}

/// Shared HTTP client construction for the backends.
pub(crate) fn build_http() -> Result<reqwest::Client, RecordError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
        .map_err(|e| RecordError::HttpClientBuild(e.to_string()))
}

/// Send a prepared request and parse the JSON body. Empty 2xx bodies map
/// to `Value::Null`.
pub(crate) async fn request_json(builder: reqwest::RequestBuilder) -> Result<Value, RecordError> {
    let response = builder.send().await.map_err(|e| RecordError::Request(e.to_string()))?;
    let status = response.status().as_u16();
    let text = response.text().await.map_err(|e| RecordError::Request(e.to_string()))?;

    if !(200..300).contains(&status) {
        return Err(RecordError::Response { status, body: text });
    }
    if text.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| RecordError::Parse(e.to_string()))
}
