//! Record proxy routes — thin pass-through to the configured backend.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use tracing::warn;

use crate::records::{RecordError, RecordStore};
use crate::state::AppState;

fn backend(state: &AppState) -> Result<Arc<dyn RecordStore>, StatusCode> {
    state.records.clone().ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

/// `GET /api/records/:collection` — list all records in a collection.
pub async fn list_records(
    State(state): State<AppState>,
    Path(collection): Path<String>,
) -> Result<Json<Vec<serde_json::Value>>, StatusCode> {
    let records = backend(&state)?
        .list(&collection)
        .await
        .map_err(record_error_to_status)?;
    Ok(Json(records))
}

/// `POST /api/records/:collection` — create a record.
pub async fn create_record(
    State(state): State<AppState>,
    Path(collection): Path<String>,
    Json(record): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let created = backend(&state)?
        .create(&collection, record)
        .await
        .map_err(record_error_to_status)?;
    Ok(Json(created))
}

/// `PATCH /api/records/:collection/:id` — update a record.
pub async fn update_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
    Json(record): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let updated = backend(&state)?
        .update(&collection, &id, record)
        .await
        .map_err(record_error_to_status)?;
    Ok(Json(updated))
}

/// `DELETE /api/records/:collection/:id` — delete a record.
pub async fn delete_record(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    backend(&state)?
        .delete(&collection, &id)
        .await
        .map_err(record_error_to_status)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /api/records/test` — probe the backend connection.
pub async fn test_connection(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    backend(&state)?
        .test_connection()
        .await
        .map_err(record_error_to_status)?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub(crate) fn record_error_to_status(err: RecordError) -> StatusCode {
    warn!(error = %err, "record backend call failed");
    match err {
        RecordError::Config(_) | RecordError::HttpClientBuild(_) => StatusCode::INTERNAL_SERVER_ERROR,
        RecordError::Response { status: 404, .. } => StatusCode::NOT_FOUND,
        RecordError::Request(_) | RecordError::Response { .. } | RecordError::Parse(_) => StatusCode::BAD_GATEWAY,
    }
}

#[cfg(test)]
#[path = "records_test.rs"]
mod tests;
