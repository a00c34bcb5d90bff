use super::*;
use crate::records::RecordError;
use crate::state::test_helpers;
use serde_json::{Value, json};

// =============================================================================
// Unconfigured backend
// =============================================================================

#[tokio::test]
async fn list_without_backend_is_service_unavailable() {
    let state = test_helpers::test_app_state();
    let result = list_records(State(state), Path("creators".into())).await;
    assert_eq!(result.unwrap_err(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_connection_without_backend_is_service_unavailable() {
    let state = test_helpers::test_app_state();
    let result = test_connection(State(state)).await;
    assert_eq!(result.unwrap_err(), StatusCode::SERVICE_UNAVAILABLE);
}

// =============================================================================
// Error mapping
// =============================================================================

#[test]
fn backend_not_found_maps_to_404() {
    let err = RecordError::Response { status: 404, body: String::new() };
    assert_eq!(record_error_to_status(err), StatusCode::NOT_FOUND);
}

#[test]
fn backend_failure_maps_to_bad_gateway() {
    assert_eq!(
        record_error_to_status(RecordError::Request("connection refused".into())),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        record_error_to_status(RecordError::Response { status: 500, body: String::new() }),
        StatusCode::BAD_GATEWAY
    );
    assert_eq!(
        record_error_to_status(RecordError::Parse("truncated".into())),
        StatusCode::BAD_GATEWAY
    );
}

#[test]
fn config_failure_maps_to_internal_error() {
    assert_eq!(
        record_error_to_status(RecordError::Config("missing".into())),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

// =============================================================================
// Pass-through with a stub backend
// =============================================================================

struct StubBackend;

#[async_trait::async_trait]
impl RecordStore for StubBackend {
    async fn list(&self, collection: &str) -> Result<Vec<Value>, RecordError> {
        Ok(vec![json!({"id": "r1", "collection": collection})])
    }

    async fn create(&self, _collection: &str, record: Value) -> Result<Value, RecordError> {
        Ok(record)
    }

    async fn update(&self, _collection: &str, id: &str, mut record: Value) -> Result<Value, RecordError> {
        if let Some(obj) = record.as_object_mut() {
            obj.insert("id".into(), json!(id));
        }
        Ok(record)
    }

    async fn delete(&self, _collection: &str, id: &str) -> Result<(), RecordError> {
        if id == "missing" {
            return Err(RecordError::Response { status: 404, body: String::new() });
        }
        Ok(())
    }

    async fn test_connection(&self) -> Result<(), RecordError> {
        Ok(())
    }
}

fn stub_state() -> AppState {
    test_helpers::test_app_state_with_records(Arc::new(StubBackend))
}

#[tokio::test]
async fn list_passes_collection_through() {
    let Json(records) = list_records(State(stub_state()), Path("creators".into())).await.unwrap();
    assert_eq!(records, vec![json!({"id": "r1", "collection": "creators"})]);
}

#[tokio::test]
async fn create_echoes_backend_result() {
    let Json(created) =
        create_record(State(stub_state()), Path("creators".into()), Json(json!({"name": "X"})))
            .await
            .unwrap();
    assert_eq!(created, json!({"name": "X"}));
}

#[tokio::test]
async fn update_addresses_record_by_id() {
    let Json(updated) = update_record(
        State(stub_state()),
        Path(("creators".into(), "r7".into())),
        Json(json!({"name": "Y"})),
    )
    .await
    .unwrap();
    assert_eq!(updated, json!({"id": "r7", "name": "Y"}));
}

#[tokio::test]
async fn delete_maps_backend_not_found() {
    let ok = delete_record(State(stub_state()), Path(("creators".into(), "r1".into()))).await;
    assert!(ok.is_ok());

    let missing = delete_record(State(stub_state()), Path(("creators".into(), "missing".into()))).await;
    assert_eq!(missing.unwrap_err(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_connection_reports_ok() {
    let Json(body) = test_connection(State(stub_state())).await.unwrap();
    assert_eq!(body, json!({"ok": true}));
}
