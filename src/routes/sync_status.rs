//! Presence endpoints consumed by the heartbeat reporters.

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::services::presence::PresenceAction;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct StatusBody {
    pub client_id: String,
    pub action: PresenceAction,
    /// Free-text client descriptor; optional and informational.
    #[serde(default)]
    pub client: Option<String>,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub connected_clients: usize,
}

/// `POST /sync/status` — record a connect/heartbeat/disconnect and return
/// the live-session count. Idempotent; safe at any rate.
pub async fn post_status(State(state): State<AppState>, Json(body): Json<StatusBody>) -> Json<StatusResponse> {
    let client = body.client.as_deref().unwrap_or("unknown");
    let connected_clients = state.presence.record(&body.client_id, body.action, client);
    Json(StatusResponse { connected_clients })
}

/// `GET /sync/status` — current live-session count.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse { connected_clients: state.presence.connected_count() })
}

#[cfg(test)]
#[path = "sync_status_test.rs"]
mod tests;
