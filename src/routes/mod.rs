//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The companion server exposes three surfaces: the presence endpoints the
//! heartbeat reporters talk to, proxy CRUD routes delegating to the
//! configured record backend, and a health check.

pub mod records;
pub mod sync_status;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

#[must_use]
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/sync/status", get(sync_status::get_status).post(sync_status::post_status))
        .route("/api/records/test", get(records::test_connection))
        .route(
            "/api/records/{collection}",
            get(records::list_records).post(records::create_record),
        )
        .route(
            "/api/records/{collection}/{id}",
            axum::routing::patch(records::update_record).delete(records::delete_record),
        )
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
