use std::sync::Arc;

use stacked::records::{RecordClient, RecordStore};
use stacked::routes;
use stacked::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "4400".into())
        .parse()
        .expect("invalid PORT");

    // Optional record backend (non-fatal: proxy routes disabled if config missing).
    let records: Option<Arc<dyn RecordStore>> = match RecordClient::from_env() {
        Ok(client) => {
            tracing::info!(backend = client.backend_name(), "record backend initialized");
            Some(Arc::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "record backend not configured — proxy routes disabled");
            None
        }
    };

    let state = AppState::new(records);
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "stacked companion server listening");
    axum::serve(listener, app).await.expect("server failed");
}
