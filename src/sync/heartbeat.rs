//! Heartbeat reporter — best-effort liveness signal to the presence
//! collaborator.
//!
//! DESIGN
//! ======
//! A spawned loop posts the session identity on an interval: `connect`
//! until the collaborator first answers, `heartbeat` after, one best-effort
//! `disconnect` on stop. The returned live-session count is relayed to
//! `users` listeners for display only — it never gates sync correctness,
//! and a failed send is logged and retried at the next tick.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::service::{ServiceChannel, ServiceEvent, SyncService};
use std::sync::Arc;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("presence request failed: {0}")]
    Request(String),
    #[error("presence response error: status {status}")]
    Response { status: u16 },
    #[error("presence response parse failed: {0}")]
    Parse(String),
}

/// Presence reporting settings. `base_url` points at the collaborator root
/// (the reporter appends `/sync/status`).
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub base_url: String,
    pub interval: Duration,
    /// Free-text descriptor shown in the collaborator's bookkeeping.
    pub client_label: String,
}

pub(crate) struct HeartbeatHandle {
    task: JoinHandle<()>,
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_label: String,
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
struct StatusBody<'a> {
    client_id: &'a str,
    action: &'a str,
    client: &'a str,
}

#[derive(Deserialize)]
struct StatusResponse {
    connected_clients: usize,
}

// =============================================================================
// REPORTER
// =============================================================================

/// Start reporting for `service`. Returns `None` when the HTTP client
/// cannot be built — presence is observational, so the service keeps
/// running without it.
pub(crate) fn spawn(service: Arc<SyncService>, config: HeartbeatConfig) -> Option<HeartbeatHandle> {
    let http = match reqwest::Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .build()
    {
        Ok(http) => http,
        Err(e) => {
            warn!(error = %e, "presence reporting disabled: HTTP client build failed");
            return None;
        }
    };

    let client_id = service.origin_id().to_owned();
    let base_url = config.base_url.clone();
    let client_label = config.client_label.clone();

    let loop_http = http.clone();
    let loop_base = base_url.clone();
    let loop_id = client_id.clone();
    let loop_label = client_label.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut connected = false;
        loop {
            ticker.tick().await;
            let action = if connected { "heartbeat" } else { "connect" };
            match send_status(&loop_http, &loop_base, &loop_id, action, &loop_label).await {
                Ok(count) => {
                    if !connected {
                        connected = true;
                        service.dispatch_local(ServiceChannel::Connected, &ServiceEvent::Connected);
                    }
                    service.dispatch_local(ServiceChannel::Users, &ServiceEvent::Users(count));
                }
                Err(e) => warn!(error = %e, "presence heartbeat failed"),
            }
        }
    });

    Some(HeartbeatHandle { task, http, base_url, client_id, client_label })
}

impl HeartbeatHandle {
    /// Stop reporting: cancel the loop, tell listeners, and attempt one
    /// fire-and-forget `disconnect` whose result is discarded.
    pub(crate) fn stop(self, service: &SyncService) {
        self.task.abort();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let http = self.http;
            let base_url = self.base_url;
            let client_id = self.client_id;
            let client_label = self.client_label;
            runtime.spawn(async move {
                if let Err(e) = send_status(&http, &base_url, &client_id, "disconnect", &client_label).await {
                    debug!(error = %e, "presence disconnect not delivered");
                }
            });
        }

        service.dispatch_local(ServiceChannel::Disconnected, &ServiceEvent::Disconnected);
    }
}

async fn send_status(
    http: &reqwest::Client,
    base_url: &str,
    client_id: &str,
    action: &str,
    client: &str,
) -> Result<usize, HeartbeatError> {
    let url = format!("{}/sync/status", base_url.trim_end_matches('/'));
    let response = http
        .post(&url)
        .json(&StatusBody { client_id, action, client })
        .send()
        .await
        .map_err(|e| HeartbeatError::Request(e.to_string()))?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(HeartbeatError::Response { status });
    }

    let body: StatusResponse = response
        .json()
        .await
        .map_err(|e| HeartbeatError::Parse(e.to_string()))?;
    Ok(body.connected_clients)
}

#[cfg(test)]
#[path = "heartbeat_test.rs"]
mod tests;
