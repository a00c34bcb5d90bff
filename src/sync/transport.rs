//! Transport — the propagation seam between contexts.
//!
//! DESIGN
//! ======
//! One capability interface with two implementations, selected by
//! configuration: [`BusTransport`] rides the origin broadcast bus and is the
//! immediate-delivery path; [`DisabledTransport`] is the degraded stand-in
//! for environments without a broadcast primitive, where propagation falls
//! back to the storage signal and the polling safety net. A networked
//! transport would slot in behind the same trait.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::event::SyncEvent;
use crate::store::Origin;

/// Bus channel name shared by all sync contexts on an origin.
pub const SYNC_CHANNEL: &str = "stacked-sync";

/// Which transport a service should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportKind {
    #[default]
    Bus,
    Disabled,
}

/// Context-to-context event propagation.
pub trait Transport: Send + Sync {
    /// Open the transport. Returns the inbound message stream, or `None`
    /// when the environment does not support this transport.
    fn connect(&self) -> Option<mpsc::Receiver<serde_json::Value>>;

    /// Post an event to sibling contexts. Best-effort; a no-op when not
    /// connected.
    fn emit(&self, event: &SyncEvent);

    fn is_connected(&self) -> bool;

    fn disconnect(&self);
}

/// Build the configured transport for a context. A missing origin always
/// degrades to [`DisabledTransport`].
pub fn build(kind: TransportKind, origin: Option<Arc<Origin>>, ctx_id: Uuid) -> Arc<dyn Transport> {
    match (kind, origin) {
        (TransportKind::Bus, Some(origin)) => Arc::new(BusTransport::new(origin, ctx_id)),
        (TransportKind::Bus, None) => {
            warn!(%ctx_id, "broadcast transport requested without an origin; running disabled");
            Arc::new(DisabledTransport)
        }
        (TransportKind::Disabled, _) => Arc::new(DisabledTransport),
    }
}

// =============================================================================
// BUS TRANSPORT
// =============================================================================

/// Broadcast-bus transport: immediate at-most-once delivery to the other
/// live contexts on the same origin, never back to the poster.
pub struct BusTransport {
    origin: Arc<Origin>,
    ctx_id: Uuid,
    connected: AtomicBool,
}

impl BusTransport {
    #[must_use]
    pub fn new(origin: Arc<Origin>, ctx_id: Uuid) -> Self {
        Self { origin, ctx_id, connected: AtomicBool::new(false) }
    }
}

impl Transport for BusTransport {
    fn connect(&self) -> Option<mpsc::Receiver<serde_json::Value>> {
        let rx = self.origin.open_channel(SYNC_CHANNEL, self.ctx_id);
        self.connected.store(true, Ordering::SeqCst);
        Some(rx)
    }

    fn emit(&self, event: &SyncEvent) {
        if !self.is_connected() {
            return;
        }
        match serde_json::to_value(event) {
            Ok(message) => self.origin.post(SYNC_CHANNEL, self.ctx_id, &message),
            Err(e) => warn!(error = %e, topic = event.topic.as_str(), "failed to encode sync event"),
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.origin.close_channel(SYNC_CHANNEL, self.ctx_id);
        }
    }
}

// =============================================================================
// DISABLED TRANSPORT
// =============================================================================

/// No-op transport for hosts without a broadcast primitive.
pub struct DisabledTransport;

impl Transport for DisabledTransport {
    fn connect(&self) -> Option<mpsc::Receiver<serde_json::Value>> {
        debug!("broadcast transport disabled; relying on storage signal and polling");
        None
    }

    fn emit(&self, _event: &SyncEvent) {}

    fn is_connected(&self) -> bool {
        false
    }

    fn disconnect(&self) {}
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
