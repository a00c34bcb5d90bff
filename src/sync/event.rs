//! SyncEvent — the unit of propagation between contexts.
//!
//! DESIGN
//! ======
//! An event carries the *entire* current value of one topic; applying it is
//! whole-value replacement, never a field patch. `origin_id` suppresses
//! self-delivery, `emitted_at` guards the polling path against stale
//! reapplication. Content fingerprints let the poller detect changed store
//! values without deep-comparing decoded payloads.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::topic::SyncTopic;

/// Origin stamped on events synthesized from store writes that bypassed the
/// emit path. Never matches a real context identity, so it is never
/// self-filtered.
pub const EXTERNAL_ORIGIN: &str = "external";

/// What happened to the collection. Informational: bindings always send
/// `Update` and receivers replace the full snapshot regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Create,
    Update,
    Delete,
}

/// One propagated change: the full current value of `topic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncEvent {
    pub topic: SyncTopic,
    pub action: SyncAction,
    pub payload: serde_json::Value,
    /// Identity of the emitting context; random per service instance.
    pub origin_id: String,
    /// Milliseconds since Unix epoch at emit time, emitter's clock.
    pub emitted_at: i64,
}

impl SyncEvent {
    pub fn new(topic: SyncTopic, action: SyncAction, payload: serde_json::Value, origin_id: impl Into<String>) -> Self {
        Self { topic, action, payload, origin_id: origin_id.into(), emitted_at: now_ms() }
    }

    /// Event synthesized for a store change observed outside the emit path.
    #[must_use]
    pub fn external(topic: SyncTopic, payload: serde_json::Value) -> Self {
        Self::new(topic, SyncAction::Update, payload, EXTERNAL_ORIGIN)
    }

    #[must_use]
    pub fn is_external(&self) -> bool {
        self.origin_id == EXTERNAL_ORIGIN
    }
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

// =============================================================================
// CONTENT FINGERPRINTS
// =============================================================================

/// Digest of a raw stored string.
pub type Fingerprint = [u8; 32];

/// Fingerprint the raw stored representation of a value.
#[must_use]
pub fn fingerprint(raw: &str) -> Fingerprint {
    Sha256::digest(raw.as_bytes()).into()
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
