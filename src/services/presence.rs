//! Presence tracking for the companion server.
//!
//! DESIGN
//! ======
//! A mutex-guarded map from session identity to last-seen instant plus a
//! free-text client descriptor. Entries unseen for the staleness window
//! (5 minutes) are evicted lazily on every access — there is no sweeper
//! task. Pure liveness bookkeeping: nothing in the sync layer reads it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::config::env_parse;

const DEFAULT_STALE_AFTER_SECS: u64 = 300;

/// What a reporting client is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceAction {
    Connect,
    Heartbeat,
    Disconnect,
}

struct PresenceEntry {
    last_seen: Instant,
    /// Client descriptor, kept for operator inspection in logs.
    client: String,
}

#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<Mutex<HashMap<String, PresenceEntry>>>,
    stale_after: Duration,
}

impl PresenceTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            stale_after: Duration::from_secs(env_parse("PRESENCE_STALE_AFTER_SECS", DEFAULT_STALE_AFTER_SECS)),
        }
    }

    /// Record a client action and return the live-session count.
    pub fn record(&self, client_id: &str, action: PresenceAction, client: &str) -> usize {
        self.record_at(client_id, action, client, Instant::now())
    }

    /// Internal: record with explicit timestamp (for testing).
    fn record_at(&self, client_id: &str, action: PresenceAction, client: &str, now: Instant) -> usize {
        let mut entries = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        prune_stale(&mut entries, now, self.stale_after);

        match action {
            PresenceAction::Disconnect => {
                entries.remove(client_id);
            }
            PresenceAction::Connect | PresenceAction::Heartbeat => {
                entries.insert(
                    client_id.to_owned(),
                    PresenceEntry { last_seen: now, client: client.to_owned() },
                );
            }
        }

        tracing::debug!(client_id, ?action, client, live = entries.len(), "presence recorded");
        entries.len()
    }

    /// Live-session count after evicting stale entries.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.connected_count_at(Instant::now())
    }

    fn connected_count_at(&self, now: Instant) -> usize {
        let mut entries = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        prune_stale(&mut entries, now, self.stale_after);
        entries.len()
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn prune_stale(entries: &mut HashMap<String, PresenceEntry>, now: Instant, stale_after: Duration) {
    entries.retain(|client_id, entry| {
        let live = now.duration_since(entry.last_seen) <= stale_after;
        if !live {
            tracing::debug!(client_id, client = %entry.client, "evicting stale presence entry");
        }
        live
    });
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
