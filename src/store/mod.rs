//! Origin-scoped storage and signaling.
//!
//! DESIGN
//! ======
//! An [`Origin`] is the boundary that binds sync contexts together: one
//! shared [`LocalStore`], a storage-change signal, and a broadcast bus.
//! Contexts attach with [`Origin::attach`] and from then on every store
//! write made through a [`StorageHandle`] is signaled to every *other*
//! attached context — never to the writer. The broadcast bus follows the
//! same exclusion rule: a posted message reaches all other open handles on
//! the channel, at most once, and is dropped for receivers whose queue is
//! full rather than awaited.

pub mod durable;
pub mod memory;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub use durable::DurableStore;
pub use memory::MemoryStore;

/// Queue depth per attached context, for both signals and bus messages.
const CONTEXT_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// LOCAL STORE
// =============================================================================

/// Synchronous origin-scoped key/value storage.
///
/// Values are strings (callers JSON-encode); operations are infallible at
/// this boundary — implementations log and swallow backend errors.
pub trait LocalStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
}

// =============================================================================
// STORAGE EVENT
// =============================================================================

/// Notification that another context mutated the store.
///
/// `new_value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

// =============================================================================
// ORIGIN
// =============================================================================

struct OriginInner {
    /// Storage-signal subscribers keyed by context id.
    watchers: HashMap<Uuid, mpsc::Sender<StorageEvent>>,
    /// Broadcast bus: channel name -> open handles keyed by context id.
    channels: HashMap<String, HashMap<Uuid, mpsc::Sender<serde_json::Value>>>,
}

/// Shared scope for a set of sync contexts on one machine.
pub struct Origin {
    store: Arc<dyn LocalStore>,
    inner: Mutex<OriginInner>,
}

impl Origin {
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Arc<Self> {
        Arc::new(Self {
            store,
            inner: Mutex::new(OriginInner { watchers: HashMap::new(), channels: HashMap::new() }),
        })
    }

    /// Attach a context. Returns its write-through handle and the stream of
    /// storage events produced by the *other* attached contexts.
    pub fn attach(self: &Arc<Self>, ctx_id: Uuid) -> (StorageHandle, mpsc::Receiver<StorageEvent>) {
        let (tx, rx) = mpsc::channel(CONTEXT_QUEUE_CAPACITY);
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.watchers.insert(ctx_id, tx);
        debug!(%ctx_id, watchers = inner.watchers.len(), "context attached to origin");
        (StorageHandle { origin: Arc::clone(self), ctx_id }, rx)
    }

    /// Detach a context: its storage signals stop and its bus handles close.
    pub fn detach(&self, ctx_id: Uuid) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.watchers.remove(&ctx_id);
        for handles in inner.channels.values_mut() {
            handles.remove(&ctx_id);
        }
        debug!(%ctx_id, "context detached from origin");
    }

    /// Open a broadcast channel handle for a context and return its inbound
    /// message stream.
    pub fn open_channel(&self, name: &str, ctx_id: Uuid) -> mpsc::Receiver<serde_json::Value> {
        let (tx, rx) = mpsc::channel(CONTEXT_QUEUE_CAPACITY);
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.channels.entry(name.to_owned()).or_default().insert(ctx_id, tx);
        rx
    }

    /// Post a message to every other open handle on `name`. Best-effort:
    /// full receiver queues are skipped, the poster never receives a copy.
    pub fn post(&self, name: &str, sender: Uuid, message: &serde_json::Value) {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(handles) = inner.channels.get(name) else {
            return;
        };
        for (ctx_id, tx) in handles {
            if *ctx_id == sender {
                continue;
            }
            let _ = tx.try_send(message.clone());
        }
    }

    /// Close one context's handle on a channel.
    pub fn close_channel(&self, name: &str, ctx_id: Uuid) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(handles) = inner.channels.get_mut(name) {
            handles.remove(&ctx_id);
        }
    }

    fn signal(&self, sender: Uuid, event: &StorageEvent) {
        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        for (ctx_id, tx) in &inner.watchers {
            if *ctx_id == sender {
                continue;
            }
            let _ = tx.try_send(event.clone());
        }
    }
}

// =============================================================================
// STORAGE HANDLE
// =============================================================================

/// Per-context write-through view of the origin store.
///
/// Reads go straight to the store; writes additionally fire the storage
/// signal in every other attached context.
#[derive(Clone)]
pub struct StorageHandle {
    origin: Arc<Origin>,
    ctx_id: Uuid,
}

impl StorageHandle {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.origin.store.get(key)
    }

    pub fn set(&self, key: &str, value: &str) {
        self.origin.store.set(key, value);
        self.origin.signal(
            self.ctx_id,
            &StorageEvent { key: key.to_owned(), new_value: Some(value.to_owned()) },
        );
    }

    pub fn remove(&self, key: &str) {
        self.origin.store.remove(key);
        self.origin
            .signal(self.ctx_id, &StorageEvent { key: key.to_owned(), new_value: None });
    }

    /// The raw store, for writes that must bypass the signal path
    /// (exercised by the polling safety net).
    #[must_use]
    pub fn raw_store(&self) -> &Arc<dyn LocalStore> {
        &self.origin.store
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
