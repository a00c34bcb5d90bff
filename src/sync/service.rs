//! Sync service — per-context coordinator for record-collection sync.
//!
//! DESIGN
//! ======
//! One service per context. Emitting fans an event out over three redundant
//! paths: local listeners fire synchronously, the broadcast bus delivers to
//! live siblings, and writing the last-sync slot fires the storage signal.
//! A polling timer re-reads the slot and every known topic key as a safety
//! net for writes that bypassed both push paths.
//!
//! Delivery paths give no ordering; idempotence comes from the filters: a
//! context never applies its own `origin_id`, push paths drop timestamp
//! regressions and exact `(origin_id, emitted_at)` duplicates, and the
//! polling path only applies strictly newer timestamps per topic. The
//! emitter clock is nudged monotonic so two rapid emits from one context
//! never share a timestamp.
//!
//! LIFECYCLE
//! =========
//! Uninitialized → `initialize()` → Active → `destroy()` → Destroyed.
//! Listener registration works in any state; emit is Active-only.
//! Initialization in an environment without an origin logs and stays in
//! local-only mode instead of failing the caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::event::{Fingerprint, SyncAction, SyncEvent, fingerprint};
use super::heartbeat::{self, HeartbeatConfig, HeartbeatHandle};
use super::topic::{self, LAST_SYNC_KEY, SyncTopic};
use super::transport::{self, Transport, TransportKind};
use crate::config::{env_parse, env_string};
use crate::store::{Origin, StorageEvent, StorageHandle};

const DEFAULT_POLL_INTERVAL_MS: u64 = 2000;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Clone)]
pub struct SyncConfig {
    pub transport: TransportKind,
    /// Safety-net poll cadence.
    pub poll_interval: Duration,
    /// Presence reporting; `None` disables the heartbeat.
    pub heartbeat: Option<HeartbeatConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Bus,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            heartbeat: None,
        }
    }
}

impl SyncConfig {
    /// Load tunables from the environment; unset values use defaults and
    /// the heartbeat stays off without a `PRESENCE_URL`.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            transport: TransportKind::Bus,
            poll_interval: Duration::from_millis(env_parse("SYNC_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)),
            heartbeat: env_string("PRESENCE_URL").map(|base_url| HeartbeatConfig {
                base_url,
                interval: Duration::from_secs(env_parse(
                    "SYNC_HEARTBEAT_INTERVAL_SECS",
                    DEFAULT_HEARTBEAT_INTERVAL_SECS,
                )),
                client_label: env_string("SYNC_CLIENT_LABEL").unwrap_or_else(|| "stacked".into()),
            }),
        }
    }
}

// =============================================================================
// LISTENERS
// =============================================================================

/// Internal notification channels exposed through [`SyncService::on`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceChannel {
    /// A sync event was emitted locally or applied from a sibling.
    Sync,
    /// Presence reporting reached the collaborator for the first time.
    Connected,
    /// Presence reporting stopped.
    Disconnected,
    /// Live-session count relayed from the presence collaborator.
    Users,
}

/// Payload delivered to listeners.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    Sync(SyncEvent),
    Connected,
    Disconnected,
    Users(usize),
}

type Listener = Arc<dyn Fn(&ServiceEvent) + Send + Sync>;

/// Handle for unregistering a listener via [`SyncService::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

// =============================================================================
// SERVICE
// =============================================================================

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum ServiceState {
    Uninitialized,
    Active,
    Destroyed,
}

/// How an event reached this context; decides which staleness filter runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryPath {
    /// Broadcast bus or storage signal: immediate, dedup by exact pair.
    Push,
    /// Polling safety net: apply only strictly newer timestamps.
    Poll,
}

pub struct SyncService {
    ctx_id: Uuid,
    origin_id: String,
    env: Option<Arc<Origin>>,
    config: SyncConfig,
    state: Mutex<ServiceState>,
    listeners: Mutex<HashMap<ServiceChannel, Vec<(u64, Listener)>>>,
    next_listener: AtomicU64,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    storage: Mutex<Option<StorageHandle>>,
    /// Digest of the last raw value observed per known storage key.
    fingerprints: Mutex<HashMap<&'static str, Fingerprint>>,
    /// Last applied `(origin_id, emitted_at)` per topic.
    last_applied: Mutex<HashMap<SyncTopic, (String, i64)>>,
    /// `emitted_at` of the most recently applied event; 0 = none yet.
    last_sync_time: AtomicI64,
    /// Highest timestamp stamped on an emitted event; keeps emits ordered
    /// even within one millisecond.
    last_emitted: AtomicI64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    heartbeat: Mutex<Option<HeartbeatHandle>>,
}

impl SyncService {
    /// Create a service for one context. `origin` is `None` in environments
    /// without shared storage (the service then runs local-only).
    #[must_use]
    pub fn new(origin: Option<Arc<Origin>>, config: SyncConfig) -> Arc<Self> {
        let ctx_id = Uuid::new_v4();
        Arc::new(Self {
            ctx_id,
            origin_id: ctx_id.to_string(),
            env: origin,
            config,
            state: Mutex::new(ServiceState::Uninitialized),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            transport: Mutex::new(None),
            storage: Mutex::new(None),
            fingerprints: Mutex::new(HashMap::new()),
            last_applied: Mutex::new(HashMap::new()),
            last_sync_time: AtomicI64::new(0),
            last_emitted: AtomicI64::new(0),
            tasks: Mutex::new(Vec::new()),
            heartbeat: Mutex::new(None),
        })
    }

    /// Per-instance identity used to suppress self-delivery.
    #[must_use]
    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        *self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner) == ServiceState::Active
    }

    /// `emitted_at` of the most recently applied (not merely received)
    /// event. Diagnostic only.
    #[must_use]
    pub fn last_sync_time(&self) -> Option<i64> {
        match self.last_sync_time.load(Ordering::SeqCst) {
            0 => None,
            ts => Some(ts),
        }
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Start delivery. Idempotent; never panics or errors — an environment
    /// without an origin leaves the service Active in local-only mode.
    pub fn initialize(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            match *state {
                ServiceState::Active => return,
                ServiceState::Destroyed => {
                    warn!(origin_id = %self.origin_id, "initialize called on destroyed sync service");
                    return;
                }
                ServiceState::Uninitialized => *state = ServiceState::Active,
            }
        }

        let Some(origin) = self.env.clone() else {
            warn!(origin_id = %self.origin_id, "no origin available; sync running local-only");
            return;
        };

        let (handle, signal_rx) = origin.attach(self.ctx_id);

        // Prime fingerprints so pre-existing values are not re-announced as
        // external changes on the first poll.
        for (key, _) in topic::KEY_TABLE.iter().copied() {
            if let Some(raw) = handle.get(key) {
                self.note_fingerprint(key, fingerprint(&raw));
            }
        }
        *self.storage.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(handle);

        let built = transport::build(self.config.transport, Some(origin), self.ctx_id);
        let bus_rx = built.connect();
        *self.transport.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Arc::clone(&built));

        let svc = Arc::clone(self);
        let delivery = tokio::spawn(async move { svc.delivery_loop(bus_rx, signal_rx).await });

        let svc = Arc::clone(self);
        let poller = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(svc.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                svc.poll_cycle();
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend([delivery, poller]);

        if let Some(hb_config) = self.config.heartbeat.clone() {
            *self.heartbeat.lock().unwrap_or_else(std::sync::PoisonError::into_inner) =
                heartbeat::spawn(Arc::clone(self), hb_config);
        }

        info!(origin_id = %self.origin_id, transport = ?self.config.transport, "sync service initialized");
    }

    /// Release everything: timers, transport, origin attachment, listeners.
    /// Safe to call multiple times; the service cannot be re-initialized.
    pub fn destroy(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if *state == ServiceState::Destroyed {
                return;
            }
            *state = ServiceState::Destroyed;
        }

        for task in self
            .tasks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }

        let hb = self.heartbeat.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(hb) = hb {
            hb.stop(self);
        }

        let transport = self.transport.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if let Some(transport) = transport {
            transport.disconnect();
        }

        let storage = self.storage.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
        if storage.is_some() {
            if let Some(origin) = &self.env {
                origin.detach(self.ctx_id);
            }
        }

        self.listeners.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clear();
        info!(origin_id = %self.origin_id, "sync service destroyed");
    }

    // =========================================================================
    // PUBLISH
    // =========================================================================

    /// Emit a whole-value snapshot for `topic` to local listeners and every
    /// sibling context. No-op unless Active.
    pub fn emit_sync_event(&self, topic: SyncTopic, action: SyncAction, payload: serde_json::Value) {
        if !self.is_active() {
            debug!(topic = topic.as_str(), "emit ignored: sync service not active");
            return;
        }

        let mut event = SyncEvent::new(topic, action, payload, self.origin_id.clone());
        event.emitted_at = self.bump_emit_ts(event.emitted_at);

        // Our own write must not look like an external change to the poller.
        self.note_fingerprint(topic.storage_key(), fingerprint(&event.payload.to_string()));

        // Path 0: local listeners, synchronously, before any transport.
        self.dispatch_local(ServiceChannel::Sync, &ServiceEvent::Sync(event.clone()));

        // Path 1: broadcast bus.
        let transport = self.transport.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        if let Some(transport) = transport {
            transport.emit(&event);
        }

        // Path 2: last-sync slot → storage signal in siblings.
        match serde_json::to_string(&event) {
            Ok(envelope) => {
                let handle = self.storage.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
                if let Some(handle) = handle {
                    handle.set(LAST_SYNC_KEY, &envelope);
                }
            }
            Err(e) => warn!(error = %e, topic = topic.as_str(), "failed to encode sync envelope"),
        }
    }

    // =========================================================================
    // SUBSCRIBE
    // =========================================================================

    /// Register a listener. Works in every state; registration order is
    /// dispatch order.
    pub fn on<F>(&self, channel: ServiceChannel, listener: F) -> ListenerId
    where
        F: Fn(&ServiceEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(channel)
            .or_default()
            .push((id, Arc::new(listener)));
        ListenerId(id)
    }

    /// Unregister a listener. Unknown ids are ignored.
    pub fn off(&self, channel: ServiceChannel, id: ListenerId) {
        if let Some(list) = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(&channel)
        {
            list.retain(|(lid, _)| *lid != id.0);
        }
    }

    /// Invoke every listener on `channel` in registration order. A panicking
    /// listener is isolated so the rest of the dispatch still runs.
    pub(crate) fn dispatch_local(&self, channel: ServiceChannel, event: &ServiceEvent) {
        let listeners: Vec<(u64, Listener)> = self
            .listeners
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&channel)
            .cloned()
            .unwrap_or_default();

        for (id, listener) in listeners {
            let call = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener(event)));
            if call.is_err() {
                error!(listener = id, ?channel, "sync listener panicked; continuing dispatch");
            }
        }
    }

    // =========================================================================
    // DELIVERY
    // =========================================================================

    async fn delivery_loop(
        &self,
        mut bus_rx: Option<mpsc::Receiver<serde_json::Value>>,
        mut signal_rx: mpsc::Receiver<StorageEvent>,
    ) {
        loop {
            tokio::select! {
                message = recv_or_pending(&mut bus_rx) => {
                    match message {
                        Some(message) => self.handle_bus_message(message),
                        // Bus closed: park that arm, keep the signal path.
                        None => bus_rx = None,
                    }
                }
                signal = signal_rx.recv() => {
                    match signal {
                        Some(event) => self.handle_storage_signal(&event),
                        None => break,
                    }
                }
            }
        }
    }

    fn handle_bus_message(&self, message: serde_json::Value) {
        match serde_json::from_value::<SyncEvent>(message) {
            Ok(event) => self.apply_remote(event, DeliveryPath::Push),
            Err(e) => warn!(error = %e, "malformed sync event on bus; dropping"),
        }
    }

    fn handle_storage_signal(&self, signal: &StorageEvent) {
        if signal.key == LAST_SYNC_KEY {
            let Some(raw) = &signal.new_value else {
                return;
            };
            match serde_json::from_str::<SyncEvent>(raw) {
                Ok(event) => self.apply_remote(event, DeliveryPath::Push),
                Err(e) => warn!(error = %e, "malformed sync envelope in storage signal; dropping"),
            }
            return;
        }

        // A topic key changed directly: treat as an external write.
        let Some((key, topic)) = topic::lookup(&signal.key) else {
            return;
        };
        let Some(raw) = &signal.new_value else {
            self.clear_fingerprint(key);
            return;
        };
        if self.changed_fingerprint(key, raw) {
            match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(payload) => self.apply_remote(SyncEvent::external(topic, payload), DeliveryPath::Push),
                Err(e) => warn!(error = %e, key, "malformed topic value in storage signal; dropping"),
            }
        }
    }

    /// One safety-net cycle: re-read the last-sync slot, then sweep every
    /// known topic key for content changes.
    fn poll_cycle(&self) {
        let handle = self.storage.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        let Some(handle) = handle else {
            return;
        };

        if let Some(raw) = handle.get(LAST_SYNC_KEY) {
            match serde_json::from_str::<SyncEvent>(&raw) {
                Ok(event) => self.apply_remote(event, DeliveryPath::Poll),
                Err(e) => debug!(error = %e, "malformed sync envelope in slot; skipping cycle"),
            }
        }

        for (key, topic) in topic::KEY_TABLE.iter().copied() {
            let Some(raw) = handle.get(key) else {
                continue;
            };
            if self.changed_fingerprint(key, &raw) {
                match serde_json::from_str::<serde_json::Value>(&raw) {
                    Ok(payload) => {
                        debug!(key, topic = topic.as_str(), "poll observed an external change");
                        self.apply_remote(SyncEvent::external(topic, payload), DeliveryPath::Poll);
                    }
                    Err(e) => warn!(error = %e, key, "malformed topic value in store; skipping"),
                }
            }
        }
    }

    /// Apply an event from a sibling (or the external sentinel), subject to
    /// the self-origin, duplicate, and staleness filters.
    fn apply_remote(&self, event: SyncEvent, path: DeliveryPath) {
        if event.origin_id == self.origin_id {
            return;
        }

        {
            let mut last = self.last_applied.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            let entry = last.get(&event.topic);
            let fresh = match path {
                DeliveryPath::Poll => entry.is_none_or(|(_, ts)| event.emitted_at > *ts),
                DeliveryPath::Push => entry.is_none_or(|(origin, ts)| {
                    event.emitted_at > *ts || (event.emitted_at == *ts && *origin != event.origin_id)
                }),
            };
            if !fresh {
                debug!(topic = event.topic.as_str(), ?path, "dropping stale or duplicate sync event");
                return;
            }
            last.insert(event.topic, (event.origin_id.clone(), event.emitted_at));
        }

        self.last_sync_time.store(event.emitted_at, Ordering::SeqCst);
        // Bindings write the payload back to the store; record its digest up
        // front so neither the signal nor the poll re-announces it. External
        // events keep the digest of the raw store text recorded when the
        // change was detected.
        if !event.is_external() {
            self.note_fingerprint(event.topic.storage_key(), fingerprint(&event.payload.to_string()));
        }

        debug!(topic = event.topic.as_str(), origin = %event.origin_id, ?path, "applying sync event");
        self.dispatch_local(ServiceChannel::Sync, &ServiceEvent::Sync(event));
    }

    // =========================================================================
    // STORAGE ACCESS (bindings)
    // =========================================================================

    /// Read a raw stored value; `None` when detached from an origin.
    pub(crate) fn read_raw(&self, key: &str) -> Option<String> {
        let handle = self.storage.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        handle.and_then(|h| h.get(key))
    }

    /// Write a raw value through the storage handle, keeping the
    /// fingerprint cache consistent. Guarded no-op when detached.
    pub(crate) fn write_raw(&self, key: &str, raw: &str) {
        if let Some((static_key, _)) = topic::lookup(key) {
            self.note_fingerprint(static_key, fingerprint(raw));
        }
        let handle = self.storage.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone();
        if let Some(handle) = handle {
            handle.set(key, raw);
        }
    }

    /// Stamp an emit timestamp that is both current and strictly greater
    /// than every previous emit from this context.
    fn bump_emit_ts(&self, now: i64) -> i64 {
        let mut prev = self.last_emitted.load(Ordering::SeqCst);
        loop {
            let next = now.max(prev + 1);
            match self
                .last_emitted
                .compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return next,
                Err(actual) => prev = actual,
            }
        }
    }

    // =========================================================================
    // FINGERPRINTS
    // =========================================================================

    fn note_fingerprint(&self, key: &'static str, fp: Fingerprint) {
        self.fingerprints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(key, fp);
    }

    fn clear_fingerprint(&self, key: &'static str) {
        self.fingerprints
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(key);
    }

    /// Record the digest of `raw` under `key`; true when it differs from
    /// the previous observation.
    fn changed_fingerprint(&self, key: &'static str, raw: &str) -> bool {
        let fp = fingerprint(raw);
        let mut fingerprints = self.fingerprints.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if fingerprints.get(key) == Some(&fp) {
            return false;
        }
        fingerprints.insert(key, fp);
        true
    }
}

async fn recv_or_pending(rx: &mut Option<mpsc::Receiver<serde_json::Value>>) -> Option<serde_json::Value> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "service_test.rs"]
mod tests;
