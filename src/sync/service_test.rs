use super::*;
use crate::store::MemoryStore;
use serde_json::json;

fn test_origin() -> Arc<Origin> {
    Origin::new(Arc::new(MemoryStore::new()))
}

fn fast_config() -> SyncConfig {
    SyncConfig { poll_interval: Duration::from_millis(25), ..SyncConfig::default() }
}

fn active_service(origin: &Arc<Origin>, config: SyncConfig) -> Arc<SyncService> {
    let service = SyncService::new(Some(Arc::clone(origin)), config);
    service.initialize();
    service
}

/// Collect every sync event a service applies or emits locally.
fn collect_sync(service: &Arc<SyncService>) -> Arc<Mutex<Vec<SyncEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    service.on(ServiceChannel::Sync, move |event| {
        if let ServiceEvent::Sync(event) = event {
            sink.lock().unwrap().push(event.clone());
        }
    });
    seen
}

async fn wait_until(limit_ms: u64, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(limit_ms);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// =============================================================================
// Graceful degradation
// =============================================================================

#[tokio::test]
async fn detached_initialize_does_not_panic_and_local_dispatch_works() {
    let service = SyncService::new(None, SyncConfig::default());
    service.initialize();
    assert!(service.is_active());

    let seen = collect_sync(&service);
    service.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([{"id": 1}]));

    // Local dispatch is synchronous; no waiting required.
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].payload, json!([{"id": 1}]));
    assert_eq!(seen[0].origin_id, service.origin_id());
}

#[tokio::test]
async fn emit_before_initialize_is_noop() {
    let service = SyncService::new(None, SyncConfig::default());
    let seen = collect_sync(&service);
    service.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([]));
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let origin = test_origin();
    let service = active_service(&origin, fast_config());
    service.initialize();
    service.initialize();
    assert!(service.is_active());
    service.destroy();
}

// =============================================================================
// No self-echo
// =============================================================================

#[tokio::test]
async fn instance_never_applies_its_own_events() {
    let origin = test_origin();
    let a = active_service(&origin, fast_config());
    let b = active_service(&origin, fast_config());

    let seen_a = collect_sync(&a);
    let seen_b = collect_sync(&b);

    a.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([{"id": 1, "name": "X"}]));

    assert!(wait_until(1000, || !seen_b.lock().unwrap().is_empty()).await, "b never saw the event");

    // b applied a's event exactly once despite bus + signal + poll delivery.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen_b.lock().unwrap().len(), 1);
    assert_eq!(seen_b.lock().unwrap()[0].origin_id, a.origin_id());

    // a saw only its own synchronous local dispatch; nothing echoed back.
    assert_eq!(seen_a.lock().unwrap().len(), 1);
    assert_eq!(seen_a.lock().unwrap()[0].origin_id, a.origin_id());

    a.destroy();
    b.destroy();
}

// =============================================================================
// Idempotent convergence
// =============================================================================

#[tokio::test]
async fn later_emit_wins_regardless_of_path() {
    let origin = test_origin();
    let a = active_service(&origin, fast_config());
    let b = active_service(&origin, fast_config());
    let seen_b = collect_sync(&b);

    a.emit_sync_event(SyncTopic::Content, SyncAction::Update, json!([{"id": 1}]));
    a.emit_sync_event(SyncTopic::Content, SyncAction::Update, json!([{"id": 1}, {"id": 2}]));

    assert!(wait_until(1000, || seen_b.lock().unwrap().len() >= 2).await);
    // Even after extra poll cycles, no reapplication and the last value wins.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let seen = seen_b.lock().unwrap();
    assert_eq!(seen.last().unwrap().payload, json!([{"id": 1}, {"id": 2}]));
    assert_eq!(seen.len(), 2);
    drop(seen);

    a.destroy();
    b.destroy();
}

// =============================================================================
// Monotonic polling guard
// =============================================================================

#[tokio::test]
async fn poll_never_reapplies_older_timestamps() {
    let origin = test_origin();
    let service = active_service(&origin, fast_config());
    let seen = collect_sync(&service);

    // A writer that bypasses the storage signal: only polling can see it.
    let (writer, _rx) = origin.attach(Uuid::new_v4());

    let newer = SyncEvent {
        topic: SyncTopic::Creators,
        action: SyncAction::Update,
        payload: json!([{"id": 2}]),
        origin_id: "ctx-newer".into(),
        emitted_at: 9_000,
    };
    writer.raw_store().set(LAST_SYNC_KEY, &serde_json::to_string(&newer).unwrap());
    assert!(wait_until(1000, || seen.lock().unwrap().len() == 1).await);
    assert_eq!(service.last_sync_time(), Some(9_000));

    // An older snapshot lands in the slot (e.g. tab restored from sleep).
    let older = SyncEvent {
        topic: SyncTopic::Creators,
        action: SyncAction::Update,
        payload: json!([{"id": 1}]),
        origin_id: "ctx-older".into(),
        emitted_at: 5_000,
    };
    writer.raw_store().set(LAST_SYNC_KEY, &serde_json::to_string(&older).unwrap());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen.lock().unwrap().len(), 1, "stale event must not reapply");
    assert_eq!(service.last_sync_time(), Some(9_000));

    service.destroy();
}

// =============================================================================
// Duplicate suppression on push paths
// =============================================================================

#[tokio::test]
async fn identical_envelope_signaled_twice_applies_once() {
    let origin = test_origin();
    let service = active_service(&origin, fast_config());
    let seen = collect_sync(&service);

    let (writer, _rx) = origin.attach(Uuid::new_v4());
    let event = SyncEvent {
        topic: SyncTopic::Employees,
        action: SyncAction::Update,
        payload: json!([{"id": 7}]),
        origin_id: "ctx-w".into(),
        emitted_at: 4_200,
    };
    let envelope = serde_json::to_string(&event).unwrap();

    writer.set(LAST_SYNC_KEY, &envelope);
    writer.set(LAST_SYNC_KEY, &envelope);

    assert!(wait_until(1000, || !seen.lock().unwrap().is_empty()).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(seen.lock().unwrap().len(), 1);

    service.destroy();
}

// =============================================================================
// External change detection
// =============================================================================

#[tokio::test]
async fn signaled_topic_write_synthesizes_external_event() {
    let origin = test_origin();
    let service = active_service(&origin, fast_config());
    let seen = collect_sync(&service);

    let (writer, _rx) = origin.attach(Uuid::new_v4());
    writer.set("stacked-categories", r#"["shorts","vlogs"]"#);

    assert!(wait_until(1000, || !seen.lock().unwrap().is_empty()).await);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].is_external());
    assert_eq!(seen[0].topic, SyncTopic::Categories);
    assert_eq!(seen[0].payload, json!(["shorts", "vlogs"]));
    drop(seen);

    service.destroy();
}

#[tokio::test]
async fn unsignaled_topic_write_is_caught_by_polling() {
    let origin = test_origin();
    let service = active_service(&origin, fast_config());
    let seen = collect_sync(&service);

    let (writer, _rx) = origin.attach(Uuid::new_v4());
    writer.raw_store().set("stacked-strategies", r#"[{"id":"q3"}]"#);

    assert!(wait_until(1000, || !seen.lock().unwrap().is_empty()).await);
    let seen = seen.lock().unwrap();
    assert!(seen[0].is_external());
    assert_eq!(seen[0].topic, SyncTopic::Strategies);
    drop(seen);

    service.destroy();
}

#[tokio::test]
async fn unchanged_value_rewrite_is_not_reannounced() {
    let origin = test_origin();
    let (writer, _rx) = origin.attach(Uuid::new_v4());
    writer.set("stacked-settings", r#"{"theme":"dark"}"#);

    // Value exists before the service starts: primed, not announced.
    let service = active_service(&origin, fast_config());
    let seen = collect_sync(&service);

    writer.set("stacked-settings", r#"{"theme":"dark"}"#);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(seen.lock().unwrap().is_empty());

    service.destroy();
}

// =============================================================================
// Malformed input
// =============================================================================

#[tokio::test]
async fn malformed_slot_json_is_skipped_and_polling_continues() {
    let origin = test_origin();
    let service = active_service(&origin, fast_config());
    let seen = collect_sync(&service);

    let (writer, _rx) = origin.attach(Uuid::new_v4());
    writer.set(LAST_SYNC_KEY, "{not json");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen.lock().unwrap().is_empty());

    // A later valid envelope still applies: the timer survived.
    let event = SyncEvent {
        topic: SyncTopic::Content,
        action: SyncAction::Update,
        payload: json!([]),
        origin_id: "ctx-ok".into(),
        emitted_at: 1_234,
    };
    writer.set(LAST_SYNC_KEY, &serde_json::to_string(&event).unwrap());
    assert!(wait_until(1000, || !seen.lock().unwrap().is_empty()).await);

    service.destroy();
}

#[tokio::test]
async fn malformed_topic_value_is_skipped() {
    let origin = test_origin();
    let service = active_service(&origin, fast_config());
    let seen = collect_sync(&service);

    let (writer, _rx) = origin.attach(Uuid::new_v4());
    writer.set("stacked-creators", "{truncated");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(seen.lock().unwrap().is_empty());

    service.destroy();
}

// =============================================================================
// Listener registry
// =============================================================================

#[tokio::test]
async fn listeners_fire_in_registration_order() {
    let service = SyncService::new(None, SyncConfig::default());
    service.initialize();

    let order = Arc::new(Mutex::new(Vec::new()));
    for tag in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        service.on(ServiceChannel::Sync, move |_| order.lock().unwrap().push(tag));
    }

    service.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([]));
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn panicking_listener_does_not_block_later_listeners() {
    let service = SyncService::new(None, SyncConfig::default());
    service.initialize();

    service.on(ServiceChannel::Sync, |_| panic!("listener bug"));
    let reached = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&reached);
    service.on(ServiceChannel::Sync, move |_| *flag.lock().unwrap() = true);

    service.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([]));
    assert!(*reached.lock().unwrap());
}

#[tokio::test]
async fn off_unregisters_a_listener() {
    let service = SyncService::new(None, SyncConfig::default());
    service.initialize();

    let count = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&count);
    let id = service.on(ServiceChannel::Sync, move |_| *counter.lock().unwrap() += 1);

    service.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([]));
    service.off(ServiceChannel::Sync, id);
    service.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([]));

    assert_eq!(*count.lock().unwrap(), 1);
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test]
async fn destroy_is_idempotent_and_final() {
    let origin = test_origin();
    let service = active_service(&origin, fast_config());
    let seen = collect_sync(&service);

    service.destroy();
    service.destroy();
    assert!(!service.is_active());

    service.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([]));
    assert!(seen.lock().unwrap().is_empty());

    // Re-initialization after destroy is rejected.
    service.initialize();
    assert!(!service.is_active());
}

#[tokio::test]
async fn destroyed_service_stops_receiving() {
    let origin = test_origin();
    let a = active_service(&origin, fast_config());
    let b = active_service(&origin, fast_config());
    let seen_b = collect_sync(&b);

    b.destroy();
    a.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([{"id": 1}]));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(seen_b.lock().unwrap().is_empty());

    a.destroy();
}

#[tokio::test]
async fn last_sync_time_tracks_applied_events_only() {
    let origin = test_origin();
    let a = active_service(&origin, fast_config());
    let b = active_service(&origin, fast_config());

    assert_eq!(b.last_sync_time(), None);
    a.emit_sync_event(SyncTopic::Creators, SyncAction::Update, json!([]));

    assert!(wait_until(1000, || b.last_sync_time().is_some()).await);
    // The emitter itself applied nothing.
    assert_eq!(a.last_sync_time(), None);

    a.destroy();
    b.destroy();
}

// =============================================================================
// Config
// =============================================================================

#[test]
fn default_config_polls_every_two_seconds() {
    let config = SyncConfig::default();
    assert_eq!(config.poll_interval, Duration::from_millis(2000));
    assert_eq!(config.transport, TransportKind::Bus);
    assert!(config.heartbeat.is_none());
}

#[test]
fn from_env_without_presence_url_disables_heartbeat() {
    unsafe { std::env::remove_var("PRESENCE_URL") };
    let config = SyncConfig::from_env();
    assert!(config.heartbeat.is_none());
}
