//! End-to-end tests for settings instances, the registry, and propagation of
//! changes between instances.

use async_trait::async_trait;
use serde_json::{Value, json};
use settings_sync::bus::{LocalBus, NotificationBus, Subscription};
use settings_sync::document::{Document, document_from_value};
use settings_sync::error::{BusError, ErrorCode, SettingsError, StoreError};
use settings_sync::store::{MemoryStore, SettingsStore};
use settings_sync::types::ChangeNotice;
use settings_sync::{SettingsInstance, SettingsRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn plugin_defaults() -> Document {
    document_from_value(json!({"foo": 1, "bar": {"derp": 2}}))
}

fn setup() -> (Arc<MemoryStore>, Arc<LocalBus>, Arc<SettingsRegistry>) {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(LocalBus::new());
    let registry = SettingsRegistry::new(store.clone(), bus.clone());
    (store, bus, registry)
}

/// Receiver positioned after every reload that already happened.
fn watch_reloads(instance: &SettingsInstance) -> watch::Receiver<u64> {
    let mut reloads = instance.reloads();
    reloads.borrow_and_update();
    reloads
}

async fn next_reload(reloads: &mut watch::Receiver<u64>) {
    timeout(WAIT, reloads.changed())
        .await
        .expect("Timed out waiting for reload")
        .expect("Instance dropped while waiting for reload");
}

async fn assert_no_reload(reloads: &mut watch::Receiver<u64>) {
    let outcome = timeout(Duration::from_millis(100), reloads.changed()).await;
    assert!(outcome.is_err(), "unexpected reload");
}

/// Store wrapper with switchable failures.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_load: AtomicBool,
    fail_save: AtomicBool,
    fail_delete: AtomicBool,
    loads: AtomicUsize,
}

impl FlakyStore {
    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::backend("injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SettingsStore for FlakyStore {
    async fn load_namespace(&self, key: &str) -> Result<Document, StoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Self::check(&self.fail_load)?;
        self.inner.load_namespace(key).await
    }

    async fn save_namespace(&self, key: &str, document: &Document) -> Result<(), StoreError> {
        Self::check(&self.fail_save)?;
        self.inner.save_namespace(key, document).await
    }

    async fn delete_namespace(&self, key: &str) -> Result<(), StoreError> {
        Self::check(&self.fail_delete)?;
        self.inner.delete_namespace(key).await
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        self.inner.list_namespaces().await
    }
}

/// Bus wrapper with switchable failures.
#[derive(Default)]
struct FlakyBus {
    inner: LocalBus,
    fail_publish: AtomicBool,
    fail_subscribe: AtomicBool,
}

#[async_trait]
impl NotificationBus for FlakyBus {
    async fn publish(&self, topic: &str, notice: ChangeNotice) -> Result<(), BusError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BusError::Transport("injected failure".into()));
        }
        self.inner.publish(topic, notice).await
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(BusError::Closed);
        }
        self.inner.subscribe(topic).await
    }
}

/// Bus whose topics can be closed from the outside.
#[derive(Default)]
struct ClosableBus {
    topics: Mutex<HashMap<String, broadcast::Sender<ChangeNotice>>>,
    subscribes: AtomicUsize,
}

impl ClosableBus {
    fn close(&self, topic: &str) {
        self.topics.lock().unwrap().remove(topic);
    }
}

#[async_trait]
impl NotificationBus for ClosableBus {
    async fn publish(&self, topic: &str, notice: ChangeNotice) -> Result<(), BusError> {
        if let Some(sender) = self.topics.lock().unwrap().get(topic) {
            let _ = sender.send(notice);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let mut topics = self.topics.lock().unwrap();
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(16).0);
        Ok(Subscription::new(topic, sender.subscribe()))
    }
}

// ---------------------------------------------------------------------------
// Reads, writes and defaults
// ---------------------------------------------------------------------------

#[tokio::test]
async fn defaults_answer_reads_on_empty_store() {
    let (_store, _bus, registry) = setup();
    let settings = registry.create("my-plugin", "1.0", plugin_defaults());

    assert_eq!(settings.get("foo"), Some(json!(1)));
    assert_eq!(settings.get("bar.derp"), Some(json!(2)));

    settings.ready().await.expect("Initial load failed");
    assert_eq!(settings.get("foo"), Some(json!(1)));
    assert_eq!(settings.get("bar.derp"), Some(json!(2)));
}

#[tokio::test]
async fn loaded_values_are_returned_even_when_falsy() {
    let (store, _bus, registry) = setup();
    let stored = document_from_value(json!({"zero": 0, "off": false, "blank": "", "foo": 0}));
    store.save_namespace("my-plugin:1.0", &stored).await.unwrap();

    let settings = registry
        .open("my-plugin", "1.0", plugin_defaults())
        .await
        .expect("Failed to open settings");
    assert_eq!(settings.get("zero"), Some(json!(0)));
    assert_eq!(settings.get("off"), Some(json!(false)));
    assert_eq!(settings.get("blank"), Some(json!("")));
    assert_eq!(settings.get("foo"), Some(json!(0)));
}

#[tokio::test]
async fn nested_set_is_readable_without_persist() {
    let (store, _bus, registry) = setup();
    let settings = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();

    settings.set("bar.derp", 5);
    assert_eq!(settings.get("bar.derp"), Some(json!(5)));

    settings.set("nested.deep.value", 42);
    assert_eq!(settings.get("nested.deep.value"), Some(json!(42)));

    // Nothing reached the store.
    assert!(store.load_namespace("my-plugin:1.0").await.unwrap().is_empty());
}

#[tokio::test]
async fn inline_fallbacks() {
    let (_store, _bus, registry) = setup();
    let settings = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    settings.set("nested.deep.value", 42);

    assert_eq!(settings.get("nonexistent.key"), None);
    assert_eq!(
        settings.get_or("nonexistent.key", &json!("default_value")),
        Some(json!("default_value"))
    );
    assert_eq!(
        settings.get_or("nonexistent.deep.key", &json!({"deep": {"key": 99}})),
        Some(json!(99))
    );
    assert_eq!(
        settings.get_or("nested.other", &json!({"deep": {"key": 99}})),
        None
    );
    assert_eq!(
        settings.get_or("complex.nested.value", &json!({"complex": {"nested": {"value": 123}}})),
        Some(json!(123))
    );
    assert_eq!(
        settings.get_or("undefined.key", &json!({"key": 999})),
        Some(json!(999))
    );
}

#[tokio::test]
async fn partially_defaulted_path_is_absent() {
    let (_store, _bus, registry) = setup();
    let defaults = document_from_value(json!({"default": {"value": 1}}));
    let settings = registry.open("some-plugin", "1.0", defaults).await.unwrap();

    assert_eq!(settings.get("default.value"), Some(json!(1)));
    assert_eq!(settings.get("default.undefined.path"), None);
}

// ---------------------------------------------------------------------------
// Propagation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn persisted_change_reaches_peer_in_same_registry() {
    let (_store, bus, registry) = setup();
    let s1 = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let s2 = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();

    assert_eq!(registry.instance_count("my-plugin:1.0"), 2);
    assert_eq!(bus.subscriber_count("my-plugin:1.0"), 1);

    let mut s1_reloads = watch_reloads(&s1);
    let mut s2_reloads = watch_reloads(&s2);
    s1.set("foo", 3);
    s1.persist().await.expect("Persist failed");

    next_reload(&mut s2_reloads).await;
    next_reload(&mut s1_reloads).await;
    assert_eq!(s2.get("foo"), Some(json!(3)));
    assert_eq!(s1.get("foo"), Some(json!(3)));
    assert_eq!(s2.get("bar.derp"), Some(json!(2)));
}

#[tokio::test]
async fn persisted_change_reaches_other_process() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(LocalBus::new());
    let process_a = SettingsRegistry::new(store.clone(), bus.clone());
    let process_b = SettingsRegistry::new(store.clone(), bus.clone());
    assert_ne!(process_a.origin(), process_b.origin());

    let a = process_a.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let b = process_b.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    assert_eq!(bus.subscriber_count("my-plugin:1.0"), 2);

    let mut b_reloads = watch_reloads(&b);
    a.set("foo", 3);
    a.set("bar.derp", 7);
    a.persist().await.unwrap();

    next_reload(&mut b_reloads).await;
    assert_eq!(b.get("foo"), Some(json!(3)));
    assert_eq!(b.get("bar.derp"), Some(json!(7)));
}

#[tokio::test]
async fn peers_keep_their_own_defaults() {
    let (_store, _bus, registry) = setup();
    let a = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let b = registry
        .open("my-plugin", "1.0", document_from_value(json!({"foo": 10, "extra": true})))
        .await
        .unwrap();

    let mut b_reloads = watch_reloads(&b);
    a.set("bar.derp", 5);
    a.persist().await.unwrap();
    next_reload(&mut b_reloads).await;

    assert_eq!(a.get("foo"), Some(json!(1)));
    assert_eq!(b.get("foo"), Some(json!(10)));
    assert_eq!(b.get("bar.derp"), Some(json!(5)));
    assert_eq!(a.get("extra"), None);
    assert_eq!(b.get("extra"), Some(json!(true)));
}

#[tokio::test]
async fn explicit_reload_picks_up_store_state() {
    let store = Arc::new(MemoryStore::new());
    let process_a = SettingsRegistry::new(store.clone(), Arc::new(LocalBus::new()));
    // Separate buses: B never hears about A's writes.
    let process_b = SettingsRegistry::new(store.clone(), Arc::new(LocalBus::new()));

    let a = process_a.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let b = process_b.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();

    a.set("foo", "from-a");
    a.persist().await.unwrap();
    assert_eq!(b.get("foo"), Some(json!(1)));

    b.reload().await.expect("Reload failed");
    assert_eq!(b.get("foo"), Some(json!("from-a")));
}

#[tokio::test]
async fn last_writer_wins_and_everyone_converges() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(LocalBus::new());
    let process_a = SettingsRegistry::new(store.clone(), bus.clone());
    let process_b = SettingsRegistry::new(store.clone(), bus.clone());

    let a = process_a.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let b = process_b.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();

    let mut a_reloads = watch_reloads(&a);
    let mut b_reloads = watch_reloads(&b);
    a.set("only_a", 1);
    a.persist().await.unwrap();
    next_reload(&mut a_reloads).await;
    next_reload(&mut b_reloads).await;

    // B's whole-document persist drops `only_a`.
    b.replace(document_from_value(json!({"only_b": 2})));
    let mut a_reloads = watch_reloads(&a);
    let mut b_reloads = watch_reloads(&b);
    b.persist().await.unwrap();
    next_reload(&mut a_reloads).await;
    next_reload(&mut b_reloads).await;

    let stored = Value::Object(store.load_namespace("my-plugin:1.0").await.unwrap());
    assert_eq!(stored, json!({"only_b": 2}));
    assert_eq!(Value::Object((*a.snapshot()).clone()), stored);
    assert_eq!(Value::Object((*b.snapshot()).clone()), stored);
}

// ---------------------------------------------------------------------------
// Reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reset_falls_back_to_defaults_everywhere() {
    let (store, _bus, registry) = setup();
    let s1 = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let s2 = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();

    let mut s1_reloads = watch_reloads(&s1);
    let mut s2_reloads = watch_reloads(&s2);
    s1.set("foo", 3);
    s1.set("temp.key", 100);
    s1.persist().await.unwrap();
    next_reload(&mut s1_reloads).await;
    next_reload(&mut s2_reloads).await;
    assert_eq!(s2.get("temp.key"), Some(json!(100)));

    let mut s2_reloads = watch_reloads(&s2);
    s1.set("bar.derp", 5);
    s1.reset().await.expect("Reset failed");
    assert_eq!(s1.get("foo"), Some(json!(1)));
    assert_eq!(s1.get("bar.derp"), Some(json!(2)));
    assert_eq!(s1.get("temp.key"), None);
    assert!(store.load_namespace("my-plugin:1.0").await.unwrap().is_empty());

    next_reload(&mut s2_reloads).await;
    assert_eq!(s2.get("foo"), Some(json!(1)));
    assert_eq!(s2.get("temp.key"), None);
}

#[tokio::test]
async fn persisting_twice_notifies_twice_and_stores_once() {
    let (store, bus, registry) = setup();
    let settings = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let mut notices = bus.subscribe("my-plugin:1.0").await.unwrap();

    settings.set("bar.derp", 5);
    settings.persist().await.unwrap();
    let first = store.load_namespace("my-plugin:1.0").await.unwrap();
    settings.persist().await.unwrap();

    for _ in 0..2 {
        let notice = timeout(WAIT, notices.recv())
            .await
            .expect("Timed out waiting for notice")
            .expect("Topic closed");
        assert_eq!(notice.namespace, "my-plugin:1.0");
        assert_eq!(notice.origin, registry.origin());
    }
    assert_eq!(store.load_namespace("my-plugin:1.0").await.unwrap(), first);
    assert_eq!(Value::Object(first), json!({"bar": {"derp": 5}}));
}

#[tokio::test]
async fn reset_twice_is_same_as_once() {
    let (store, _bus, registry) = setup();
    let settings = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    settings.set("foo", 3);
    settings.persist().await.unwrap();

    settings.reset().await.unwrap();
    assert!(store.list_namespaces().await.unwrap().is_empty());
    settings.reset().await.unwrap();
    assert!(store.list_namespaces().await.unwrap().is_empty());
    assert_eq!(settings.get("foo"), Some(json!(1)));
    assert!(settings.snapshot().is_empty());
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn load_failure_is_reported_once_and_instance_stays_usable() {
    let store = Arc::new(FlakyStore::default());
    store.fail_load.store(true, Ordering::SeqCst);
    let registry = SettingsRegistry::new(store.clone(), Arc::new(LocalBus::new()));

    let settings = registry.create("my-plugin", "1.0", plugin_defaults());
    let err = settings.ready().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::LoadFailure);
    assert_eq!(err.namespace(), "my-plugin:1.0");
    assert_eq!(settings.ready().await.unwrap_err(), err);

    assert!(!settings.is_loaded());
    assert_eq!(settings.get("foo"), Some(json!(1)));
    settings.set("foo", 2);
    assert_eq!(settings.get("foo"), Some(json!(2)));

    store.fail_load.store(false, Ordering::SeqCst);
    settings.reload().await.unwrap();
    assert!(settings.is_loaded());
}

#[tokio::test]
async fn open_surfaces_load_failure() {
    let store = Arc::new(FlakyStore::default());
    store.fail_load.store(true, Ordering::SeqCst);
    let registry = SettingsRegistry::new(store, Arc::new(LocalBus::new()));

    let err = registry
        .open("my-plugin", "1.0", plugin_defaults())
        .await
        .unwrap_err();
    assert!(matches!(err, SettingsError::Load { .. }));
}

#[tokio::test]
async fn persist_failure_keeps_memory_and_publishes_nothing() {
    let store = Arc::new(FlakyStore::default());
    let registry = SettingsRegistry::new(store.clone(), Arc::new(LocalBus::new()));
    let s1 = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let s2 = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let mut s2_reloads = watch_reloads(&s2);

    store.fail_save.store(true, Ordering::SeqCst);
    s1.set("foo", 3);
    let err = s1.persist().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::PersistFailure);
    assert_eq!(s1.get("foo"), Some(json!(3)));
    assert_no_reload(&mut s2_reloads).await;

    store.fail_save.store(false, Ordering::SeqCst);
    s1.persist().await.expect("Retry failed");
    next_reload(&mut s2_reloads).await;
    assert_eq!(s2.get("foo"), Some(json!(3)));
}

#[tokio::test]
async fn reset_failure_changes_nothing() {
    let store = Arc::new(FlakyStore::default());
    let registry = SettingsRegistry::new(store.clone(), Arc::new(LocalBus::new()));
    let settings = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let mut reloads = watch_reloads(&settings);
    settings.set("foo", 3);
    settings.persist().await.unwrap();
    next_reload(&mut reloads).await;

    store.fail_delete.store(true, Ordering::SeqCst);
    let err = settings.reset().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ResetFailure);
    assert_eq!(settings.get("foo"), Some(json!(3)));
    assert_eq!(
        store.load_namespace("my-plugin:1.0").await.unwrap().get("foo"),
        Some(&json!(3))
    );
}

#[tokio::test]
async fn failed_notification_reload_keeps_last_document() {
    let store = Arc::new(FlakyStore::default());
    let bus = Arc::new(LocalBus::new());
    let process_a = SettingsRegistry::new(store.clone(), bus.clone());
    let process_b = SettingsRegistry::new(store.clone(), bus.clone());
    let a = process_a.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let b = process_b.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();

    let mut a_reloads = watch_reloads(&a);
    let mut b_reloads = watch_reloads(&b);
    a.set("foo", 3);
    a.persist().await.unwrap();
    next_reload(&mut a_reloads).await;
    next_reload(&mut b_reloads).await;

    store.fail_load.store(true, Ordering::SeqCst);
    let loads_before = store.loads.load(Ordering::SeqCst);
    a.set("foo", 4);
    a.persist().await.unwrap();

    // Both registries attempt (and fail) a reload.
    timeout(WAIT, async {
        while store.loads.load(Ordering::SeqCst) < loads_before + 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Listeners never attempted a reload");
    assert_eq!(b.get("foo"), Some(json!(3)));

    store.fail_load.store(false, Ordering::SeqCst);
    b.reload().await.unwrap();
    assert_eq!(b.get("foo"), Some(json!(4)));
}

#[tokio::test]
async fn publish_failure_after_successful_write() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(FlakyBus::default());
    let registry = SettingsRegistry::new(store.clone(), bus.clone());
    let settings = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();

    bus.fail_publish.store(true, Ordering::SeqCst);
    settings.set("foo", 3);
    let err = settings.persist().await.unwrap_err();
    assert!(matches!(err, SettingsError::Publish { .. }));
    assert_eq!(
        store.load_namespace("my-plugin:1.0").await.unwrap().get("foo"),
        Some(&json!(3))
    );
}

#[tokio::test]
async fn subscribe_failure_is_reported_but_document_loads() {
    let store = Arc::new(MemoryStore::new());
    store
        .save_namespace("my-plugin:1.0", &document_from_value(json!({"foo": 9})))
        .await
        .unwrap();
    let bus = Arc::new(FlakyBus::default());
    bus.fail_subscribe.store(true, Ordering::SeqCst);
    let registry = SettingsRegistry::new(store, bus);

    let settings = registry.create("my-plugin", "1.0", plugin_defaults());
    let err = settings.ready().await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::SubscribeFailure);
    assert!(settings.is_loaded());
    assert_eq!(settings.get("foo"), Some(json!(9)));
}

// ---------------------------------------------------------------------------
// Registry bookkeeping
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropping_last_instance_unsubscribes() {
    let (_store, bus, registry) = setup();
    let s1 = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let s2 = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let other = registry.open("other-plugin", "2", Document::new()).await.unwrap();
    assert_eq!(registry.namespaces(), vec!["my-plugin:1.0", "other-plugin:2"]);

    drop(s1);
    assert_eq!(registry.instance_count("my-plugin:1.0"), 1);
    assert_eq!(bus.subscriber_count("my-plugin:1.0"), 1);

    drop(s2);
    assert_eq!(registry.instance_count("my-plugin:1.0"), 0);
    assert_eq!(registry.namespaces(), vec!["other-plugin:2"]);
    timeout(WAIT, async {
        while bus.subscriber_count("my-plugin:1.0") > 0 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("Subscription was not released");

    assert_eq!(other.get("anything"), None);
}

#[tokio::test]
async fn namespace_can_be_rejoined_after_release() {
    let (_store, _bus, registry) = setup();
    let first = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    first.set("foo", 3);
    first.persist().await.unwrap();
    drop(first);

    let second = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    let third = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    assert_eq!(second.get("foo"), Some(json!(3)));

    let mut third_reloads = watch_reloads(&third);
    second.set("foo", 5);
    second.persist().await.unwrap();
    next_reload(&mut third_reloads).await;
    assert_eq!(third.get("foo"), Some(json!(5)));
}

#[tokio::test]
async fn closed_topic_is_resubscribed_by_next_instance() {
    let store = Arc::new(MemoryStore::new());
    let bus = Arc::new(ClosableBus::default());
    let registry = SettingsRegistry::new(store, bus.clone());
    let first = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    assert_eq!(bus.subscribes.load(Ordering::SeqCst), 1);

    bus.close("my-plugin:1.0");
    // Let the listener observe the close and stop.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let second = registry.open("my-plugin", "1.0", plugin_defaults()).await.unwrap();
    assert_eq!(bus.subscribes.load(Ordering::SeqCst), 2);
    assert_eq!(registry.instance_count("my-plugin:1.0"), 2);

    let mut first_reloads = watch_reloads(&first);
    second.set("foo", 4);
    second.persist().await.unwrap();
    next_reload(&mut first_reloads).await;
    assert_eq!(first.get("foo"), Some(json!(4)));
}
