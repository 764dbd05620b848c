//! Per-process table of live settings instances.
//!
//! A registry owns the store and bus handles and groups instances by
//! namespace. Each namespace with at least one live instance has exactly one
//! bus subscription and one listener task; a change notice triggers a single
//! store read whose document is installed into every live instance of that
//! namespace.
//!
//! Instances are held weakly. Dropping the last instance of a namespace
//! removes its entry, which stops the listener and releases the subscription.
//! If the bus closes a topic, the listener stops; the next instance created
//! for that namespace subscribes again on behalf of every member.
//!
//! Registries are explicit values, not globals: two registries sharing one
//! store and one bus behave like two processes.

use crate::bus::{LocalBus, NotificationBus};
use crate::config::{Config, StoreBackend};
use crate::document::Document;
use crate::error::{BusError, ErrorCode, SettingsError, SettingsResult};
use crate::instance::{InstanceShared, SettingsInstance};
use crate::store::{MemoryStore, SettingsStore, SqliteStore};
use crate::types::{ChangeNotice, Namespace};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

static REGISTRY_SEQ: AtomicU64 = AtomicU64::new(1);

/// State of a namespace's bus subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubscriptionState {
    Pending,
    Active,
    Failed(BusError),
}

struct Member {
    id: u64,
    shared: Weak<InstanceShared>,
}

struct NamespaceEntry {
    members: Vec<Member>,
    subscription: watch::Receiver<SubscriptionState>,
    listener: JoinHandle<()>,
}

/// Process-wide context for settings instances.
pub struct SettingsRegistry {
    origin: String,
    store: Arc<dyn SettingsStore>,
    bus: Arc<dyn NotificationBus>,
    namespaces: Mutex<HashMap<String, NamespaceEntry>>,
    next_member: AtomicU64,
    load_tickets: AtomicU64,
}

impl SettingsRegistry {
    /// Create a registry over the given store and bus.
    pub fn new(store: Arc<dyn SettingsStore>, bus: Arc<dyn NotificationBus>) -> Arc<Self> {
        let origin = format!(
            "{}-{}",
            std::process::id(),
            REGISTRY_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        Arc::new(Self {
            origin,
            store,
            bus,
            namespaces: Mutex::new(HashMap::new()),
            next_member: AtomicU64::new(1),
            load_tickets: AtomicU64::new(0),
        })
    }

    /// Build the configured store and an in-process bus.
    pub fn from_config(config: &Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn SettingsStore> = match config.store.backend {
            StoreBackend::Sqlite => {
                config.ensure_db_dir()?;
                let store = SqliteStore::open(&config.store.path).with_context(|| {
                    format!("opening settings database {}", config.store.path.display())
                })?;
                Arc::new(store)
            }
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };
        let bus = Arc::new(LocalBus::with_capacity(config.bus.capacity));
        Ok(Self::new(store, bus))
    }

    /// Create a settings instance and start loading it in the background.
    ///
    /// The instance is usable immediately; until the load lands its live
    /// document is empty and reads fall back to `defaults`. Await
    /// [`SettingsInstance::ready`] for a consistent first read.
    ///
    /// # Panics
    /// Panics when called outside a tokio runtime.
    pub fn create(
        self: &Arc<Self>,
        plugin_id: impl Into<String>,
        version: impl Into<String>,
        defaults: Document,
    ) -> SettingsInstance {
        let namespace = Namespace::new(plugin_id, version);
        let shared = Arc::new(InstanceShared::new(namespace, defaults));
        let member_id = self.next_member.fetch_add(1, Ordering::Relaxed);
        let subscription = self.join(shared.key(), member_id, &shared);

        let registry = Arc::clone(self);
        let loading = Arc::clone(&shared);
        tokio::spawn(async move {
            registry.initial_load(loading, subscription).await;
        });

        SettingsInstance::new(shared, Arc::clone(self), member_id)
    }

    /// Create a settings instance and wait for its initial load.
    pub async fn open(
        self: &Arc<Self>,
        plugin_id: impl Into<String>,
        version: impl Into<String>,
        defaults: Document,
    ) -> SettingsResult<SettingsInstance> {
        let instance = self.create(plugin_id, version, defaults);
        instance.ready().await?;
        Ok(instance)
    }

    /// Namespace keys with at least one live instance, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.lock_namespaces().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of live instances registered under a namespace key.
    pub fn instance_count(&self, key: &str) -> usize {
        self.lock_namespaces().get(key).map_or(0, |entry| {
            entry
                .members
                .iter()
                .filter(|m| m.shared.strong_count() > 0)
                .count()
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub(crate) fn store(&self) -> &dyn SettingsStore {
        self.store.as_ref()
    }

    /// Next load ticket. Tickets order loads by start time.
    pub(crate) fn next_ticket(&self) -> u64 {
        self.load_tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish an invalidation notice for a namespace.
    pub(crate) async fn publish(&self, key: &str) -> Result<(), BusError> {
        self.bus
            .publish(key, ChangeNotice::new(key, self.origin.clone()))
            .await
    }

    fn lock_namespaces(&self) -> MutexGuard<'_, HashMap<String, NamespaceEntry>> {
        self.namespaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn join(
        self: &Arc<Self>,
        key: &str,
        member_id: u64,
        shared: &Arc<InstanceShared>,
    ) -> watch::Receiver<SubscriptionState> {
        let member = Member {
            id: member_id,
            shared: Arc::downgrade(shared),
        };
        let mut namespaces = self.lock_namespaces();
        if let Some(entry) = namespaces.get_mut(key) {
            entry.members.push(member);
            if entry.listener.is_finished() {
                let (listener, subscription) = self.spawn_listener(key);
                entry.listener = listener;
                entry.subscription = subscription;
                info!(namespace = key, member_id, "Listener had stopped, resubscribing");
            } else {
                debug!(namespace = key, member_id, "Joined existing namespace");
            }
            return entry.subscription.clone();
        }

        let (listener, state_rx) = self.spawn_listener(key);
        namespaces.insert(
            key.to_string(),
            NamespaceEntry {
                members: vec![member],
                subscription: state_rx.clone(),
                listener,
            },
        );
        debug!(namespace = key, member_id, "Registered namespace");
        state_rx
    }

    fn spawn_listener(
        self: &Arc<Self>,
        key: &str,
    ) -> (JoinHandle<()>, watch::Receiver<SubscriptionState>) {
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Pending);
        let listener = tokio::spawn(listen(
            Arc::downgrade(self),
            Arc::clone(&self.bus),
            key.to_string(),
            state_tx,
        ));
        (listener, state_rx)
    }

    /// Remove a member; drop the namespace entry when it was the last one.
    pub(crate) fn release(&self, key: &str, member_id: u64) {
        let mut namespaces = self.lock_namespaces();
        let Some(entry) = namespaces.get_mut(key) else {
            return;
        };
        entry
            .members
            .retain(|m| m.id != member_id && m.shared.strong_count() > 0);
        if entry.members.is_empty() {
            if let Some(entry) = namespaces.remove(key) {
                entry.listener.abort();
            }
            debug!(namespace = key, "Last instance dropped, unsubscribed");
        }
    }

    fn live_members(&self, key: &str) -> Vec<Arc<InstanceShared>> {
        let mut namespaces = self.lock_namespaces();
        let Some(entry) = namespaces.get_mut(key) else {
            return Vec::new();
        };
        entry.members.retain(|m| m.shared.strong_count() > 0);
        entry
            .members
            .iter()
            .filter_map(|m| m.shared.upgrade())
            .collect()
    }

    async fn initial_load(
        &self,
        shared: Arc<InstanceShared>,
        mut subscription: watch::Receiver<SubscriptionState>,
    ) {
        let state = match subscription
            .wait_for(|s| *s != SubscriptionState::Pending)
            .await
        {
            Ok(state) => state.clone(),
            Err(_) => SubscriptionState::Failed(BusError::Closed),
        };

        let outcome = shared.load(self).await.and_then(|()| match state {
            SubscriptionState::Failed(source) => Err(SettingsError::Subscribe {
                namespace: shared.key().to_string(),
                source,
            }),
            _ => Ok(()),
        });

        match &outcome {
            Ok(()) => debug!(namespace = shared.key(), "Initial load complete"),
            Err(err) => warn!(
                namespace = shared.key(),
                code = ?err.code(),
                error = %err,
                "Initial load failed"
            ),
        }
        shared.finish_ready(outcome);
    }

    /// Re-read a namespace once and install it into every live member.
    async fn reload_members(&self, key: &str) {
        let members = self.live_members(key);
        if members.is_empty() {
            return;
        }

        let ticket = self.next_ticket();
        match self.store.load_namespace(key).await {
            Ok(document) => {
                let document = Arc::new(document);
                let installed = members
                    .iter()
                    .filter(|m| m.install(ticket, Arc::clone(&document)))
                    .count();
                debug!(namespace = key, ticket, installed, "Reloaded after change notice");
            }
            Err(err) => warn!(
                namespace = key,
                code = ?ErrorCode::NotificationHandlingFailure,
                error = %err,
                "Reload after change notice failed, keeping last document"
            ),
        }
    }
}

/// Listener task: one per namespace per registry.
async fn listen(
    registry: Weak<SettingsRegistry>,
    bus: Arc<dyn NotificationBus>,
    key: String,
    state: watch::Sender<SubscriptionState>,
) {
    let mut subscription = match bus.subscribe(&key).await {
        Ok(subscription) => {
            state.send_replace(SubscriptionState::Active);
            subscription
        }
        Err(err) => {
            warn!(
                namespace = %key,
                error = %err,
                "Subscribe failed, instances will not see peer changes"
            );
            state.send_replace(SubscriptionState::Failed(err));
            return;
        }
    };

    while let Some(notice) = subscription.recv().await {
        let Some(registry) = registry.upgrade() else {
            break;
        };
        debug!(
            namespace = %key,
            origin = %notice.origin,
            own = notice.origin == registry.origin,
            "Change notice received"
        );
        registry.reload_members(&key).await;
    }
    state.send_replace(SubscriptionState::Failed(BusError::Closed));
    info!(namespace = %key, "Change listener stopped");
}
