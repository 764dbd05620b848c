//! A cached, self-synchronizing view of one settings namespace.
//!
//! Reads and writes are synchronous and touch only memory. The live document
//! sits behind an [`ArcSwap`], so reloads replace it wholesale and readers
//! never observe a partially applied document.
//!
//! ## Ordering
//! - `persist` writes the whole live document, then publishes. A peer can
//!   only observe the notice after the write completed.
//! - Concurrent persists from different instances race at the store; the
//!   last write wins and every instance converges on it.
//! - A reload that started before a `reset` never overwrites the reset.

use crate::document::{
    Document, Lookup, get_path, lookup, merged_document, resolve_fallback, set_path,
};
use crate::error::{SettingsError, SettingsResult};
use crate::registry::SettingsRegistry;
use crate::types::Namespace;
use arc_swap::ArcSwap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, trace};

/// State shared between an instance, its loader task and the registry.
pub(crate) struct InstanceShared {
    namespace: Namespace,
    key: String,
    defaults: Arc<Document>,
    live: ArcSwap<Document>,
    /// Ticket of the last installed load.
    installed: Mutex<u64>,
    loaded: AtomicBool,
    revision: watch::Sender<u64>,
    ready: watch::Sender<Option<SettingsResult<()>>>,
}

impl InstanceShared {
    pub(crate) fn new(namespace: Namespace, defaults: Document) -> Self {
        let key = namespace.key();
        Self {
            namespace,
            key,
            defaults: Arc::new(defaults),
            live: ArcSwap::from_pointee(Document::new()),
            installed: Mutex::new(0),
            loaded: AtomicBool::new(false),
            revision: watch::Sender::new(0),
            ready: watch::Sender::new(None),
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    /// Install a document unless a newer load already landed.
    pub(crate) fn install(&self, ticket: u64, document: Arc<Document>) -> bool {
        {
            let mut last = self
                .installed
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if ticket <= *last {
                trace!(namespace = %self.key, ticket, last = *last, "Skipping stale load");
                return false;
            }
            *last = ticket;
            self.live.store(document);
        }
        self.loaded.store(true, Ordering::Release);
        self.revision.send_modify(|revision| *revision += 1);
        true
    }

    /// Read the namespace from the store and install it.
    pub(crate) async fn load(&self, registry: &SettingsRegistry) -> SettingsResult<()> {
        let ticket = registry.next_ticket();
        let document = registry
            .store()
            .load_namespace(&self.key)
            .await
            .map_err(|source| SettingsError::Load {
                namespace: self.key.clone(),
                source,
            })?;
        self.install(ticket, Arc::new(document));
        Ok(())
    }

    /// Record the outcome of the initial load. Only the first call counts.
    pub(crate) fn finish_ready(&self, outcome: SettingsResult<()>) {
        self.ready.send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(outcome);
            true
        });
    }
}

/// Settings for one `(plugin_id, version)` namespace in this process.
///
/// Created through [`SettingsRegistry::create`] or
/// [`SettingsRegistry::open`]. Dropping it leaves the registry; nothing is
/// written to storage.
pub struct SettingsInstance {
    shared: Arc<InstanceShared>,
    registry: Arc<SettingsRegistry>,
    member_id: u64,
}

impl SettingsInstance {
    pub(crate) fn new(
        shared: Arc<InstanceShared>,
        registry: Arc<SettingsRegistry>,
        member_id: u64,
    ) -> Self {
        Self {
            shared,
            registry,
            member_id,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.shared.namespace
    }

    /// The defaults this instance falls back to.
    pub fn defaults(&self) -> &Document {
        &self.shared.defaults
    }

    /// Whether a load from the store has been installed.
    pub fn is_loaded(&self) -> bool {
        self.shared.loaded.load(Ordering::Acquire)
    }

    /// Wait for the initial load. Resolves to the same outcome every time.
    pub async fn ready(&self) -> SettingsResult<()> {
        let mut state = self.shared.ready.subscribe();
        match state.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(Ok(())),
            // The sender lives in `shared`, which we hold.
            Err(_) => Ok(()),
        }
    }

    /// Effective value at `path`: live document, then defaults.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.resolve(path, None)
    }

    /// Effective value at `path`, with an inline fallback after the defaults.
    ///
    /// A non-object `fallback` is returned as-is. An object `fallback` is
    /// searched with the full path, then with the part of the path after the
    /// segment where the live lookup stopped.
    pub fn get_or(&self, path: &str, fallback: &Value) -> Option<Value> {
        self.resolve(path, Some(fallback))
    }

    fn resolve(&self, path: &str, fallback: Option<&Value>) -> Option<Value> {
        let live = self.shared.live.load();
        let failed_at = match lookup(&live, path) {
            Lookup::Found(value) => return Some(value.clone()),
            Lookup::Missing { failed_at } => failed_at,
        };
        if let Some(value) = get_path(&self.shared.defaults, path) {
            return Some(value.clone());
        }
        fallback.and_then(|fallback| resolve_fallback(path, failed_at, fallback))
    }

    /// Set a value in memory. Nothing is stored until [`persist`](Self::persist).
    ///
    /// An object set at the empty path replaces the whole live document.
    pub fn set(&self, path: &str, value: impl Into<Value>) {
        let value = value.into();
        if path.is_empty()
            && let Value::Object(document) = value
        {
            self.replace(document);
            return;
        }
        self.shared.live.rcu(|current| {
            let mut next = Document::clone(current);
            set_path(&mut next, path, value.clone());
            next
        });
    }

    /// Replace the whole live document in memory.
    pub fn replace(&self, document: Document) {
        self.shared.live.store(Arc::new(document));
    }

    /// The live document, without defaults.
    pub fn snapshot(&self) -> Arc<Document> {
        self.shared.live.load_full()
    }

    /// The live document merged over the defaults.
    pub fn merged(&self) -> Document {
        merged_document(&self.shared.defaults, &self.shared.live.load())
    }

    /// Receiver whose value increments each time a stored document is installed.
    pub fn reloads(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Write the whole live document and notify every instance of the namespace.
    ///
    /// On a store failure nothing is published and the in-memory document is
    /// kept, so the call can be retried.
    pub async fn persist(&self) -> SettingsResult<()> {
        let key = self.shared.key();
        let document = self.snapshot();
        self.registry
            .store()
            .save_namespace(key, &document)
            .await
            .map_err(|source| SettingsError::Persist {
                namespace: key.to_string(),
                source,
            })?;
        info!(namespace = key, fields = document.len(), "Settings persisted");
        self.publish().await
    }

    /// Delete the stored document, clear the live one, and notify.
    ///
    /// On a store failure neither storage nor memory changes.
    pub async fn reset(&self) -> SettingsResult<()> {
        let key = self.shared.key();
        self.registry
            .store()
            .delete_namespace(key)
            .await
            .map_err(|source| SettingsError::Reset {
                namespace: key.to_string(),
                source,
            })?;
        let ticket = self.registry.next_ticket();
        self.shared.install(ticket, Arc::new(Document::new()));
        info!(namespace = key, "Settings reset");
        self.publish().await
    }

    /// Re-read the stored document now.
    pub async fn reload(&self) -> SettingsResult<()> {
        self.shared.load(&self.registry).await?;
        debug!(namespace = self.shared.key(), "Settings reloaded");
        Ok(())
    }

    async fn publish(&self) -> SettingsResult<()> {
        let key = self.shared.key();
        self.registry
            .publish(key)
            .await
            .map_err(|source| SettingsError::Publish {
                namespace: key.to_string(),
                source,
            })
    }
}

impl std::fmt::Debug for SettingsInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsInstance")
            .field("namespace", &self.shared.key)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl Drop for SettingsInstance {
    fn drop(&mut self) {
        self.registry.release(&self.shared.key, self.member_id);
    }
}
