//! Core data types shared by the store, bus and settings instances.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one settings document: a plugin and its schema version.
///
/// The key `"{plugin_id}:{version}"` is both the storage key and the name of
/// the change-notification topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    pub plugin_id: String,
    pub version: String,
}

impl Namespace {
    pub fn new(plugin_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            version: version.into(),
        }
    }

    /// Storage key and topic name.
    pub fn key(&self) -> String {
        format!("{}:{}", self.plugin_id, self.version)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.plugin_id, self.version)
    }
}

/// Invalidation notice published after a namespace is persisted or reset.
///
/// Carries no settings data: receivers must re-read the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    /// Namespace key that changed.
    pub namespace: String,
    /// Id of the registry that published the notice.
    pub origin: String,
    /// Publish time in milliseconds since the Unix epoch.
    pub published_at: i64,
}

impl ChangeNotice {
    pub fn new(namespace: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            origin: origin.into(),
            published_at: now_ms(),
        }
    }
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
