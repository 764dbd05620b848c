//! In-process settings store.

use super::SettingsStore;
use crate::document::Document;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Settings store backed by a process-local map.
///
/// Shared between registries (wrapped in an `Arc`) it stands in for a real
/// backend in tests that simulate several processes.
#[derive(Default)]
pub struct MemoryStore {
    namespaces: Mutex<HashMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_map<T>(&self, f: impl FnOnce(&mut HashMap<String, Document>) -> T) -> T {
        let mut map = self
            .namespaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut map)
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn load_namespace(&self, key: &str) -> Result<Document, StoreError> {
        Ok(self.with_map(|map| map.get(key).cloned().unwrap_or_default()))
    }

    async fn save_namespace(&self, key: &str, document: &Document) -> Result<(), StoreError> {
        self.with_map(|map| {
            if document.is_empty() {
                map.remove(key);
            } else {
                map.insert(key.to_string(), document.clone());
            }
        });
        Ok(())
    }

    async fn delete_namespace(&self, key: &str) -> Result<(), StoreError> {
        self.with_map(|map| map.remove(key));
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = self.with_map(|map| map.keys().cloned().collect::<Vec<_>>());
        keys.sort();
        Ok(keys)
    }
}
