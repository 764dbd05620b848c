//! Durable storage for settings documents.
//!
//! A store is a hash map keyed by `(namespace, field)`: each top-level key of
//! a document is one field. The settings layer only ever reads or writes a
//! namespace as a whole document, so saves are full overwrites.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::document::Document;
use crate::error::StoreError;
use async_trait::async_trait;

/// Persistence contract consumed by the settings layer.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load every field of a namespace. Never-written namespaces are empty.
    async fn load_namespace(&self, key: &str) -> Result<Document, StoreError>;

    /// Replace every field of a namespace with the document's top-level keys.
    async fn save_namespace(&self, key: &str, document: &Document) -> Result<(), StoreError>;

    /// Remove every field of a namespace.
    async fn delete_namespace(&self, key: &str) -> Result<(), StoreError>;

    /// Keys of all namespaces holding at least one field.
    async fn list_namespaces(&self) -> Result<Vec<String>, StoreError>;
}
