//! Namespaced plugin settings kept in sync across instances.
//!
//! Each `(plugin_id, version)` namespace holds one nested document in a
//! durable [`store`]. A [`SettingsInstance`] caches that document in memory,
//! answers reads from it with fallback to caller-supplied defaults, and
//! reloads it whenever a change notice for its namespace arrives on the
//! [`bus`]. Notices carry no data, so the store stays the single source of
//! truth.
//!
//! ```no_run
//! use serde_json::json;
//! use settings_sync::{SettingsRegistry, document::document_from_value};
//! use settings_sync::{bus::LocalBus, store::MemoryStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), settings_sync::SettingsError> {
//! let registry = SettingsRegistry::new(Arc::new(MemoryStore::new()), Arc::new(LocalBus::new()));
//! let defaults = document_from_value(json!({"foo": 1, "bar": {"derp": 2}}));
//! let settings = registry.open("my-plugin", "1.0", defaults).await?;
//!
//! settings.set("bar.derp", 5);
//! settings.persist().await?;
//! assert_eq!(settings.get("bar.derp"), Some(json!(5)));
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod instance;
pub mod logging;
pub mod registry;
pub mod store;
pub mod types;

pub use error::{ErrorCode, SettingsError, SettingsResult};
pub use instance::SettingsInstance;
pub use registry::SettingsRegistry;
