//! Error types for settings operations and their collaborators.

use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling and structured logs.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    LoadFailure,
    PersistFailure,
    ResetFailure,
    PublishFailure,
    SubscribeFailure,
    NotificationHandlingFailure,
}

/// Failure reported by a [`SettingsStore`](crate::store::SettingsStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("corrupt field {field} in {namespace}: {reason}")]
    Corrupt {
        namespace: String,
        field: String,
        reason: String,
    },
    #[error("storage task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::backend(err)
    }
}

/// Failure reported by a [`NotificationBus`](crate::bus::NotificationBus).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("bus is closed")]
    Closed,
    #[error("bus transport error: {0}")]
    Transport(String),
}

/// Errors surfaced to callers of settings operations.
///
/// Every variant names the namespace key it concerns. Errors are `Clone` so
/// the outcome of an initial load can be handed to any number of waiters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("failed to load settings for {namespace}: {source}")]
    Load {
        namespace: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to persist settings for {namespace}: {source}")]
    Persist {
        namespace: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to reset settings for {namespace}: {source}")]
    Reset {
        namespace: String,
        #[source]
        source: StoreError,
    },
    #[error("failed to publish change for {namespace}: {source}")]
    Publish {
        namespace: String,
        #[source]
        source: BusError,
    },
    #[error("failed to subscribe to changes for {namespace}: {source}")]
    Subscribe {
        namespace: String,
        #[source]
        source: BusError,
    },
}

impl SettingsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SettingsError::Load { .. } => ErrorCode::LoadFailure,
            SettingsError::Persist { .. } => ErrorCode::PersistFailure,
            SettingsError::Reset { .. } => ErrorCode::ResetFailure,
            SettingsError::Publish { .. } => ErrorCode::PublishFailure,
            SettingsError::Subscribe { .. } => ErrorCode::SubscribeFailure,
        }
    }

    /// Namespace key the error concerns.
    pub fn namespace(&self) -> &str {
        match self {
            SettingsError::Load { namespace, .. }
            | SettingsError::Persist { namespace, .. }
            | SettingsError::Reset { namespace, .. }
            | SettingsError::Publish { namespace, .. }
            | SettingsError::Subscribe { namespace, .. } => namespace,
        }
    }
}

/// Result type for settings operations.
pub type SettingsResult<T> = std::result::Result<T, SettingsError>;
