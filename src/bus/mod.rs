//! Change-notification transport.
//!
//! Topics are namespace keys. Payloads are [`ChangeNotice`]s, which only say
//! that a namespace changed; subscribers re-read the store to learn how.
//!
//! Delivery is assumed at-least-once with no ordering across publishers.
//! Dropping a [`Subscription`] unsubscribes.

mod local;

pub use local::{DEFAULT_CAPACITY, LocalBus};

use crate::error::BusError;
use crate::types::ChangeNotice;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

/// Topic-based broadcast contract consumed by the settings layer.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Publish a notice to every current subscriber of `topic`.
    async fn publish(&self, topic: &str, notice: ChangeNotice) -> Result<(), BusError>;

    /// Start receiving notices published to `topic`.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError>;
}

/// A live subscription to one topic.
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<ChangeNotice>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, receiver: broadcast::Receiver<ChangeNotice>) -> Self {
        Self {
            topic: topic.into(),
            receiver,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next notice. Returns `None` once the topic is closed.
    ///
    /// If the receiver fell behind, the dropped notices are folded into one
    /// synthetic notice: they were all invalidations of the same namespace.
    pub async fn recv(&mut self) -> Option<ChangeNotice> {
        match self.receiver.recv().await {
            Ok(notice) => Some(notice),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(topic = %self.topic, skipped, "Subscription lagged, coalescing notices");
                Some(ChangeNotice::new(self.topic.clone(), "lagged"))
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}
