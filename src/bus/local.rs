//! In-process notification bus built on tokio broadcast channels.

use super::{NotificationBus, Subscription};
use crate::error::BusError;
use crate::types::ChangeNotice;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

/// Default number of notices buffered per topic.
pub const DEFAULT_CAPACITY: usize = 64;

/// Notification bus for subscribers living in the same process.
///
/// One broadcast channel per topic, created on first subscribe. Publishing to
/// a topic nobody listens on succeeds and delivers nothing.
pub struct LocalBus {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<ChangeNotice>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let topics = self.topics.lock().unwrap_or_else(|p| p.into_inner());
        topics.get(topic).map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationBus for LocalBus {
    async fn publish(&self, topic: &str, notice: ChangeNotice) -> Result<(), BusError> {
        let mut topics = self.topics.lock().unwrap_or_else(|p| p.into_inner());
        let Some(sender) = topics.get(topic) else {
            trace!(topic, "Publish with no subscribers");
            return Ok(());
        };
        if sender.send(notice).is_err() {
            // Every receiver is gone; forget the channel.
            topics.remove(topic);
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let mut topics = self.topics.lock().unwrap_or_else(|p| p.into_inner());
        let receiver = match topics.get(topic) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = broadcast::channel(self.capacity);
                topics.insert(topic.to_string(), sender);
                receiver
            }
        };
        Ok(Subscription::new(topic, receiver))
    }
}
