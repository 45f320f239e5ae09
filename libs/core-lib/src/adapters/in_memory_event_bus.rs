use crate::{CoreError, EventPublisher};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast::{self, Sender};
use tracing::debug;

/// Represents a message published on the in-memory bus.
#[derive(Clone, Debug)]
pub struct InMemoryMessage {
    pub topic: String,
    pub event_type: String,
    pub payload: Vec<u8>,
}

/// In-memory implementation of the EventPublisher port using Tokio broadcast channels.
/// Used when no Redis is configured and in tests.
///
/// A receiver that lags behind may miss messages; archival announcements are
/// best effort either way.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    // Topic -> sender; receivers are created on demand.
    channels: Arc<DashMap<String, Sender<InMemoryMessage>>>,
    channel_capacity: usize,
}

impl InMemoryEventBus {
    /// Creates a new InMemoryEventBus with a specific capacity for broadcast channels.
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            channel_capacity,
        }
    }

    /// Gets or creates a broadcast sender for a given topic.
    fn get_or_create_sender(&self, topic: &str) -> Sender<InMemoryMessage> {
        self.channels
            .entry(topic.to_string())
            .or_insert_with(|| {
                let (sender, _) = broadcast::channel(self.channel_capacity);
                sender
            })
            .value()
            .clone()
    }

    /// Receiver for messages published on `topic` from now on.
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<InMemoryMessage> {
        self.get_or_create_sender(topic).subscribe()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(
        &self,
        topic: &str,
        event_type: &str,
        event_payload: &[u8],
    ) -> Result<(), CoreError> {
        let sender = self.get_or_create_sender(topic);
        let message = InMemoryMessage {
            topic: topic.to_string(),
            event_type: event_type.to_string(),
            payload: event_payload.to_vec(),
        };

        // Err only means nobody is listening right now.
        if sender.send(message).is_err() {
            debug!(topic = %topic, "Published with no active subscribers");
        }
        Ok(())
    }
}
