//! Event Publisher
//!
//! Fire-and-forget publish of a serialized event to one fixed channel on the
//! deployment's active queue backend.

use std::sync::Arc;

use super::{MessagingError, QueuePublisher};

#[derive(Clone)]
pub struct EventPublisher {
    queue: Arc<dyn QueuePublisher>,
    channel: String,
}

impl EventPublisher {
    pub fn new(queue: Arc<dyn QueuePublisher>, channel: impl Into<String>) -> Self {
        Self {
            queue,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn backend(&self) -> &'static str {
        self.queue.backend()
    }

    /// Publish `payload` unchanged. Failures surface as `PublishFailed`;
    /// whether that is fatal is the caller's decision.
    pub async fn publish(&self, payload: &str) -> Result<(), MessagingError> {
        tracing::info!(
            backend = self.queue.backend(),
            channel = %self.channel,
            bytes = payload.len(),
            "Publishing event"
        );

        self.queue
            .publish(&self.channel, payload)
            .await
            .map_err(|e| MessagingError::PublishFailed {
                channel: self.channel.clone(),
                reason: e.to_string(),
            })
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("backend", &self.queue.backend())
            .field("channel", &self.channel)
            .finish()
    }
}
