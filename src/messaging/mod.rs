//! Messaging
//!
//! Queue capabilities shared by every backend. Delivery is at-least-once:
//! a received message stays reserved until acknowledged and is redelivered
//! if the consumer never acks it.

mod error;
mod memory;
mod postgres;
mod publisher;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::backends::BackendError;

pub use error::MessagingError;
pub use memory::InMemoryBroker;
pub use postgres::PgQueue;
pub use publisher::EventPublisher;

/// Backoff ceiling for repeated receive failures, as a power of two
const MAX_BACKOFF_EXPONENT: u32 = 6;

#[async_trait]
pub trait QueuePublisher: Send + Sync {
    fn backend(&self) -> &'static str;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BackendError>;
}

#[async_trait]
pub trait QueueSubscriber: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Reserve the next message on `channel`, if any.
    async fn receive(&self, channel: &str) -> Result<Option<Delivery>, BackendError>;
}

/// Removes a reserved message from its queue
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, channel: &str, message_id: Uuid) -> Result<(), BackendError>;
}

/// A reserved message, owned by one consumer until acknowledged
pub struct Delivery {
    pub message_id: Uuid,
    pub channel: String,
    pub payload: String,
    /// Delivery count including this one
    pub attempt: u32,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        message_id: Uuid,
        channel: impl Into<String>,
        payload: impl Into<String>,
        attempt: u32,
        acker: Arc<dyn Acknowledger>,
    ) -> Self {
        Self {
            message_id,
            channel: channel.into(),
            payload: payload.into(),
            attempt,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), MessagingError> {
        self.acker
            .ack(&self.channel, self.message_id)
            .await
            .map_err(|source| MessagingError::AckFailed {
                message_id: self.message_id,
                source,
            })
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.message_id)
            .field("channel", &self.channel)
            .field("attempt", &self.attempt)
            .field("bytes", &self.payload.len())
            .finish()
    }
}

/// Long-lived pull subscription on one channel
pub struct Subscription {
    subscriber: Arc<dyn QueueSubscriber>,
    channel: String,
    poll_interval: Duration,
}

impl Subscription {
    pub fn new(
        subscriber: Arc<dyn QueueSubscriber>,
        channel: impl Into<String>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            subscriber,
            channel: channel.into(),
            poll_interval,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn backend(&self) -> &'static str {
        self.subscriber.backend()
    }

    /// Wait for the next message. Receive errors are logged and retried with
    /// exponential backoff; they never end the subscription.
    pub async fn next(&mut self) -> Delivery {
        let mut failures: u32 = 0;

        loop {
            match self.subscriber.receive(&self.channel).await {
                Ok(Some(delivery)) => return delivery,
                Ok(None) => {
                    failures = 0;
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let delay = self
                        .poll_interval
                        .saturating_mul(1 << failures.min(MAX_BACKOFF_EXPONENT));
                    tracing::error!(
                        channel = %self.channel,
                        backend = self.subscriber.backend(),
                        error = %e,
                        failures,
                        delay_ms = delay.as_millis() as u64,
                        "Queue receive failed"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` receives, then delegates to a broker
    struct FlakySubscriber {
        broker: InMemoryBroker,
        remaining_failures: AtomicU32,
    }

    #[async_trait]
    impl QueueSubscriber for FlakySubscriber {
        fn backend(&self) -> &'static str {
            "flaky"
        }

        async fn receive(&self, channel: &str) -> Result<Option<Delivery>, BackendError> {
            let remaining = self.remaining_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(BackendError::Unavailable("network blip".to_string()));
            }
            self.broker.receive(channel).await
        }
    }

    #[tokio::test]
    async fn test_subscription_waits_for_message() {
        let broker = InMemoryBroker::new();
        let mut subscription = Subscription::new(
            Arc::new(broker.clone()),
            "payment-events",
            Duration::from_millis(5),
        );

        let publisher = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            publisher.publish("payment-events", "hello").await.unwrap();
        });

        let delivery = subscription.next().await;
        assert_eq!(delivery.payload, "hello");
        assert_eq!(delivery.channel, "payment-events");
    }

    #[tokio::test]
    async fn test_subscription_survives_receive_errors() {
        let broker = InMemoryBroker::new();
        broker.publish("payment-events", "after-errors").await.unwrap();

        let subscriber = FlakySubscriber {
            broker,
            remaining_failures: AtomicU32::new(2),
        };
        let mut subscription =
            Subscription::new(Arc::new(subscriber), "payment-events", Duration::from_millis(1));

        let delivery = subscription.next().await;
        assert_eq!(delivery.payload, "after-errors");
    }
}
