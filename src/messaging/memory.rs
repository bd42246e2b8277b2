//! In-memory queue broker
//!
//! Channels are FIFO queues with explicit acknowledgement: a received message
//! is leased and leaves the channel only when acked. A message whose lease
//! expires unacked goes back to the front of the queue on the next receive.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::backends::BackendError;

use super::{Acknowledger, Delivery, QueuePublisher, QueueSubscriber};

/// Lease used by `InMemoryBroker::new`
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

/// Recent payloads kept per channel for inspection
pub const PUBLISHED_HISTORY: usize = 1024;

#[derive(Debug, Clone)]
struct StoredMessage {
    id: Uuid,
    payload: String,
    attempts: u32,
}

#[derive(Debug)]
struct Lease {
    message: StoredMessage,
    until: Instant,
}

#[derive(Debug, Default)]
struct ChannelState {
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<Uuid, Lease>,
    published: VecDeque<String>,
    acked: usize,
}

impl ChannelState {
    /// Return expired leases to the queue, oldest delivery first.
    fn expire_leases(&mut self, now: Instant) {
        let mut expired: Vec<Uuid> = self
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.until <= now)
            .map(|(id, _)| *id)
            .collect();
        if expired.is_empty() {
            return;
        }
        expired.sort_by_key(|id| self.in_flight[id].until);

        for id in expired.into_iter().rev() {
            if let Some(lease) = self.in_flight.remove(&id) {
                tracing::debug!(message_id = %id, "Lease expired; message requeued");
                self.pending.push_front(lease.message);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    channels: Arc<Mutex<HashMap<String, ChannelState>>>,
    lease: Duration,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_lease(DEFAULT_LEASE)
    }

    /// Broker whose unacked messages become visible again after `lease`
    pub fn with_lease(lease: Duration) -> Self {
        Self {
            channels: Arc::default(),
            lease,
        }
    }

    fn with_channel<R>(&self, channel: &str, f: impl FnOnce(&mut ChannelState) -> R) -> R {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        f(channels.entry(channel.to_string()).or_default())
    }

    /// The most recent payloads published to `channel`, oldest first
    pub fn published(&self, channel: &str) -> Vec<String> {
        self.with_channel(channel, |c| c.published.iter().cloned().collect())
    }

    pub fn pending_count(&self, channel: &str) -> usize {
        self.with_channel(channel, |c| c.pending.len())
    }

    pub fn in_flight_count(&self, channel: &str) -> usize {
        self.with_channel(channel, |c| c.in_flight.len())
    }

    pub fn acked_count(&self, channel: &str) -> usize {
        self.with_channel(channel, |c| c.acked)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueuePublisher for InMemoryBroker {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BackendError> {
        self.with_channel(channel, |c| {
            if c.published.len() == PUBLISHED_HISTORY {
                c.published.pop_front();
            }
            c.published.push_back(payload.to_string());
            c.pending.push_back(StoredMessage {
                id: Uuid::new_v4(),
                payload: payload.to_string(),
                attempts: 0,
            });
        });
        Ok(())
    }
}

#[async_trait]
impl QueueSubscriber for InMemoryBroker {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn receive(&self, channel: &str) -> Result<Option<Delivery>, BackendError> {
        let lease = self.lease;
        let message = self.with_channel(channel, |c| {
            let now = Instant::now();
            c.expire_leases(now);

            let mut message = c.pending.pop_front()?;
            message.attempts += 1;
            c.in_flight.insert(
                message.id,
                Lease {
                    message: message.clone(),
                    until: now + lease,
                },
            );
            Some(message)
        });

        Ok(message.map(|m| {
            Delivery::new(
                m.id,
                channel,
                m.payload,
                m.attempts,
                Arc::new(self.clone()),
            )
        }))
    }
}

#[async_trait]
impl Acknowledger for InMemoryBroker {
    async fn ack(&self, channel: &str, message_id: Uuid) -> Result<(), BackendError> {
        self.with_channel(channel, |c| match c.in_flight.remove(&message_id) {
            Some(_) => {
                c.acked += 1;
                Ok(())
            }
            None => Err(BackendError::InvalidData(format!(
                "message {} is not in flight on '{}'",
                message_id, channel
            ))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_with_explicit_ack() {
        let broker = InMemoryBroker::new();
        broker.publish("q", "first").await.unwrap();
        broker.publish("q", "second").await.unwrap();

        let first = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(first.payload, "first");
        assert_eq!(first.attempt, 1);
        assert_eq!(broker.in_flight_count("q"), 1);
        assert_eq!(broker.pending_count("q"), 1);

        first.ack().await.unwrap();
        assert_eq!(broker.in_flight_count("q"), 0);
        assert_eq!(broker.acked_count("q"), 1);

        let second = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(second.payload, "second");
    }

    #[tokio::test]
    async fn test_empty_channel() {
        let broker = InMemoryBroker::new();
        assert!(broker.receive("q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unacked_message_is_redelivered_after_lease() {
        let broker = InMemoryBroker::with_lease(Duration::from_millis(50));
        broker.publish("q", "payload").await.unwrap();
        broker.publish("q", "next").await.unwrap();

        let delivery = broker.receive("q").await.unwrap().unwrap();
        drop(delivery);

        // still leased
        let next = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(next.payload, "next");
        next.ack().await.unwrap();
        assert!(broker.receive("q").await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(80)).await;
        let again = broker.receive("q").await.unwrap().unwrap();
        assert_eq!(again.payload, "payload");
        assert_eq!(again.attempt, 2);
        assert_eq!(broker.in_flight_count("q"), 1);
    }

    #[tokio::test]
    async fn test_ack_after_lease_expiry_is_rejected() {
        let broker = InMemoryBroker::with_lease(Duration::from_millis(20));
        broker.publish("q", "payload").await.unwrap();

        let first = broker.receive("q").await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = broker.receive("q").await.unwrap().unwrap();

        // the stale delivery shares the id but the lease moved on
        assert_eq!(first.message_id, second.message_id);
        second.ack().await.unwrap();
        assert!(first.ack().await.is_err());
        assert_eq!(broker.acked_count("q"), 1);
    }

    #[tokio::test]
    async fn test_published_history_is_capped() {
        let broker = InMemoryBroker::new();
        for i in 0..PUBLISHED_HISTORY + 5 {
            broker.publish("q", &i.to_string()).await.unwrap();
        }

        let published = broker.published("q");
        assert_eq!(published.len(), PUBLISHED_HISTORY);
        assert_eq!(published[0], "5");
        assert_eq!(broker.pending_count("q"), PUBLISHED_HISTORY + 5);
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let broker = InMemoryBroker::new();
        broker.publish("a", "x").await.unwrap();
        assert!(broker.receive("b").await.unwrap().is_none());
        assert_eq!(broker.published("a").len(), 1);
    }
}
