//! Event Relay
//!
//! Consumes events from the active environment's queue and forwards an
//! identical copy to the peer environment's replay channel.
//!
//! Per message: `Received -> Replayed -> Acknowledged`, or
//! `Received -> ReplayFailed (logged) -> Acknowledged`. The inbound message is
//! acknowledged whatever happens to the replay leg, so a broken peer never
//! causes redelivery of the original.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::domain::EnvelopeHeader;
use crate::messaging::{Delivery, EventPublisher, Subscription};

/// Default number of messages relayed concurrently
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Copy accepted by the replay channel
    Replayed,
    /// Replay publish failed; logged and dropped
    ReplayFailed,
    /// No replay target in this deployment
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayReport {
    pub outcome: RelayOutcome,
    pub acknowledged: bool,
}

pub struct EventRelay {
    replay: Option<EventPublisher>,
    max_in_flight: usize,
}

impl EventRelay {
    /// `replay` is `None` when the peer queue is not provisioned here; every
    /// message is then acknowledged without forwarding.
    pub fn new(replay: Option<EventPublisher>) -> Self {
        Self::with_max_in_flight(replay, DEFAULT_MAX_IN_FLIGHT)
    }

    pub fn with_max_in_flight(replay: Option<EventPublisher>, max_in_flight: usize) -> Self {
        if replay.is_none() {
            tracing::warn!("No replay queue configured; relayed events will not be forwarded");
        }
        Self {
            replay,
            max_in_flight: max_in_flight.max(1),
        }
    }

    /// Relay a single delivery and acknowledge it.
    pub async fn handle(&self, delivery: Delivery) -> RelayReport {
        let header = EnvelopeHeader::peek(&delivery.payload);
        let event_id = header
            .as_ref()
            .map(|h| h.event_id.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        tracing::info!(
            event_id = %event_id,
            message_id = %delivery.message_id,
            channel = %delivery.channel,
            attempt = delivery.attempt,
            source = header.as_ref().and_then(|h| h.source.as_deref()).unwrap_or("unknown"),
            "Received event"
        );

        let outcome = match &self.replay {
            None => {
                tracing::warn!(event_id = %event_id, "Replay skipped: no replay queue available");
                RelayOutcome::Skipped
            }
            Some(replay) => match replay.publish(&delivery.payload).await {
                Ok(()) => {
                    tracing::info!(
                        event_id = %event_id,
                        channel = replay.channel(),
                        backend = replay.backend(),
                        "Event replayed"
                    );
                    RelayOutcome::Replayed
                }
                Err(e) => {
                    tracing::error!(event_id = %event_id, error = %e, "Replay failed");
                    RelayOutcome::ReplayFailed
                }
            },
        };

        let acknowledged = match delivery.ack().await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "Acknowledgement failed");
                false
            }
        };

        RelayReport {
            outcome,
            acknowledged,
        }
    }

    /// Start relaying `subscription` in the background.
    pub fn start(self: Arc<Self>, subscription: Subscription) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(subscription))
    }

    /// Consume forever, one task per message, at most `max_in_flight` at once.
    pub async fn run(self: Arc<Self>, mut subscription: Subscription) {
        tracing::info!(
            channel = subscription.channel(),
            backend = subscription.backend(),
            replay = self.replay.as_ref().map(|r| r.channel()).unwrap_or("disabled"),
            max_in_flight = self.max_in_flight,
            "Event relay started"
        );

        let permits = Arc::new(Semaphore::new(self.max_in_flight));

        loop {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let delivery = subscription.next().await;
            let relay = Arc::clone(&self);

            tokio::spawn(async move {
                relay.handle(delivery).await;
                drop(permit);
            });
        }

        tracing::info!("Event relay stopped");
    }
}
