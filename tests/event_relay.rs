//! Event relay end to end: workflow publishes, relay forwards to the peer

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crosscloud_payments::domain::{Amount, Environment, OperationContext};
use crosscloud_payments::handlers::PaymentCommand;
use crosscloud_payments::messaging::{
    EventPublisher, InMemoryBroker, QueueSubscriber, Subscription,
};
use crosscloud_payments::relay::{EventRelay, RelayOutcome};

mod common;

use common::{FailingQueue, MemoryHarness, PAYMENT_CHANNEL, REPLAY_CHANNEL};

async fn pay_once(h: &MemoryHarness) -> String {
    h.ledger
        .add_balance("alice", &Amount::from_integer(100).unwrap())
        .await
        .unwrap();
    h.payments
        .execute(
            PaymentCommand::new("40", "EUR", "bob"),
            &OperationContext::new().with_request_user("alice"),
        )
        .await
        .unwrap()
        .body
}

#[tokio::test]
async fn test_payment_event_replayed_to_peer() {
    let h = MemoryHarness::new(Environment::Aws);
    let peer = InMemoryBroker::new();
    let relay = EventRelay::new(Some(EventPublisher::new(Arc::new(peer.clone()), REPLAY_CHANNEL)));

    let body = pay_once(&h).await;

    let delivery = h.broker.receive(PAYMENT_CHANNEL).await.unwrap().unwrap();
    let report = relay.handle(delivery).await;

    assert_eq!(report.outcome, RelayOutcome::Replayed);
    assert!(report.acknowledged);
    assert_eq!(peer.published(REPLAY_CHANNEL), vec![body]);
    assert!(peer.published(PAYMENT_CHANNEL).is_empty());
    assert_eq!(h.broker.pending_count(PAYMENT_CHANNEL), 0);
    assert_eq!(h.broker.in_flight_count(PAYMENT_CHANNEL), 0);
}

#[tokio::test]
async fn test_inbound_acked_when_replay_fails() {
    let h = MemoryHarness::new(Environment::Gcp);
    let failing = Arc::new(FailingQueue::default());
    let relay = EventRelay::new(Some(EventPublisher::new(failing.clone(), REPLAY_CHANNEL)));

    pay_once(&h).await;

    let delivery = h.broker.receive(PAYMENT_CHANNEL).await.unwrap().unwrap();
    let report = relay.handle(delivery).await;

    assert_eq!(report.outcome, RelayOutcome::ReplayFailed);
    assert!(report.acknowledged);
    assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
    assert_eq!(h.broker.acked_count(PAYMENT_CHANNEL), 1);

    // nothing left to redeliver
    assert_eq!(h.broker.in_flight_count(PAYMENT_CHANNEL), 0);
    assert!(h.broker.receive(PAYMENT_CHANNEL).await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_replay_queue_is_a_no_op() {
    let h = MemoryHarness::new(Environment::Local);
    let relay = EventRelay::new(None);

    pay_once(&h).await;

    let delivery = h.broker.receive(PAYMENT_CHANNEL).await.unwrap().unwrap();
    let report = relay.handle(delivery).await;

    assert_eq!(report.outcome, RelayOutcome::Skipped);
    assert!(report.acknowledged);
    assert_eq!(h.broker.acked_count(PAYMENT_CHANNEL), 1);
}

#[tokio::test]
async fn test_background_relay_forwards_every_payment() {
    let h = MemoryHarness::new(Environment::Aws);
    let peer = InMemoryBroker::new();
    let relay = Arc::new(EventRelay::with_max_in_flight(
        Some(EventPublisher::new(Arc::new(peer.clone()), REPLAY_CHANNEL)),
        4,
    ));
    let handle = relay.start(Subscription::new(
        Arc::new(h.broker.clone()),
        PAYMENT_CHANNEL,
        Duration::from_millis(5),
    ));

    h.ledger
        .add_balance("alice", &Amount::from_integer(100).unwrap())
        .await
        .unwrap();
    let context = OperationContext::new().with_request_user("alice");
    for _ in 0..5 {
        h.payments
            .execute(PaymentCommand::new("1", "EUR", "bob"), &context)
            .await
            .unwrap();
    }

    for _ in 0..200 {
        if peer.published(REPLAY_CHANNEL).len() == 5 && h.broker.acked_count(PAYMENT_CHANNEL) == 5 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    handle.abort();

    let mut replayed = peer.published(REPLAY_CHANNEL);
    let mut original = h.broker.published(PAYMENT_CHANNEL);
    replayed.sort();
    original.sort();
    assert_eq!(replayed, original);
    assert_eq!(h.broker.acked_count(PAYMENT_CHANNEL), 5);
}
