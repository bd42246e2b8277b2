//! Common test utilities
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crosscloud_payments::api::AppState;
use crosscloud_payments::backends::BackendError;
use crosscloud_payments::config::ReplicationMode;
use crosscloud_payments::domain::{Environment, PaymentRecord};
use crosscloud_payments::handlers::{FundsHandler, MessageHandler, PaymentHandler};
use crosscloud_payments::ledger::{BalanceLedger, InMemoryBalanceStore};
use crosscloud_payments::messaging::{EventPublisher, InMemoryBroker, QueuePublisher};
use crosscloud_payments::payments::{
    DualWritePaymentStore, InMemoryPaymentRepository, PaymentRepository,
};

pub const PAYMENT_CHANNEL: &str = "payment-events";
pub const REPLAY_CHANNEL: &str = "replay-queue";

/// Payment repository that always fails and counts attempts
#[derive(Default)]
pub struct FailingRepository {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl PaymentRepository for FailingRepository {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn save(&self, _record: &PaymentRecord) -> Result<(), BackendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Unavailable("injected store failure".to_string()))
    }
}

/// Payment repository that stores after a delay
pub struct SlowRepository {
    pub inner: InMemoryPaymentRepository,
    pub delay: Duration,
}

#[async_trait]
impl PaymentRepository for SlowRepository {
    fn backend(&self) -> &'static str {
        "slow"
    }

    async fn save(&self, record: &PaymentRecord) -> Result<(), BackendError> {
        tokio::time::sleep(self.delay).await;
        self.inner.save(record).await
    }
}

/// Queue that rejects every publish and counts attempts
#[derive(Default)]
pub struct FailingQueue {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl QueuePublisher for FailingQueue {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn publish(&self, _channel: &str, _payload: &str) -> Result<(), BackendError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Unavailable("injected publish failure".to_string()))
    }
}

/// In-memory wiring of every capability, with handles for assertions
pub struct MemoryHarness {
    pub ledger: BalanceLedger,
    pub primary: InMemoryPaymentRepository,
    pub secondary: InMemoryPaymentRepository,
    pub broker: InMemoryBroker,
    pub payments: PaymentHandler,
    pub messages: MessageHandler,
}

impl MemoryHarness {
    pub fn new(environment: Environment) -> Self {
        let ledger = BalanceLedger::new(Arc::new(InMemoryBalanceStore::new()));
        let primary = InMemoryPaymentRepository::named("primary");
        let secondary = InMemoryPaymentRepository::named("secondary");
        let broker = InMemoryBroker::new();

        let payments = PaymentHandler::new(
            ledger.clone(),
            DualWritePaymentStore::new(
                Some(Arc::new(primary.clone())),
                Some(Arc::new(secondary.clone())),
                ReplicationMode::Inline,
            ),
            EventPublisher::new(Arc::new(broker.clone()), PAYMENT_CHANNEL),
            environment,
        );

        let messages = MessageHandler::new(
            EventPublisher::new(Arc::new(broker.clone()), PAYMENT_CHANNEL),
            environment,
        )
        .with_commit_sha(Some("test-sha".to_string()));

        Self {
            ledger,
            primary,
            secondary,
            broker,
            payments,
            messages,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.payments.clone(),
            FundsHandler::new(self.ledger.clone()),
            self.messages.clone(),
        )
    }
}

/// Connect to `DATABASE_URL` and empty every table
pub async fn setup_test_db() -> PgPool {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::query("TRUNCATE TABLE user_balances, payments, queue_messages")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB; have the migrations been applied?");

    pool
}
