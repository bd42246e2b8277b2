//! Backends
//!
//! Resolves every capability (balance store, payment stores, queues) to a
//! concrete variant once, at process start. Nothing below this layer looks
//! at configuration again.

mod error;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::config::{BackendUrl, Config};
use crate::db;
use crate::ledger::{BalanceLedger, BalanceStore, InMemoryBalanceStore, PgBalanceStore};
use crate::messaging::{
    EventPublisher, InMemoryBroker, PgQueue, QueuePublisher, QueueSubscriber, Subscription,
};
use crate::payments::{
    DualWritePaymentStore, InMemoryPaymentRepository, PaymentRepository, PgPaymentRepository,
};

pub use error::BackendError;

/// Resolved capability variants for one process
#[derive(Clone)]
pub struct Backends {
    pub balance_store: Arc<dyn BalanceStore>,
    pub primary_store: Option<Arc<dyn PaymentRepository>>,
    pub secondary_store: Option<Arc<dyn PaymentRepository>>,
    pub queue_publisher: Arc<dyn QueuePublisher>,
    pub queue_subscriber: Arc<dyn QueueSubscriber>,
    /// Peer environment's queue; absent when not provisioned here
    pub replay_publisher: Option<Arc<dyn QueuePublisher>>,
    pools: Vec<PgPool>,
}

impl Backends {
    /// Connect whatever `config` names. Each distinct database URL gets one
    /// pool, shared by every capability pointing at it.
    pub async fn from_config(config: &Config) -> Result<Self, BackendError> {
        let mut pools = Pools::new(config.database_max_connections);

        let balance_store: Arc<dyn BalanceStore> = match &config.balance_store {
            BackendUrl::Memory => Arc::new(InMemoryBalanceStore::new()),
            BackendUrl::Postgres(url) => {
                Arc::new(PgBalanceStore::new(pools.get(url, db::BALANCE_TABLE).await?))
            }
        };

        let primary_store = match &config.primary_store {
            None => None,
            Some(url) => Some(payment_repository(url, StoreRole::Primary, &mut pools).await?),
        };
        let secondary_store = match &config.secondary_store {
            None => None,
            Some(url) => Some(payment_repository(url, StoreRole::Secondary, &mut pools).await?),
        };

        let (queue_publisher, queue_subscriber): (Arc<dyn QueuePublisher>, Arc<dyn QueueSubscriber>) =
            match &config.queue {
                BackendUrl::Memory => {
                    let broker = InMemoryBroker::with_lease(config.queue_lease);
                    (Arc::new(broker.clone()), Arc::new(broker))
                }
                BackendUrl::Postgres(url) => {
                    let queue = PgQueue::new(pools.get(url, db::QUEUE_TABLE).await?, config.queue_lease);
                    (Arc::new(queue.clone()), Arc::new(queue))
                }
            };

        let replay_publisher: Option<Arc<dyn QueuePublisher>> = match &config.replay_queue {
            None => None,
            Some(BackendUrl::Memory) => {
                return Err(BackendError::Unavailable(
                    "replay queue must be the peer environment's queue, not in-memory".to_string(),
                ))
            }
            Some(BackendUrl::Postgres(url)) => Some(Arc::new(PgQueue::new(
                pools.get(url, db::QUEUE_TABLE).await?,
                config.queue_lease,
            ))),
        };

        tracing::info!(
            environment = %config.environment,
            balance_store = balance_store.backend(),
            primary_store = primary_store.as_ref().map(|s| s.backend()).unwrap_or("none"),
            secondary_store = secondary_store.as_ref().map(|s| s.backend()).unwrap_or("none"),
            queue = queue_publisher.backend(),
            replay_queue = replay_publisher.as_ref().map(|q| q.backend()).unwrap_or("none"),
            "Backends resolved"
        );

        Ok(Self {
            balance_store,
            primary_store,
            secondary_store,
            queue_publisher,
            queue_subscriber,
            replay_publisher,
            pools: pools.into_vec(),
        })
    }

    /// Everything in memory, no secondary store, no replay queue.
    pub fn in_memory() -> Self {
        let broker = InMemoryBroker::new();
        Self {
            balance_store: Arc::new(InMemoryBalanceStore::new()),
            primary_store: Some(Arc::new(InMemoryPaymentRepository::named("memory-primary"))),
            secondary_store: None,
            queue_publisher: Arc::new(broker.clone()),
            queue_subscriber: Arc::new(broker),
            replay_publisher: None,
            pools: Vec::new(),
        }
    }

    pub fn ledger(&self, config: &Config) -> BalanceLedger {
        BalanceLedger::with_max_retries(Arc::clone(&self.balance_store), config.ledger_max_retries)
    }

    pub fn payment_store(&self, config: &Config) -> DualWritePaymentStore {
        DualWritePaymentStore::new(
            self.primary_store.clone(),
            self.secondary_store.clone(),
            config.replication_mode,
        )
    }

    pub fn payment_publisher(&self, config: &Config) -> EventPublisher {
        EventPublisher::new(Arc::clone(&self.queue_publisher), config.payment_channel.clone())
    }

    pub fn replay_publisher(&self, config: &Config) -> Option<EventPublisher> {
        self.replay_publisher
            .as_ref()
            .map(|q| EventPublisher::new(Arc::clone(q), config.replay_channel.clone()))
    }

    /// Subscription on the active queue's payment channel
    pub fn payment_subscription(&self, config: &Config) -> Subscription {
        Subscription::new(
            Arc::clone(&self.queue_subscriber),
            config.payment_channel.clone(),
            config.queue_poll_interval,
        )
    }

    /// Close every database pool
    pub async fn close(&self) {
        for pool in &self.pools {
            pool.close().await;
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StoreRole {
    Primary,
    Secondary,
}

async fn payment_repository(
    url: &BackendUrl,
    role: StoreRole,
    pools: &mut Pools,
) -> Result<Arc<dyn PaymentRepository>, BackendError> {
    Ok(match (url, role) {
        (BackendUrl::Memory, StoreRole::Primary) => {
            Arc::new(InMemoryPaymentRepository::named("memory-primary"))
        }
        (BackendUrl::Memory, StoreRole::Secondary) => {
            Arc::new(InMemoryPaymentRepository::named("memory-secondary"))
        }
        (BackendUrl::Postgres(url), role) => {
            let pool = pools.get(url, db::PAYMENTS_TABLE).await?;
            let name = match role {
                StoreRole::Primary => "postgres-primary",
                StoreRole::Secondary => "postgres-secondary",
            };
            Arc::new(PgPaymentRepository::named(pool, name))
        }
    })
}

/// One pool per database URL
struct Pools {
    max_connections: u32,
    by_url: HashMap<String, PgPool>,
}

impl Pools {
    fn new(max_connections: u32) -> Self {
        Self {
            max_connections,
            by_url: HashMap::new(),
        }
    }

    async fn get(&mut self, url: &str, table: &str) -> Result<PgPool, BackendError> {
        let pool = match self.by_url.get(url) {
            Some(pool) => pool.clone(),
            None => {
                let pool = db::connect(url, self.max_connections).await?;
                self.by_url.insert(url.to_string(), pool.clone());
                pool
            }
        };

        if !db::check_schema(&pool, &[table]).await? {
            return Err(BackendError::Unavailable(format!(
                "table '{}' is missing; run migrations",
                table
            )));
        }

        Ok(pool)
    }

    fn into_vec(self) -> Vec<PgPool> {
        self.by_url.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, OperationContext};
    use crate::handlers::{PaymentCommand, PaymentHandler};

    #[tokio::test]
    async fn test_local_config_resolves_to_memory() {
        let config = Config::local();
        let backends = Backends::from_config(&config).await.unwrap();

        assert_eq!(backends.balance_store.backend(), "memory");
        assert_eq!(
            backends.primary_store.as_ref().map(|s| s.backend()),
            Some("memory-primary")
        );
        assert!(backends.secondary_store.is_none());
        assert!(backends.replay_publisher(&config).is_none());
        assert_eq!(backends.payment_publisher(&config).channel(), "payment-events");
    }

    #[tokio::test]
    async fn test_payment_stores_named_by_role() {
        let config = Config::from_lookup(|key| match key {
            "SECONDARY_STORE_URL" => Some("memory".to_string()),
            _ => None,
        })
        .unwrap();
        let backends = Backends::from_config(&config).await.unwrap();

        assert_eq!(
            backends.secondary_store.as_ref().map(|s| s.backend()),
            Some("memory-secondary")
        );
    }

    #[tokio::test]
    async fn test_in_memory_replay_queue_rejected() {
        let mut config = Config::local();
        config.replay_queue = Some(BackendUrl::Memory);

        let err = Backends::from_config(&config).await.err().unwrap();
        assert!(matches!(err, BackendError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_memory_queue_is_shared_by_publisher_and_subscriber() {
        let config = Config::local();
        let backends = Backends::from_config(&config).await.unwrap();
        let ledger = backends.ledger(&config);
        ledger
            .add_balance("alice", &Amount::from_integer(100).unwrap())
            .await
            .unwrap();

        let handler = PaymentHandler::new(
            ledger,
            backends.payment_store(&config),
            backends.payment_publisher(&config),
            config.environment,
        );
        let result = handler
            .execute(
                PaymentCommand::new("40", "EUR", "bob"),
                &OperationContext::new().with_request_user("alice"),
            )
            .await
            .unwrap();

        let mut subscription = backends.payment_subscription(&config);
        let delivery = subscription.next().await;
        assert_eq!(delivery.payload, result.body);
    }
}
