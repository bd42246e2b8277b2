//! In-memory payment repository

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::backends::BackendError;
use crate::domain::PaymentRecord;

use super::PaymentRepository;

/// Payment table held in process memory. Clones share the same table.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentRepository {
    name: &'static str,
    records: Arc<RwLock<HashMap<Uuid, PaymentRecord>>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::named("memory")
    }

    /// Distinguish two in-memory repositories in logs (e.g. primary/replica).
    pub fn named(name: &'static str) -> Self {
        Self {
            name,
            records: Arc::default(),
        }
    }

    pub async fn get(&self, transaction_id: Uuid) -> Option<PaymentRecord> {
        self.records.read().await.get(&transaction_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl Default for InMemoryPaymentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    fn backend(&self) -> &'static str {
        self.name
    }

    async fn save(&self, record: &PaymentRecord) -> Result<(), BackendError> {
        let mut records = self.records.write().await;
        // Same id twice is a redelivery of the same immutable record.
        records
            .entry(record.transaction_id())
            .or_insert_with(|| record.clone());
        Ok(())
    }
}
