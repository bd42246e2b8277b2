//! In-memory balance store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::backends::BackendError;

use super::{BalanceRecord, BalanceStore};

/// A thread-safe in-memory balance table.
///
/// Conditional writes are checked under the write lock, so the version rule
/// holds exactly as it does for the Postgres variant.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBalanceStore {
    balances: Arc<RwLock<HashMap<String, BalanceRecord>>>,
}

impl InMemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BalanceStore for InMemoryBalanceStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, user_id: &str) -> Result<Option<BalanceRecord>, BackendError> {
        let balances = self.balances.read().await;
        Ok(balances.get(user_id).cloned())
    }

    async fn save(&self, record: &BalanceRecord, expected_version: i64) -> Result<(), BackendError> {
        let mut balances = self.balances.write().await;

        let current_version = balances.get(&record.user_id).map_or(0, |r| r.version);
        if current_version != expected_version {
            return Err(BackendError::VersionConflict {
                key: record.user_id.clone(),
                expected: expected_version,
            });
        }

        balances.insert(record.user_id.clone(), record.clone());
        Ok(())
    }
}
