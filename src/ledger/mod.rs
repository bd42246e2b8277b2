//! Balance Ledger
//!
//! Per-user balances with deduct/add semantics over a pluggable store.
//!
//! Every update runs inside a per-user critical section and is written back
//! with a version check. The lock removes in-process contention; the version
//! check covers other instances sharing the same store, with a bounded retry
//! when one of them wins the race.

mod error;
mod locks;
mod memory;
mod postgres;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::backends::BackendError;
use crate::domain::{Amount, Balance, DomainError};

pub use error::LedgerError;
pub use locks::{KeyGuard, KeyedLocks};
pub use memory::InMemoryBalanceStore;
pub use postgres::PgBalanceStore;

/// Default optimistic-lock retries per update
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Stored balance for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRecord {
    pub user_id: String,
    pub balance: Balance,
    /// Incremented on every write; 0 means "never written"
    pub version: i64,
}

impl BalanceRecord {
    /// The implicit record of a user that has never been credited or debited.
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            balance: Balance::zero(),
            version: 0,
        }
    }
}

/// Backing store for the ledger.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    async fn load(&self, user_id: &str) -> Result<Option<BalanceRecord>, BackendError>;

    /// Persist `record` only if the stored version still equals
    /// `expected_version` (0 for a user with no row yet). Otherwise fail with
    /// `BackendError::VersionConflict` and write nothing.
    async fn save(&self, record: &BalanceRecord, expected_version: i64) -> Result<(), BackendError>;
}

#[derive(Debug, Clone, Copy)]
enum Change {
    Credit,
    Debit,
}

/// Balance ledger service
#[derive(Clone)]
pub struct BalanceLedger {
    store: Arc<dyn BalanceStore>,
    locks: KeyedLocks,
    max_retries: u32,
}

impl BalanceLedger {
    pub fn new(store: Arc<dyn BalanceStore>) -> Self {
        Self::with_max_retries(store, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(store: Arc<dyn BalanceStore>, max_retries: u32) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            max_retries: max_retries.max(1),
        }
    }

    /// Current balance, zero for unknown users. Read-only.
    pub async fn get_balance(&self, user_id: &str) -> Result<Balance, LedgerError> {
        let record = self.store.load(user_id).await?;
        Ok(record.map(|r| r.balance).unwrap_or_default())
    }

    /// Subtract `amount`, refusing to go below zero. Returns the new balance.
    pub async fn deduct_balance(
        &self,
        user_id: &str,
        amount: &Amount,
    ) -> Result<Balance, LedgerError> {
        self.update(user_id, amount, Change::Debit).await
    }

    /// Add `amount`. Returns the new balance.
    pub async fn add_balance(&self, user_id: &str, amount: &Amount) -> Result<Balance, LedgerError> {
        self.update(user_id, amount, Change::Credit).await
    }

    async fn update(
        &self,
        user_id: &str,
        amount: &Amount,
        change: Change,
    ) -> Result<Balance, LedgerError> {
        let _guard = self.locks.lock(user_id).await;

        for attempt in 0..self.max_retries {
            match self.try_update(user_id, amount, change).await {
                Ok(balance) => {
                    tracing::debug!(
                        user_id = %user_id,
                        change = ?change,
                        amount = %amount,
                        balance = %balance,
                        backend = self.store.backend(),
                        "Balance updated"
                    );
                    return Ok(balance);
                }
                Err(LedgerError::Backend(e)) if e.is_version_conflict() => {
                    tracing::warn!(
                        user_id = %user_id,
                        "Balance version conflict, retrying (attempt {}/{})",
                        attempt + 1,
                        self.max_retries
                    );
                    if attempt + 1 < self.max_retries {
                        tokio::time::sleep(Duration::from_millis(20 * (attempt as u64 + 1))).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(LedgerError::Contention {
            user_id: user_id.to_string(),
        })
    }

    async fn try_update(
        &self,
        user_id: &str,
        amount: &Amount,
        change: Change,
    ) -> Result<Balance, LedgerError> {
        let current = self
            .store
            .load(user_id)
            .await?
            .unwrap_or_else(|| BalanceRecord::empty(user_id));

        let next = match change {
            Change::Debit => {
                if !current.balance.is_sufficient_for(amount) {
                    return Err(DomainError::insufficient_balance(
                        amount.value(),
                        current.balance.value(),
                    )
                    .into());
                }
                current.balance.debit(amount).map_err(DomainError::from)?
            }
            Change::Credit => current.balance.credit(amount).map_err(DomainError::from)?,
        };

        let record = BalanceRecord {
            user_id: user_id.to_string(),
            balance: next,
            version: current.version + 1,
        };
        self.store.save(&record, current.version).await?;

        Ok(next)
    }
}
