//! Dual-write payment store
//!
//! The primary write decides success. The secondary write exists for
//! cross-environment durability only: its failure is logged and reported in
//! the `SaveOutcome`, never returned as an error and never undoes the
//! primary write. Background replica writes are tracked so shutdown can
//! wait for them, and any it gives up on are logged.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinSet;

use crate::backends::BackendError;
use crate::config::ReplicationMode;
use crate::domain::{PaymentRecord, PaymentRequest};

use super::PaymentRepository;

#[derive(Debug, thiserror::Error)]
pub enum PaymentStoreError {
    /// Primary write failed; the payment did not happen
    #[error("Primary payment store '{backend}' unavailable: {source}")]
    StoreUnavailable {
        backend: &'static str,
        source: BackendError,
    },

    /// No primary store configured for this deployment
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// What happened to the replica copy of a saved record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplicationStatus {
    /// Secondary write completed
    Replicated,
    /// Secondary write failed (logged, non-fatal)
    Failed(String),
    /// Secondary write handed to a background task
    Deferred,
    /// No secondary store in this deployment
    NotConfigured,
}

#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub record: PaymentRecord,
    pub replication: ReplicationStatus,
}

/// Payment store writing to a primary backend and best-effort to a replica
#[derive(Clone)]
pub struct DualWritePaymentStore {
    primary: Option<Arc<dyn PaymentRepository>>,
    secondary: Option<Arc<dyn PaymentRepository>>,
    mode: ReplicationMode,
    replicating: Arc<Mutex<JoinSet<ReplicationStatus>>>,
}

impl DualWritePaymentStore {
    pub fn new(
        primary: Option<Arc<dyn PaymentRepository>>,
        secondary: Option<Arc<dyn PaymentRepository>>,
        mode: ReplicationMode,
    ) -> Self {
        if primary.is_none() {
            tracing::error!("No primary payment store configured; payments will be rejected");
        }
        if secondary.is_none() {
            tracing::warn!("No secondary payment store configured; replication disabled");
        }
        Self {
            primary,
            secondary,
            mode,
            replicating: Arc::default(),
        }
    }

    fn replicating(&self) -> MutexGuard<'_, JoinSet<ReplicationStatus>> {
        self.replicating.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Background replica writes not yet finished
    pub fn pending_replications(&self) -> usize {
        let mut tasks = self.replicating();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    /// Wait up to `timeout` for background replica writes. Writes still
    /// running after that are aborted and logged; returns how many.
    pub async fn drain(&self, timeout: Duration) -> usize {
        let mut tasks = std::mem::take(&mut *self.replicating());
        if tasks.is_empty() {
            return 0;
        }

        tracing::info!(pending = tasks.len(), "Waiting for background replica writes");
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(None) => return 0,
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => {
                    tracing::error!(error = %e, "Background replica write did not complete");
                }
                Err(_) => {
                    let abandoned = tasks.len();
                    tracing::error!(
                        abandoned,
                        "Replica writes abandoned at shutdown; secondary store is missing these payments"
                    );
                    tasks.abort_all();
                    return abandoned;
                }
            }
        }
    }

    /// Persist a new payment and return the stored record.
    pub async fn save(&self, request: &PaymentRequest) -> Result<PaymentRecord, PaymentStoreError> {
        self.save_with_report(request).await.map(|o| o.record)
    }

    /// Persist a new payment and report what happened to the replica copy.
    pub async fn save_with_report(
        &self,
        request: &PaymentRequest,
    ) -> Result<SaveOutcome, PaymentStoreError> {
        let primary = self.primary.as_ref().ok_or_else(|| {
            PaymentStoreError::Configuration(
                "no primary payment store configured for this deployment".to_string(),
            )
        })?;

        let record = PaymentRecord::assign(request);

        primary.save(&record).await.map_err(|source| {
            tracing::error!(
                transaction_id = %record.transaction_id(),
                backend = primary.backend(),
                error = %source,
                "Primary payment write failed"
            );
            PaymentStoreError::StoreUnavailable {
                backend: primary.backend(),
                source,
            }
        })?;

        tracing::info!(
            transaction_id = %record.transaction_id(),
            backend = primary.backend(),
            "Payment saved to primary store"
        );

        let replication = match &self.secondary {
            None => ReplicationStatus::NotConfigured,
            Some(secondary) => match self.mode {
                ReplicationMode::Inline => replicate(Arc::clone(secondary), record.clone()).await,
                ReplicationMode::Background => {
                    let mut tasks = self.replicating();
                    // reap finished writes so the set only holds live ones
                    while tasks.try_join_next().is_some() {}
                    tasks.spawn(replicate(Arc::clone(secondary), record.clone()));
                    ReplicationStatus::Deferred
                }
            },
        };

        Ok(SaveOutcome {
            record,
            replication,
        })
    }
}

async fn replicate(secondary: Arc<dyn PaymentRepository>, record: PaymentRecord) -> ReplicationStatus {
    match secondary.save(&record).await {
        Ok(()) => {
            tracing::info!(
                transaction_id = %record.transaction_id(),
                backend = secondary.backend(),
                "Payment replicated to secondary store"
            );
            ReplicationStatus::Replicated
        }
        Err(e) => {
            tracing::error!(
                transaction_id = %record.transaction_id(),
                backend = secondary.backend(),
                error = %e,
                "Replication to secondary store failed"
            );
            ReplicationStatus::Failed(e.to_string())
        }
    }
}
