//! Ledger Errors

use crate::backends::BackendError;
use crate::domain::DomainError;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Deduction larger than the current balance; nothing was written
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Backing store failed
    #[error("Balance store error: {0}")]
    Backend(#[from] BackendError),

    /// Optimistic-lock retries exhausted
    #[error("Balance for {user_id} is under contention, retries exhausted")]
    Contention { user_id: String },
}

impl LedgerError {
    pub fn is_insufficient_balance(&self) -> bool {
        matches!(
            self,
            LedgerError::Domain(DomainError::InsufficientBalance { .. })
        )
    }
}
