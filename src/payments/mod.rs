//! Payment Store
//!
//! `PaymentRepository` is the per-backend capability; `DualWritePaymentStore`
//! applies the primary/secondary write policy on top of two of them.

mod memory;
mod postgres;
mod store;

use async_trait::async_trait;

use crate::backends::BackendError;
use crate::domain::PaymentRecord;

pub use memory::InMemoryPaymentRepository;
pub use postgres::PgPaymentRepository;
pub use store::{DualWritePaymentStore, PaymentStoreError, ReplicationStatus, SaveOutcome};

/// A backend able to persist payment records.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Short backend name for logs
    fn backend(&self) -> &'static str;

    /// Persist `record`. Saving the same transaction id twice is a no-op.
    async fn save(&self, record: &PaymentRecord) -> Result<(), BackendError>;
}
