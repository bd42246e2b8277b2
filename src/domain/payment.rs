//! Payment request and record
//!
//! A `PaymentRequest` is the transient, validated intent handed to the store.
//! A `PaymentRecord` is what gets persisted: it carries the transaction id
//! assigned by the store layer and never changes afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, DomainError};

/// Validated payment intent. The source account is always the authenticated
/// caller; whatever the client sent is discarded before this is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    amount: Amount,
    currency: String,
    source_account: String,
    destination_account: String,
}

impl PaymentRequest {
    pub fn new(
        amount: Amount,
        currency: &str,
        source_account: &str,
        destination_account: &str,
    ) -> Result<Self, DomainError> {
        let currency = currency.trim();
        if currency.is_empty() {
            return Err(DomainError::invalid_field("currency", "must not be empty"));
        }
        if !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::invalid_field(
                "currency",
                format!("'{}' is not an alphabetic code", currency),
            ));
        }

        let source_account = source_account.trim();
        if source_account.is_empty() {
            return Err(DomainError::invalid_field("sourceAccount", "must not be empty"));
        }

        let destination_account = destination_account.trim();
        if destination_account.is_empty() {
            return Err(DomainError::invalid_field(
                "destinationAccount",
                "must not be empty",
            ));
        }

        Ok(Self {
            amount,
            currency: currency.to_ascii_uppercase(),
            source_account: source_account.to_string(),
            destination_account: destination_account.to_string(),
        })
    }

    pub fn amount(&self) -> &Amount {
        &self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn source_account(&self) -> &str {
        &self.source_account
    }

    pub fn destination_account(&self) -> &str {
        &self.destination_account
    }
}

/// Immutable persisted payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    transaction_id: Uuid,
    amount: Decimal,
    currency: String,
    source_account: String,
    destination_account: String,
}

impl PaymentRecord {
    /// Build a record with a freshly generated transaction id.
    pub(crate) fn assign(request: &PaymentRequest) -> Self {
        Self {
            transaction_id: Uuid::new_v4(),
            amount: request.amount.value(),
            currency: request.currency.clone(),
            source_account: request.source_account.clone(),
            destination_account: request.destination_account.clone(),
        }
    }

    /// Rebuild a record read back from a backend.
    pub(crate) fn from_parts(
        transaction_id: Uuid,
        amount: Decimal,
        currency: String,
        source_account: String,
        destination_account: String,
    ) -> Self {
        Self {
            transaction_id,
            amount,
            currency,
            source_account,
            destination_account,
        }
    }

    pub fn transaction_id(&self) -> Uuid {
        self.transaction_id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn source_account(&self) -> &str {
        &self.source_account
    }

    pub fn destination_account(&self) -> &str {
        &self.destination_account
    }
}
