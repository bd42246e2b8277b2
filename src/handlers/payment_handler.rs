//! Payment Handler
//!
//! Runs a payment end to end: deduct, store, publish. Steps are strictly
//! sequential; only the deduction and the primary write can fail the request.
//! The workflow runs on its own task, so a caller that goes away cannot stop
//! it between the deduction and the write.

use crate::config::StoreFailurePolicy;
use crate::domain::{Amount, Environment, OperationContext, PaymentEvent, PaymentRequest};
use crate::error::AppError;
use crate::ledger::BalanceLedger;
use crate::messaging::EventPublisher;
use crate::payments::DualWritePaymentStore;

use super::{PaymentCommand, PaymentResult};

/// Handler for payments
#[derive(Clone)]
pub struct PaymentHandler {
    ledger: BalanceLedger,
    store: DualWritePaymentStore,
    publisher: EventPublisher,
    environment: Environment,
    policy: StoreFailurePolicy,
}

impl PaymentHandler {
    pub fn new(
        ledger: BalanceLedger,
        store: DualWritePaymentStore,
        publisher: EventPublisher,
        environment: Environment,
    ) -> Self {
        Self {
            ledger,
            store,
            publisher,
            environment,
            policy: StoreFailurePolicy::Keep,
        }
    }

    pub fn with_store_failure_policy(mut self, policy: StoreFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Execute the payment command. Runs to completion even if the returned
    /// future is dropped.
    pub async fn execute(
        &self,
        command: PaymentCommand,
        context: &OperationContext,
    ) -> Result<PaymentResult, AppError> {
        let handler = self.clone();
        let context = context.clone();

        tokio::spawn(async move { handler.run(command, &context).await })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Payment task failed");
                AppError::Internal(format!("Payment task failed: {}", e))
            })?
    }

    async fn run(
        &self,
        command: PaymentCommand,
        context: &OperationContext,
    ) -> Result<PaymentResult, AppError> {
        // Caller identity is the source account
        let user_id = context
            .request_user_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(AppError::Unauthenticated)?;

        if let Some(claimed) = command.source_account.as_deref() {
            if claimed != user_id {
                tracing::debug!(
                    user_id = %user_id,
                    claimed_source = %claimed,
                    "Ignoring client-supplied source account"
                );
            }
        }

        // Parse and validate before any side effect
        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;

        let request = PaymentRequest::new(
            amount,
            &command.currency,
            user_id,
            &command.destination_account,
        )?;

        // Deduct
        let balance = self
            .ledger
            .deduct_balance(user_id, request.amount())
            .await
            .map_err(|e| {
                if e.is_insufficient_balance() {
                    tracing::warn!(user_id = %user_id, amount = %request.amount(), "Payment rejected: insufficient balance");
                } else {
                    tracing::error!(user_id = %user_id, error = %e, "Balance deduction failed");
                }
                AppError::from(e)
            })?;

        // Store
        let outcome = match self.store.save_with_report(&request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.after_store_failure(user_id, request.amount(), context).await;
                return Err(e.into());
            }
        };

        // Publish
        let transaction_id = outcome.record.transaction_id();
        let event = PaymentEvent::initiated(outcome.record, self.environment);
        let body = event
            .to_json()
            .map_err(|e| AppError::Internal(format!("Event serialization failed: {}", e)))?;

        let published = match self.publisher.publish(&body).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    transaction_id = %transaction_id,
                    event_id = %event.event_id,
                    error = %e,
                    "Payment stored but event publish failed"
                );
                false
            }
        };

        tracing::info!(
            user_id = %user_id,
            transaction_id = %transaction_id,
            event_id = %event.event_id,
            correlation_id = ?context.correlation_id,
            balance = %balance,
            source = %event.source,
            "Payment completed"
        );

        Ok(PaymentResult {
            event,
            body,
            published,
            replication: outcome.replication,
        })
    }

    async fn after_store_failure(&self, user_id: &str, amount: &Amount, context: &OperationContext) {
        match self.policy {
            StoreFailurePolicy::Keep => {
                tracing::error!(
                    user_id = %user_id,
                    amount = %amount,
                    correlation_id = ?context.correlation_id,
                    "Payment not stored after balance deduction; balance left deducted"
                );
            }
            StoreFailurePolicy::Refund => match self.ledger.add_balance(user_id, amount).await {
                Ok(balance) => {
                    tracing::warn!(
                        user_id = %user_id,
                        amount = %amount,
                        balance = %balance,
                        "Payment not stored; deduction refunded"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        user_id = %user_id,
                        amount = %amount,
                        correlation_id = ?context.correlation_id,
                        error = %e,
                        "Payment not stored and refund failed"
                    );
                }
            },
        }
    }
}
