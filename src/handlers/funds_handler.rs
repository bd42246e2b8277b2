//! Funds Handler
//!
//! Balance query and credit for the authenticated caller.

use crate::domain::{Amount, OperationContext};
use crate::error::AppError;
use crate::ledger::BalanceLedger;

use super::{AddFundsCommand, AddFundsResult, BalanceView};

#[derive(Clone)]
pub struct FundsHandler {
    ledger: BalanceLedger,
}

impl FundsHandler {
    pub fn new(ledger: BalanceLedger) -> Self {
        Self { ledger }
    }

    pub async fn add_funds(
        &self,
        command: AddFundsCommand,
        context: &OperationContext,
    ) -> Result<AddFundsResult, AppError> {
        let user_id = caller(context)?;

        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| AppError::InvalidRequest(format!("Invalid amount: {}", e)))?;

        let balance = self.ledger.add_balance(user_id, &amount).await?;

        tracing::info!(user_id = %user_id, amount = %amount, balance = %balance, "Funds added");

        Ok(AddFundsResult {
            user_id: user_id.to_string(),
            amount: amount.value(),
            balance: balance.value(),
        })
    }

    pub async fn get_balance(&self, context: &OperationContext) -> Result<BalanceView, AppError> {
        let user_id = caller(context)?;
        let balance = self.ledger.get_balance(user_id).await?;

        Ok(BalanceView {
            user_id: user_id.to_string(),
            balance: balance.value(),
        })
    }
}

fn caller(context: &OperationContext) -> Result<&str, AppError> {
    context
        .request_user_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or(AppError::Unauthenticated)
}
