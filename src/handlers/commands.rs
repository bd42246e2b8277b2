//! Command definitions
//!
//! Commands represent intentions to change the system state.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::PaymentEvent;
use crate::payments::ReplicationStatus;

// =========================================================================
// PaymentCommand
// =========================================================================

/// Command to pay `amount` from the caller's balance to `destination_account`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCommand {
    /// Amount to pay (as string for precise decimal; JSON numbers accepted)
    #[serde(deserialize_with = "amount_text")]
    pub amount: String,
    pub currency: String,
    pub destination_account: String,
    /// Ignored: the source is always the authenticated caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_account: Option<String>,
}

impl PaymentCommand {
    pub fn new(amount: impl Into<String>, currency: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency: currency.into(),
            destination_account: destination.into(),
            source_account: None,
        }
    }

    pub fn with_source_account(mut self, source: impl Into<String>) -> Self {
        self.source_account = Some(source.into());
        self
    }
}

// =========================================================================
// AddFundsCommand
// =========================================================================

/// Command to credit the caller's balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFundsCommand {
    #[serde(deserialize_with = "amount_text")]
    pub amount: String,
}

impl AddFundsCommand {
    pub fn new(amount: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
        }
    }
}

// =========================================================================
// Results
// =========================================================================

/// Result of a successful payment
#[derive(Debug, Clone)]
pub struct PaymentResult {
    pub event: PaymentEvent,
    /// Serialized event, exactly as handed to the publisher
    pub body: String,
    /// False when the notification could not be published (payment still stands)
    pub published: bool,
    pub replication: ReplicationStatus,
}

/// Result of a successful credit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFundsResult {
    pub user_id: String,
    pub amount: Decimal,
    pub balance: Decimal,
}

/// Current balance of a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceView {
    pub user_id: String,
    pub balance: Decimal,
}

/// Accept `"40.5"` as well as `40.5` and keep the textual form for parsing.
/// Numbers that serialize in exponent form (`1e-7`) are expanded first, so
/// validation reports range and precision rather than a parse failure.
fn amount_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum AmountInput {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match AmountInput::deserialize(deserializer)? {
        AmountInput::Text(s) => s,
        AmountInput::Number(n) => {
            let text = n.to_string();
            if text.contains(['e', 'E']) {
                Decimal::from_scientific(&text)
                    .map(|d| d.normalize().to_string())
                    .unwrap_or(text)
            } else {
                text
            }
        }
    })
}
