//! Event envelope
//!
//! Wire format published to the queues. Field order is irrelevant and unknown
//! fields are ignored on read, so producers in either environment can add
//! fields without breaking consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Environment, PaymentRecord};

/// Event type emitted once a payment is durable in the primary store
pub const PAYMENT_INITIATED: &str = "PAYMENT_INITIATED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub event_id: Uuid,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub data: PaymentRecord,
}

impl PaymentEvent {
    /// Wrap a freshly saved record for publication from `environment`.
    pub fn initiated(record: PaymentRecord, environment: Environment) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: PAYMENT_INITIATED.to_string(),
            timestamp: Utc::now(),
            source: environment.source_tag().to_string(),
            data: record,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

/// Minimal view used by consumers that only need to identify a message.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeHeader {
    pub event_id: Uuid,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl EnvelopeHeader {
    /// Returns `None` for payloads that are not an envelope (plain strings,
    /// foreign JSON).
    pub fn peek(payload: &str) -> Option<Self> {
        serde_json::from_str(payload).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Amount, PaymentRequest};
    use rust_decimal_macros::dec;

    fn record() -> PaymentRecord {
        let request =
            PaymentRequest::new(Amount::new(dec!(40)).unwrap(), "EUR", "alice", "bob").unwrap();
        PaymentRecord::assign(&request)
    }

    #[test]
    fn test_envelope_fields() {
        let event = PaymentEvent::initiated(record(), Environment::Gcp);
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();

        assert_eq!(json["eventType"], "PAYMENT_INITIATED");
        assert_eq!(json["source"], "GCP-CloudRun");
        assert_eq!(json["data"]["destinationAccount"], "bob");
        assert!(json["eventId"].is_string());
        // RFC 3339 is an ISO-8601 profile
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_envelope_tolerates_unknown_fields() {
        let event = PaymentEvent::initiated(record(), Environment::Aws);
        let mut json: serde_json::Value = serde_json::to_value(&event).unwrap();
        json["traceParent"] = serde_json::json!("00-abc");
        json["data"]["memo"] = serde_json::json!("extra");

        let parsed = PaymentEvent::from_json(&json.to_string()).unwrap();
        assert_eq!(parsed.event_id, event.event_id);
        assert_eq!(parsed.data, event.data);
    }

    #[test]
    fn test_peek_header() {
        let event = PaymentEvent::initiated(record(), Environment::Aws);
        let header = EnvelopeHeader::peek(&event.to_json().unwrap()).unwrap();
        assert_eq!(header.event_id, event.event_id);
        assert_eq!(header.source.as_deref(), Some("AWS-Fargate"));

        assert!(EnvelopeHeader::peek("[AWS] hello").is_none());
    }
}
