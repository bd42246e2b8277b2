//! Domain module
//!
//! Core domain types shared by the ledger, the payment store and the relay.

pub mod amount;
pub mod context;
pub mod environment;
pub mod error;
pub mod events;
pub mod payment;

pub use amount::{Amount, AmountError, Balance};
pub use context::OperationContext;
pub use environment::{Environment, UnknownEnvironment};
pub use error::DomainError;
pub use events::{EnvelopeHeader, PaymentEvent, PAYMENT_INITIATED};
pub use payment::{PaymentRecord, PaymentRequest};
