//! crosscloud_payments Library
//!
//! Re-exports modules for integration testing and the binaries.

pub mod api;
pub mod backends;
pub mod config;
pub mod db;
pub mod domain;
pub mod handlers;
pub mod ledger;
pub mod messaging;
pub mod payments;
pub mod relay;
pub mod runtime;

mod error;

pub use config::Config;
pub use error::{AppError, AppResult};
pub use domain::{Amount, AmountError, Balance, DomainError, Environment, OperationContext};
pub use domain::{PaymentEvent, PaymentRecord, PaymentRequest};
