//! Command Handlers module
//!
//! Handlers that orchestrate the payment workflow across ledger, store and
//! publisher.

mod commands;
mod funds_handler;
mod message_handler;
mod payment_handler;


pub use commands::*;
pub use funds_handler::FundsHandler;
pub use message_handler::MessageHandler;
pub use payment_handler::PaymentHandler;
