//! crosscloud_payments - payment API server
//!
//! Deducts the caller's balance, stores the payment in the primary (and
//! best-effort secondary) store and publishes a PAYMENT_INITIATED event.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crosscloud_payments::api::{self, AppState};
use crosscloud_payments::backends::Backends;
use crosscloud_payments::handlers::{FundsHandler, MessageHandler, PaymentHandler};
use crosscloud_payments::relay::EventRelay;
use crosscloud_payments::runtime::{init_tracing, shutdown_signal};
use crosscloud_payments::Config;

/// How long shutdown waits for background replica writes
const REPLICATION_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(
        environment = %config.environment,
        source = config.environment.source_tag(),
        "Starting payment API"
    );

    let backends = Backends::from_config(&config).await?;

    let ledger = backends.ledger(&config);
    let store = backends.payment_store(&config);
    let payments = PaymentHandler::new(
        ledger.clone(),
        store.clone(),
        backends.payment_publisher(&config),
        config.environment,
    )
    .with_store_failure_policy(config.store_failure_policy);
    let messages = MessageHandler::new(backends.payment_publisher(&config), config.environment)
        .with_commit_sha(config.commit_sha.clone());
    let state = AppState::new(payments, FundsHandler::new(ledger), messages);

    // Relay alongside the API when requested (required for an in-memory queue)
    let relay = if config.embedded_relay {
        let relay = Arc::new(EventRelay::with_max_in_flight(
            backends.replay_publisher(&config),
            config.relay_max_in_flight,
        ));
        Some(relay.start(backends.payment_subscription(&config)))
    } else {
        None
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, api::build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(handle) = relay {
        handle.abort();
    }
    store.drain(REPLICATION_DRAIN_TIMEOUT).await;
    backends.close().await;
    tracing::info!("Backends closed. Goodbye!");

    Ok(())
}
