//! Event relay worker
//!
//! Consumes PAYMENT_INITIATED events from this environment's queue and
//! replays them to the peer environment's replay channel.
//!
//! Run with: cargo run --bin relay_worker --release

use std::sync::Arc;

use crosscloud_payments::backends::Backends;
use crosscloud_payments::config::BackendUrl;
use crosscloud_payments::relay::EventRelay;
use crosscloud_payments::runtime::{init_tracing, shutdown_signal};
use crosscloud_payments::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;

    if config.queue == BackendUrl::Memory {
        tracing::warn!(
            "QUEUE_URL is in-memory: this worker only sees events published by its own process; \
             use EMBEDDED_RELAY=true on the API server instead"
        );
    }

    tracing::info!(
        environment = %config.environment,
        channel = %config.payment_channel,
        replay_channel = %config.replay_channel,
        "Starting relay worker"
    );

    let backends = Backends::from_config(&config).await?;

    let relay = Arc::new(EventRelay::with_max_in_flight(
        backends.replay_publisher(&config),
        config.relay_max_in_flight,
    ));
    let subscription = backends.payment_subscription(&config);

    // Un-acked messages in flight at shutdown are redelivered after their lease.
    tokio::select! {
        _ = relay.run(subscription) => {},
        _ = shutdown_signal() => {},
    }

    tracing::info!("Relay worker shutting down...");
    backends.close().await;
    tracing::info!("Backends closed. Goodbye!");

    Ok(())
}
