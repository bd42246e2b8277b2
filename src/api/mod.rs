//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

pub use routes::{create_message_router, create_router, AppState};

/// Full application router: `/health`, the message routes and the payment API.
pub fn build_router(state: AppState) -> Router {
    // Layers run last-added first: identity -> logging -> handler
    let payment_routes = create_router()
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn(middleware::identity_middleware));

    Router::new()
        .route("/health", get(health_check))
        .merge(create_message_router())
        .nest("/api/payment", payment_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
