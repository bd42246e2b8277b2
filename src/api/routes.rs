//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::domain::OperationContext;
use crate::error::AppError;
use crate::handlers::{
    AddFundsCommand, BalanceView, FundsHandler, MessageHandler, PaymentCommand, PaymentHandler,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub payments: PaymentHandler,
    pub funds: FundsHandler,
    pub messages: MessageHandler,
}

impl AppState {
    pub fn new(payments: PaymentHandler, funds: FundsHandler, messages: MessageHandler) -> Self {
        Self {
            payments,
            funds,
            messages,
        }
    }
}

// =========================================================================
// API Router
// =========================================================================

/// Payment routes, mounted under `/api/payment`
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", post(make_payment))
        .route("/balance", get(get_balance))
        .route("/add-funds", post(add_funds))
}

/// Unauthenticated root routes: welcome banner and raw message publish
pub fn create_message_router() -> Router<AppState> {
    Router::new()
        .route("/", get(welcome))
        .route("/publish", get(publish_message))
}

// =========================================================================
// GET /
// =========================================================================

async fn welcome(State(state): State<AppState>) -> String {
    state.messages.welcome()
}

// =========================================================================
// GET /publish?message=...
// =========================================================================

#[derive(Debug, Deserialize)]
struct PublishQuery {
    message: Option<String>,
}

async fn publish_message(
    State(state): State<AppState>,
    Query(query): Query<PublishQuery>,
) -> Result<String, AppError> {
    let sent = state.messages.publish(query.message.as_deref()).await?;
    Ok(format!("Message published: {}", sent))
}

// =========================================================================
// POST /api/payment
// =========================================================================

/// Pay from the caller's balance. Responds with the published event.
async fn make_payment(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<PaymentCommand>,
) -> Result<Response, AppError> {
    let result = state.payments.execute(command, &context).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        result.body,
    )
        .into_response())
}

// =========================================================================
// GET /api/payment/balance
// =========================================================================

async fn get_balance(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
) -> Result<Json<BalanceView>, AppError> {
    Ok(Json(state.funds.get_balance(&context).await?))
}

// =========================================================================
// POST /api/payment/add-funds
// =========================================================================

async fn add_funds(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<AddFundsCommand>,
) -> Result<&'static str, AppError> {
    state.funds.add_funds(command, &context).await?;
    Ok("Funds added")
}
