//! API Integration Tests

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::util::ServiceExt;

use crosscloud_payments::api;
use crosscloud_payments::domain::Environment;

mod common;

use common::{MemoryHarness, PAYMENT_CHANNEL};

fn app(h: &MemoryHarness) -> Router {
    api::build_router(h.app_state())
}

fn post(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("X-Request-User-Id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-Request-User-Id", user);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let h = MemoryHarness::new(Environment::Local);
    let response = app(&h).oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_payment_e2e() {
    let h = MemoryHarness::new(Environment::Aws);
    let app = app(&h);

    // 1. Add funds
    let response = app
        .clone()
        .oneshot(post("/api/payment/add-funds", Some("alice"), json!({"amount": "100"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Funds added");

    // 2. Pay
    let response = app
        .clone()
        .oneshot(post(
            "/api/payment",
            Some("alice"),
            json!({"amount": 40, "currency": "eur", "destinationAccount": "bob"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let event = body_json(response).await;
    assert_eq!(event["eventType"], "PAYMENT_INITIATED");
    assert_eq!(event["source"], "AWS-Fargate");
    assert_eq!(event["data"]["sourceAccount"], "alice");
    assert_eq!(event["data"]["destinationAccount"], "bob");
    assert_eq!(event["data"]["currency"], "EUR");
    assert!(event["eventId"].is_string());
    assert!(event["data"]["transactionId"].is_string());

    // the response body is the published event
    let published: Value = serde_json::from_str(&h.broker.published(PAYMENT_CHANNEL)[0]).unwrap();
    assert_eq!(published, event);

    // 3. Balance
    let response = app
        .clone()
        .oneshot(get("/api/payment/balance", Some("alice")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let balance = body_json(response).await;
    assert_eq!(balance["user_id"], "alice");
    assert_eq!(balance["balance"], "60");
}

#[tokio::test]
async fn test_insufficient_balance_is_400() {
    let h = MemoryHarness::new(Environment::Gcp);

    let response = app(&h)
        .oneshot(post(
            "/api/payment",
            Some("alice"),
            json!({"amount": "40", "currency": "EUR", "destinationAccount": "bob"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "insufficient_balance");
    assert!(h.broker.published(PAYMENT_CHANNEL).is_empty());
}

#[tokio::test]
async fn test_missing_identity_is_401() {
    let h = MemoryHarness::new(Environment::Local);

    let response = app(&h)
        .oneshot(get("/api/payment/balance", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "unauthenticated");
}

#[tokio::test]
async fn test_invalid_amount_is_400() {
    let h = MemoryHarness::new(Environment::Local);

    let response = app(&h)
        .oneshot(post(
            "/api/payment/add-funds",
            Some("alice"),
            json!({"amount": "-3"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error_code"], "invalid_request");
}

#[tokio::test]
async fn test_correlation_id_echoed() {
    let h = MemoryHarness::new(Environment::Local);
    let correlation_id = uuid::Uuid::new_v4().to_string();

    let request = Request::builder()
        .method("GET")
        .uri("/api/payment/balance")
        .header("X-Request-User-Id", "alice")
        .header("X-Correlation-Id", &correlation_id)
        .body(Body::empty())
        .unwrap();
    let response = app(&h).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-correlation-id").unwrap().to_str().unwrap(),
        correlation_id
    );
}

#[tokio::test]
async fn test_welcome_names_commit() {
    let h = MemoryHarness::new(Environment::Local);
    let response = app(&h).oneshot(get("/", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("[Commit: test-sha]"));
}

#[tokio::test]
async fn test_publish_raw_message() {
    let h = MemoryHarness::new(Environment::Aws);
    let response = app(&h)
        .oneshot(get("/publish?message=hello%20there", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"Message published: [AWS] hello there");
    assert_eq!(h.broker.published(PAYMENT_CHANNEL), vec!["[AWS] hello there".to_string()]);
}
