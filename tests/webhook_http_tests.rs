//! Webhook Dispatcher HTTP surface (spec §4.7). Requires a reachable
//! Postgres and Redis; see `tests/common/mod.rs`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serial_test::serial;
use sync_engine::create_router;
use tower::ServiceExt;

/// Malformed body (not valid JSON) is rejected `400`, independent of
/// signature verification (spec §4.7).
#[tokio::test]
#[serial]
async fn test_webhook_rejects_non_json_body() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/shopify")
                .header("content-type", "application/json")
                .body(Body::from("not json"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Unsupported platform name is rejected `400` (spec §4.7).
#[tokio::test]
#[serial]
async fn test_webhook_rejects_unsupported_platform() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/bigcommerce")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// Empty body is rejected `400` (spec §4.7 step 2: raw body is required).
#[tokio::test]
#[serial]
async fn test_webhook_rejects_empty_body() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/shopify")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// A shopify webhook with no (or an invalid) HMAC signature is rejected
/// `401`, never reaching canonical-state mutation (spec §4.7 step 3).
#[tokio::test]
#[serial]
async fn test_shopify_webhook_rejects_missing_signature() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/shopify")
                .header("content-type", "application/json")
                .header("x-shopify-shop-domain", "test-shop.myshopify.com")
                .body(Body::from(r#"{"id":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// `/health` is reachable without a bearer token (public surface, spec §6).
#[tokio::test]
#[serial]
async fn test_health_endpoint_is_public() {
    let pool = common::test_pool().await;
    let state = common::test_state(pool).await;
    let app = create_router(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
