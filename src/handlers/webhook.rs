//! Webhook Dispatcher (spec §4.7): `POST /webhook/:platform[/:connectionId]`.
//!
//! The HTTP response is emitted before canonical-state processing so a slow
//! adapter never blocks the platform's delivery timeout; processing happens
//! on a background task.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

use crate::adapters::{verify_shopify_signature, verify_square_signature};
use crate::error::AppError;
use crate::models::{event_types, ActivityLogEntry, ActivityStatus, PlatformKind};
use crate::AppState;

fn mint_webhook_id() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("{}-{}", chrono::Utc::now().timestamp_millis(), random)
}

fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_lowercase(), v.to_string()))
        })
        .collect()
}

fn parse_platform(platform: &str) -> Option<PlatformKind> {
    match platform.to_lowercase().as_str() {
        "shopify" => Some(PlatformKind::Shopify),
        "square" => Some(PlatformKind::Square),
        "clover" => Some(PlatformKind::Clover),
        "ebay" => Some(PlatformKind::Ebay),
        "facebook" => Some(PlatformKind::Facebook),
        "whatnot" => Some(PlatformKind::Whatnot),
        _ => None,
    }
}

/// `POST /webhook/:platform`
pub async fn webhook_handler(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> axum::response::Response {
    dispatch(state, platform, None, headers, body).await
}

/// `POST /webhook/:platform/:connectionId`
pub async fn webhook_handler_with_connection(
    State(state): State<AppState>,
    Path((platform, connection_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> axum::response::Response {
    dispatch(state, platform, Some(connection_id), headers, body).await
}

async fn dispatch(
    state: AppState,
    platform: String,
    connection_id: Option<Uuid>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> axum::response::Response {
    use axum::response::IntoResponse;
    use axum::Json;

    let webhook_id = mint_webhook_id();
    let timestamp = chrono::Utc::now().to_rfc3339();

    if body.is_empty() {
        return error_response(
            axum::http::StatusCode::BAD_REQUEST,
            "raw request body is required",
            &webhook_id,
        );
    }

    let Some(kind) = parse_platform(&platform) else {
        return error_response(
            axum::http::StatusCode::BAD_REQUEST,
            &format!("unsupported platform: {}", platform),
            &webhook_id,
        );
    };

    let header_map = lowercase_headers(&headers);

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => {
            return error_response(
                axum::http::StatusCode::BAD_REQUEST,
                "request body is not valid json",
                &webhook_id,
            );
        }
    };

    if let Some(rejection) = verify_signature(kind, &state, &header_map, &body) {
        return error_response(axum::http::StatusCode::UNAUTHORIZED, rejection, &webhook_id);
    }

    let response = (
        axum::http::StatusCode::OK,
        Json(serde_json::json!({
            "received": true,
            "webhookId": webhook_id,
            "platform": platform,
            "timestamp": timestamp,
        })),
    )
        .into_response();

    let webhook_id_for_task = webhook_id.clone();
    tokio::spawn(async move {
        process_in_background(
            state,
            kind,
            connection_id,
            header_map,
            payload,
            webhook_id_for_task,
        )
        .await;
    });

    response
}

/// Returns `Some(message)` if verification fails; `None` accepts the request
/// (including platforms with no signature scheme defined, e.g. Clover).
fn verify_signature(
    kind: PlatformKind,
    state: &AppState,
    headers: &HashMap<String, String>,
    raw_body: &[u8],
) -> Option<&'static str> {
    match kind {
        PlatformKind::Shopify => {
            let Some(shopify) = &state.config.platforms.shopify else {
                return Some("shopify is not configured");
            };
            let Some(signature) = headers.get("x-shopify-hmac-sha256") else {
                return Some("missing x-shopify-hmac-sha256 header");
            };
            if verify_shopify_signature(&shopify.webhook_signing_key, raw_body, signature) {
                None
            } else {
                Some("invalid shopify hmac signature")
            }
        }
        PlatformKind::Square => {
            let Some(square) = &state.config.platforms.square else {
                return Some("square is not configured");
            };
            // Signature is optional on square webhooks (spec §4.7 step 3); if
            // absent we accept and let the adapter identify the merchant.
            let Some(signature) = headers.get("x-square-hmacsha256-signature") else {
                return None;
            };
            let notification_url = headers
                .get("x-forwarded-proto")
                .map(|proto| format!("{}://{}/webhook/square", proto, headers.get("host").map(String::as_str).unwrap_or("")))
                .unwrap_or_else(|| format!("https://{}/webhook/square", headers.get("host").map(String::as_str).unwrap_or("")));

            if verify_square_signature(&square.webhook_signature_key, &notification_url, raw_body, signature) {
                None
            } else {
                Some("invalid square hmac signature")
            }
        }
        // Clover identifies the merchant by header/body field rather than a
        // signature scheme; stub platforms (eBay/Facebook/Whatnot) carry no
        // verification until their adapters are built out.
        PlatformKind::Clover | PlatformKind::Ebay | PlatformKind::Facebook | PlatformKind::Whatnot => None,
        PlatformKind::Csv => Some("csv is not a webhook-capable platform"),
    }
}

async fn process_in_background(
    state: AppState,
    kind: PlatformKind,
    connection_id: Option<Uuid>,
    headers: HashMap<String, String>,
    payload: Value,
    webhook_id: String,
) {
    let connection = match resolve_connection(&state, kind, connection_id, &headers, &payload).await {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(webhook_id, platform = %kind, error = %err, "failed to resolve webhook connection");
            return;
        }
    };

    state
        .store
        .log_activity(ActivityLogEntry {
            user_id: connection.user_id,
            entity_type: "connection".to_string(),
            entity_id: connection.id.to_string(),
            event_type: event_types::WEBHOOK_RECEIVED.to_string(),
            status: ActivityStatus::Info,
            message: format!("received {} webhook", kind),
            connection_id: Some(connection.id),
            details: serde_json::json!({ "webhookId": webhook_id }),
        })
        .await;

    let adapter = match state.registry.get(kind) {
        Ok(a) => a,
        Err(err) => {
            tracing::warn!(webhook_id, platform = %kind, error = %err, "no adapter registered for webhook platform");
            return;
        }
    };

    match adapter
        .process_webhook(&state.store, &connection, &payload, &headers, Some(&webhook_id))
        .await
    {
        Ok(entries) => {
            for entry in entries {
                state.store.log_activity(entry).await;
            }
        }
        Err(err) => {
            tracing::error!(webhook_id, connection_id = %connection.id, error = %err, "webhook processing failed");
            state
                .store
                .log_activity(ActivityLogEntry {
                    user_id: connection.user_id,
                    entity_type: "connection".to_string(),
                    entity_id: connection.id.to_string(),
                    event_type: event_types::WEBHOOK_PROCESSING_FAILED.to_string(),
                    status: ActivityStatus::Error,
                    message: err.to_string(),
                    connection_id: Some(connection.id),
                    details: serde_json::json!({ "webhookId": webhook_id }),
                })
                .await;
        }
    }
}

async fn resolve_connection(
    state: &AppState,
    kind: PlatformKind,
    connection_id: Option<Uuid>,
    headers: &HashMap<String, String>,
    payload: &Value,
) -> crate::error::Result<crate::models::PlatformConnection> {
    if let Some(id) = connection_id {
        return state.store.get_connection(id).await;
    }

    let (key, identifier) = match kind {
        PlatformKind::Shopify => (
            crate::models::metadata_keys::SHOP,
            headers.get("x-shopify-shop-domain").cloned(),
        ),
        PlatformKind::Square => (
            crate::models::metadata_keys::MERCHANT_ID,
            headers
                .get("x-square-merchant-id")
                .cloned()
                .or_else(|| payload["merchant_id"].as_str().map(String::from)),
        ),
        PlatformKind::Clover => (
            crate::models::metadata_keys::MERCHANT_ID,
            headers
                .get("x-clover-merchant-id")
                .cloned()
                .or_else(|| payload["merchantId"].as_str().map(String::from)),
        ),
        _ => (
            crate::models::metadata_keys::MERCHANT_ID,
            None,
        ),
    };

    let identifier = identifier.ok_or_else(|| AppError::ValidationFailed({
        let mut errors = validator::ValidationErrors::new();
        errors.add("connectionId", validator::ValidationError::new("missing_platform_identifier"));
        errors
    }))?;

    state
        .store
        .find_connection_by_identifier(kind, key, &identifier)
        .await
}

fn error_response(status: axum::http::StatusCode, message: &str, webhook_id: &str) -> axum::response::Response {
    use axum::response::IntoResponse;
    (
        status,
        axum::Json(serde_json::json!({
            "error": status.canonical_reason().unwrap_or("error"),
            "message": message,
            "webhookId": webhook_id,
        })),
    )
        .into_response()
}
