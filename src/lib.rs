//! Multi-Tenant Inventory Synchronization Engine
//!
//! Keeps a seller's canonical product/variant/inventory state in sync with
//! their connected sales platforms (spec overview).

use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub mod adapters;
pub mod config;
pub mod database;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod health;
pub mod jobs;
pub mod mapping;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod onboarding;
pub mod recovery;
pub mod store;
pub mod validation;

pub use config::AppConfig;
pub use dispatcher::AdaptiveDispatcher;
pub use error::{AppError, ErrorResponse, Result};
pub use onboarding::OnboardingCoordinator;
pub use store::CanonicalStore;

/// Shared dependencies handed to every handler through axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub redis_pool: deadpool_redis::Pool,
    pub config: Arc<AppConfig>,
    pub store: Arc<CanonicalStore>,
    pub registry: Arc<adapters::AdapterRegistry>,
    pub onboarding: Arc<OnboardingCoordinator>,
    pub dispatcher: Arc<AdaptiveDispatcher>,
    pub metrics: Arc<metrics::MetricsCollector>,
}

impl AppState {
    pub fn jwt_secret(&self) -> Arc<String> {
        Arc::new(self.config.auth.jwt_secret.clone())
    }
}

/// Build the full application router: public health/webhook surface plus the
/// bearer-token-protected connections/sync API (spec §6).
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/platform-connections",
            get(handlers::connections::list_connections_handler),
        )
        .route(
            "/platform-connections/:id",
            delete(handlers::connections::disconnect_handler),
        )
        .route(
            "/sync/connections/:id/start-scan",
            post(handlers::sync::start_scan_handler),
        )
        .route(
            "/sync/connections/:id/scan-summary",
            get(handlers::sync::scan_summary_handler),
        )
        .route(
            "/sync/connections/:id/mapping-suggestions",
            get(handlers::sync::mapping_suggestions_handler),
        )
        .route(
            "/sync/connections/:id/draft-mappings",
            get(handlers::sync::get_draft_mappings_handler).put(handlers::sync::put_draft_mappings_handler),
        )
        .route(
            "/sync/connections/:id/confirm-mappings",
            post(handlers::sync::confirm_mappings_handler),
        )
        .route(
            "/sync/connections/:id/sync-preview",
            get(handlers::sync::sync_preview_handler),
        )
        .route(
            "/sync/connections/:id/activate-sync",
            post(handlers::sync::activate_sync_handler),
        )
        .route(
            "/sync/jobs/:jobId/progress",
            get(handlers::sync::job_progress_handler),
        )
        .route(
            "/sync/connection/:id/reconcile",
            post(handlers::sync::reconcile_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.jwt_secret(),
            crate::middleware::auth::auth_middleware,
        ));

    let webhook_routes = Router::new()
        .route("/:platform", post(handlers::webhook::webhook_handler))
        .route(
            "/:platform/:connectionId",
            post(handlers::webhook::webhook_handler_with_connection),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check_endpoint))
        .route("/health/live", get(liveness_check_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .nest("/webhook", webhook_routes)
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn_with_state(
                    state.metrics.clone(),
                    crate::middleware::latency::latency_middleware,
                ))
                .layer(axum::middleware::from_fn(
                    crate::middleware::security::security_headers_middleware,
                ))
                .layer(crate::middleware::cors::create_cors_layer()),
        )
        .with_state(state)
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<health::HealthCheckResponse>> {
    let checker = health::HealthChecker::new(health::HealthCheckConfig::default());
    let response = checker.check_health(&state.db_pool, &state.redis_pool).await;

    tracing::info!(
        status = ?response.status,
        correlation_id = %response.correlation_id,
        "health check completed"
    );

    Ok(axum::Json(response))
}

async fn readiness_check_endpoint(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>> {
    health::readiness_check(&state.db_pool, &state.redis_pool).await?;
    Ok(axum::Json(serde_json::json!({
        "status": "ready",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn liveness_check_endpoint() -> Result<axum::Json<serde_json::Value>> {
    health::liveness_check().await?;
    Ok(axum::Json(serde_json::json!({
        "status": "alive",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}

async fn metrics_endpoint(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    metrics::metrics_handler(axum::extract::State(state.metrics)).await
}
