//! Shared fixtures for the crate's integration tests. Mirrors `main.rs`'s own
//! bootstrap sequence so the wiring under test is the same the binary uses.
//!
//! These tests assume a reachable Postgres and Redis (`DATABASE_URL` /
//! `REDIS_URL`, same defaults as `config.rs`'s development fallback).

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use sync_engine::adapters::AdapterRegistry;
use sync_engine::dispatcher::AdaptiveDispatcher;
use sync_engine::models::{
    AuthenticatedUser, Claims, ConnectionStatus, PlatformConnection, PlatformKind, SyncRules,
};
use sync_engine::onboarding::OnboardingCoordinator;
use sync_engine::store::CanonicalStore;
use sync_engine::{database, metrics::MetricsCollector, AppConfig, AppState};
use uuid::Uuid;

#[allow(dead_code)]
pub async fn test_pool() -> PgPool {
    let config = AppConfig::from_env().expect("load config from env for tests");
    let pool = database::create_pool(&config.database)
        .await
        .expect("connect to test database; set DATABASE_URL");
    database::run_migrations(&pool)
        .await
        .expect("run migrations against test database");
    pool
}

#[allow(dead_code)]
pub async fn test_state(pool: PgPool) -> AppState {
    let config = AppConfig::from_env().expect("load config from env for tests");
    let redis_pool = database::create_redis_pool(&config.redis).expect("build redis pool; set REDIS_URL");

    let store = Arc::new(CanonicalStore::new(pool.clone()));
    let registry = Arc::new(AdapterRegistry::from_config(&config.platforms));
    let dispatcher = AdaptiveDispatcher::new(redis_pool.clone(), pool.clone(), config.dispatcher.clone());
    let onboarding = Arc::new(OnboardingCoordinator::new(store.clone(), dispatcher.clone()));
    let metrics = Arc::new(MetricsCollector::new().expect("metrics registry init"));

    AppState {
        db_pool: pool,
        redis_pool,
        config: Arc::new(config),
        store,
        registry,
        onboarding,
        dispatcher,
        metrics,
    }
}

/// Inserts a fixture connection row directly (connection creation itself is
/// the external OAuth-callback collaborator's job, out of this crate's scope).
#[allow(dead_code)]
pub async fn insert_connection(
    pool: &PgPool,
    user_id: Uuid,
    platform_kind: PlatformKind,
    status: ConnectionStatus,
    platform_specific_data: serde_json::Value,
) -> PlatformConnection {
    sqlx::query_as::<_, PlatformConnection>(
        "INSERT INTO platform_connections
            (user_id, platform_kind, display_name, credentials_encrypted, status, enabled,
             platform_specific_data, sync_rules)
         VALUES ($1, $2, $3, $4, $5, true, $6, $7)
         RETURNING *",
    )
    .bind(user_id)
    .bind(platform_kind)
    .bind(format!("test {} store", platform_kind))
    .bind(br#"{"accessToken":"test-token"}"#.to_vec())
    .bind(status)
    .bind(platform_specific_data)
    .bind(serde_json::to_value(SyncRules::default()).unwrap())
    .fetch_one(pool)
    .await
    .expect("insert fixture platform connection")
}

#[allow(dead_code)]
pub fn new_user_id() -> Uuid {
    Uuid::new_v4()
}

/// Mints a bearer token verifiable by `middleware::auth` against the same
/// dev secret `AuthConfig::from_env` falls back to.
#[allow(dead_code)]
pub fn mint_bearer_token(jwt_secret: &str, user_id: Uuid) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        iat: now,
        exp: now + 3600,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .expect("encode test jwt")
}

#[allow(dead_code)]
pub fn authenticated(user_id: Uuid) -> AuthenticatedUser {
    AuthenticatedUser { id: user_id }
}
