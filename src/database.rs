//! Database and Redis pool construction.

use crate::config::{DatabaseSettings, RedisSettings};
use crate::error::{AppError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub type DatabaseConfig = DatabaseSettings;
pub type RedisConfiguration = RedisSettings;

/// Build a Postgres connection pool from settings.
pub async fn create_pool(settings: &DatabaseSettings) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.connection_timeout)
        .idle_timeout(settings.idle_timeout)
        .connect(&settings.url)
        .await
        .map_err(AppError::from)
}

/// Build a Redis connection pool from settings.
pub fn create_redis_pool(settings: &RedisSettings) -> Result<deadpool_redis::Pool> {
    let cfg = deadpool_redis::Config::from_url(settings.url.clone());
    cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| AppError::ConfigurationError {
            message: format!("failed to build redis pool: {}", e),
        })
}

/// Run pending sqlx migrations against the given pool.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::ConfigurationError {
            message: format!("migration failed: {}", e),
        })
}

/// Simple connectivity check used by the health and readiness endpoints.
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

pub async fn redis_health_check(redis_pool: &deadpool_redis::Pool) -> Result<()> {
    let mut conn = redis_pool
        .get()
        .await
        .map_err(|e| AppError::RedisOperationFailed(e.to_string()))?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
}

/// Seed a minimal fixture row set for integration tests.
#[cfg(any(test, feature = "legacy-integration-tests"))]
pub async fn seed_test_data(_pool: &PgPool) -> Result<()> {
    Ok(())
}
