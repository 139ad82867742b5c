//! Liveness/readiness checks for the sync engine's dependencies.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    pub memory_usage_mb: u64,
    pub cpu_usage_percent: f32,
    pub disk_usage_percent: f32,
    pub active_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub correlation_id: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub services: HashMap<String, ServiceCheck>,
    pub system_info: SystemInfo,
}

#[derive(Debug, Clone)]
pub struct HealthCheckConfig {
    pub timeout: Duration,
    pub include_system_info: bool,
    pub detailed_checks: bool,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            include_system_info: true,
            detailed_checks: true,
        }
    }
}

/// Probes Postgres and Redis and folds the results into an overall status.
pub struct HealthChecker {
    config: HealthCheckConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    pub async fn check_health(
        &self,
        db_pool: &sqlx::PgPool,
        redis_pool: &deadpool_redis::Pool,
    ) -> HealthCheckResponse {
        let mut services = HashMap::new();

        services.insert("database".to_string(), self.check_database(db_pool).await);
        services.insert("redis".to_string(), self.check_redis(redis_pool).await);

        let status = services
            .values()
            .map(|check| check.status)
            .fold(HealthStatus::Healthy, |acc, status| match (acc, status) {
                (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => {
                    HealthStatus::Unhealthy
                }
                (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => {
                    HealthStatus::Degraded
                }
                _ => HealthStatus::Healthy,
            });

        HealthCheckResponse {
            status,
            timestamp: chrono::Utc::now(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            services,
            system_info: self.system_info(db_pool, redis_pool),
        }
    }

    /// Cheap check for the liveness probe: does the process respond at all.
    pub fn check_liveness(&self) -> HealthStatus {
        HealthStatus::Healthy
    }

    async fn check_database(&self, pool: &sqlx::PgPool) -> ServiceCheck {
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.timeout, sqlx::query("SELECT 1").execute(pool)).await;

        match result {
            Ok(Ok(_)) => ServiceCheck {
                status: HealthStatus::Healthy,
                latency_ms: started.elapsed().as_millis() as u64,
                message: None,
            },
            Ok(Err(err)) => {
                warn!(error = %err, "database health check failed");
                ServiceCheck {
                    status: HealthStatus::Unhealthy,
                    latency_ms: started.elapsed().as_millis() as u64,
                    message: Some(err.to_string()),
                }
            }
            Err(_) => ServiceCheck {
                status: HealthStatus::Unhealthy,
                latency_ms: self.config.timeout.as_millis() as u64,
                message: Some("database health check timed out".to_string()),
            },
        }
    }

    async fn check_redis(&self, pool: &deadpool_redis::Pool) -> ServiceCheck {
        let started = Instant::now();
        let result = tokio::time::timeout(self.config.timeout, async {
            let mut conn = pool.get().await?;
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await
        })
        .await;

        match result {
            Ok(Ok(_)) => ServiceCheck {
                status: HealthStatus::Healthy,
                latency_ms: started.elapsed().as_millis() as u64,
                message: None,
            },
            Ok(Err(err)) => {
                warn!(error = %err, "redis health check failed");
                ServiceCheck {
                    status: HealthStatus::Degraded,
                    latency_ms: started.elapsed().as_millis() as u64,
                    message: Some(err.to_string()),
                }
            }
            Err(_) => ServiceCheck {
                status: HealthStatus::Degraded,
                latency_ms: self.config.timeout.as_millis() as u64,
                message: Some("redis health check timed out".to_string()),
            },
        }
    }

    fn system_info(&self, db_pool: &sqlx::PgPool, redis_pool: &deadpool_redis::Pool) -> SystemInfo {
        if !self.config.include_system_info {
            return SystemInfo {
                memory_usage_mb: 0,
                cpu_usage_percent: 0.0,
                disk_usage_percent: 0.0,
                active_connections: 0,
            };
        }

        let mut sys = sysinfo::System::new_all();
        sys.refresh_all();

        let db_active = (db_pool.size() as usize).saturating_sub(db_pool.num_idle());
        let redis_status = redis_pool.status();
        let redis_active = redis_status.size.saturating_sub(redis_status.available);

        SystemInfo {
            memory_usage_mb: sys.used_memory() / 1024 / 1024,
            cpu_usage_percent: sys.global_cpu_info().cpu_usage(),
            disk_usage_percent: 0.0,
            active_connections: (db_active + redis_active) as u32,
        }
    }
}

/// Readiness for a Kubernetes-style probe: both dependencies must answer.
pub async fn readiness_check(db_pool: &sqlx::PgPool, redis_pool: &deadpool_redis::Pool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(db_pool)
        .await
        .map_err(AppError::DatabaseQueryFailed)?;

    let mut conn = redis_pool
        .get()
        .await
        .map_err(|e| AppError::RedisOperationFailed(e.to_string()))?;
    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .map_err(|e| AppError::RedisOperationFailed(e.to_string()))?;

    Ok(())
}

/// Liveness is process-level: if this function runs at all, the process is alive.
pub async fn liveness_check() -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_is_always_healthy() {
        let checker = HealthChecker::new(HealthCheckConfig::default());
        assert_eq!(checker.check_liveness(), HealthStatus::Healthy);
    }

    #[test]
    fn test_status_fold_prefers_unhealthy() {
        let statuses = vec![HealthStatus::Healthy, HealthStatus::Unhealthy, HealthStatus::Degraded];
        let folded = statuses
            .into_iter()
            .fold(HealthStatus::Healthy, |acc, status| match (acc, status) {
                (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => {
                    HealthStatus::Unhealthy
                }
                (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => {
                    HealthStatus::Degraded
                }
                _ => HealthStatus::Healthy,
            });
        assert_eq!(folded, HealthStatus::Unhealthy);
    }
}
