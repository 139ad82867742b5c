//! Adaptive Dispatcher (spec §4.8): one `Enqueue`/`ProcessNext` interface in
//! front of two backends, switching between them based on sustained load.

use crate::config::DispatcherConfig;
use crate::error::{AppError, Result};
use crate::models::{ConnectionStatus, PlatformConnection};
use chrono::Utc;
use deadpool_redis::Pool as RedisPool;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use uuid::Uuid;

const COLD_QUEUE_KEY: &str = "ultra-low-queue";
const SLIDING_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    InitialScan,
    InitialSync,
    ReconcileConnection,
    MatchJob,
    GenerateJob,
    RegenerateJob,
}

impl JobType {
    fn as_str(&self) -> &'static str {
        match self {
            JobType::InitialScan => "initial-scan",
            JobType::InitialSync => "initial-sync",
            JobType::ReconcileConnection => "reconcile-connection",
            JobType::MatchJob => "match-job",
            JobType::GenerateJob => "generate-job",
            JobType::RegenerateJob => "regenerate-job",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: String,
    pub job_type: JobType,
    pub connection_id: Option<Uuid>,
    pub enqueued_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobProgress {
    pub is_active: bool,
    pub is_completed: bool,
    pub is_failed: bool,
    pub progress: f64,
    pub description: String,
    pub total: Option<u32>,
    pub processed: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DispatchMode {
    Cold,
    Hot,
}

/// Mints `{type}-{connectionId|"no-connection"}-{unixMillis}` (spec §4.8).
fn mint_job_id(job_type: JobType, connection_id: Option<Uuid>) -> String {
    let connection_part = connection_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "no-connection".to_string());
    format!(
        "{}-{}-{}",
        job_type.as_str(),
        connection_part,
        Utc::now().timestamp_millis()
    )
}

/// Parses the connection id back out of a job id minted by `mint_job_id`,
/// used by `GetJobProgress`'s fallback path. A job id is
/// `{type}-{connectionId}-{unixMillis}`, and the uuid itself contains
/// hyphens, so this strips the known type prefix and the trailing millis
/// segment rather than splitting on every `-`.
fn connection_id_from_job_id(job_id: &str) -> Option<Uuid> {
    const JOB_TYPES: &[JobType] = &[
        JobType::InitialScan,
        JobType::InitialSync,
        JobType::ReconcileConnection,
        JobType::MatchJob,
        JobType::GenerateJob,
        JobType::RegenerateJob,
    ];

    let rest = JOB_TYPES
        .iter()
        .find_map(|ty| job_id.strip_prefix(&format!("{}-", ty.as_str())))?;
    let (connection_part, _millis) = rest.rsplit_once('-')?;
    Uuid::parse_str(connection_part).ok()
}

struct SlidingWindow {
    timestamps: VecDeque<std::time::Instant>,
}

impl SlidingWindow {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    fn record(&mut self) {
        let now = std::time::Instant::now();
        self.timestamps.push_back(now);
        self.evict(now);
    }

    fn evict(&mut self, now: std::time::Instant) {
        while let Some(front) = self.timestamps.front() {
            if now.duration_since(*front) > SLIDING_WINDOW {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn requests_per_sec(&self) -> f64 {
        if self.timestamps.len() < 2 {
            return 0.0;
        }
        let span = self
            .timestamps
            .back()
            .unwrap()
            .duration_since(*self.timestamps.front().unwrap())
            .as_secs_f64()
            .max(1.0);
        self.timestamps.len() as f64 / span
    }

    fn count(&self) -> usize {
        self.timestamps.len()
    }

    fn last_enqueue(&self) -> Option<std::time::Instant> {
        self.timestamps.back().copied()
    }
}

/// Cold backend: an ordered in-process list of pending jobs, also mirrored
/// to a durable key so a restart doesn't drop in-flight work.
struct ColdQueue {
    pending: RwLock<VecDeque<QueuedJob>>,
    redis: RedisPool,
}

impl ColdQueue {
    fn new(redis: RedisPool) -> Self {
        Self {
            pending: RwLock::new(VecDeque::new()),
            redis,
        }
    }

    async fn enqueue(&self, job: QueuedJob) -> Result<()> {
        let mut conn = self.redis.get().await.map_err(|e| AppError::RedisOperationFailed(e.to_string()))?;
        let payload = serde_json::to_string(&job)?;
        let _: () = conn.rpush(COLD_QUEUE_KEY, &payload).await?;
        self.pending.write().await.push_back(job);
        Ok(())
    }

    async fn process_next(&self) -> Option<QueuedJob> {
        self.pending.write().await.pop_front()
    }
}

/// Hot backend: a durable distributed work-queue. Jobs are pushed to a Redis
/// list and popped by any worker process; retry/backoff is handled by the
/// caller re-enqueueing on failure (attempts=3, exponential 1s base).
struct HotQueue {
    redis: RedisPool,
}

impl HotQueue {
    fn new(redis: RedisPool) -> Self {
        Self { redis }
    }

    fn queue_key() -> &'static str {
        "sync-engine:hot-queue"
    }

    async fn enqueue(&self, job: QueuedJob) -> Result<()> {
        let mut conn = self.redis.get().await.map_err(|e| AppError::RedisOperationFailed(e.to_string()))?;
        let payload = serde_json::to_string(&job)?;
        let _: () = conn.rpush(Self::queue_key(), &payload).await?;
        Ok(())
    }

    async fn process_next(&self) -> Result<Option<QueuedJob>> {
        let mut conn = self.redis.get().await.map_err(|e| AppError::RedisOperationFailed(e.to_string()))?;
        let payload: Option<String> = conn.lpop(Self::queue_key(), None).await?;
        match payload {
            Some(p) => Ok(Some(serde_json::from_str(&p)?)),
            None => Ok(None),
        }
    }
}

pub struct AdaptiveDispatcher {
    cold: ColdQueue,
    hot: HotQueue,
    db: PgPool,
    mode: RwLock<DispatchMode>,
    window: RwLock<SlidingWindow>,
    config: DispatcherConfig,
}

impl AdaptiveDispatcher {
    pub fn new(redis: RedisPool, db: PgPool, config: DispatcherConfig) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            cold: ColdQueue::new(redis.clone()),
            hot: HotQueue::new(redis),
            db,
            mode: RwLock::new(DispatchMode::Cold),
            window: RwLock::new(SlidingWindow::new()),
            config,
        });

        dispatcher.clone().spawn_idle_checker();
        dispatcher
    }

    /// Idle checker runs at half the idle interval (spec §4.8).
    fn spawn_idle_checker(self: Arc<Self>) {
        let check_every = self.config.scale_down_idle / 2;
        tokio::spawn(async move {
            let mut ticker = interval(check_every.max(Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                self.maybe_scale_down().await;
            }
        });
    }

    async fn maybe_scale_down(&self) {
        let mut mode = self.mode.write().await;
        if *mode != DispatchMode::Hot {
            return;
        }
        let window = self.window.read().await;
        let idle_for = window
            .last_enqueue()
            .map(|t| t.elapsed())
            .unwrap_or(Duration::MAX);

        if idle_for >= self.config.scale_down_idle {
            drop(window);
            *mode = DispatchMode::Cold;
            self.window.write().await.timestamps.clear();
            info!("dispatcher scaled down: hot -> cold");
        }
    }

    async fn maybe_scale_up(&self) {
        let mut mode = self.mode.write().await;
        if *mode != DispatchMode::Cold {
            return;
        }
        let window = self.window.read().await;
        let threshold_total = self.config.threshold_req_per_sec * SLIDING_WINDOW.as_secs_f64();

        if window.count() as f64 >= threshold_total
            && window.requests_per_sec() >= self.config.threshold_req_per_sec
        {
            drop(window);
            *mode = DispatchMode::Hot;
            info!("dispatcher scaled up: cold -> hot");
        }
    }

    pub async fn enqueue(
        &self,
        job_type: JobType,
        connection_id: Option<Uuid>,
        _connection: &PlatformConnection,
    ) -> Result<String> {
        let job_id = mint_job_id(job_type, connection_id);
        let job = QueuedJob {
            id: job_id.clone(),
            job_type,
            connection_id,
            enqueued_at: Utc::now(),
        };

        self.window.write().await.record();
        self.maybe_scale_up().await;

        let mode = *self.mode.read().await;
        match mode {
            DispatchMode::Cold => self.cold.enqueue(job).await?,
            DispatchMode::Hot => self.hot.enqueue(job).await?,
        }

        Ok(job_id)
    }

    pub async fn process_next(&self) -> Result<Option<QueuedJob>> {
        let mode = *self.mode.read().await;
        match mode {
            DispatchMode::Cold => Ok(self.cold.process_next().await),
            DispatchMode::Hot => self.hot.process_next().await,
        }
    }

    /// Falls back to inferring state from the owning connection's status
    /// when the job isn't tracked by either queue backend (spec §4.8).
    pub async fn get_job_progress(&self, job_id: &str) -> Result<JobProgress> {
        let connection_id = connection_id_from_job_id(job_id).ok_or_else(|| AppError::NotFound {
            resource: format!("job {}", job_id),
        })?;

        let connection: PlatformConnection = sqlx::query_as("SELECT * FROM platform_connections WHERE id = $1")
            .bind(connection_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("job {} (connection {} not found)", job_id, connection_id),
            })?;

        let job_started_at = connection
            .platform_specific_data
            .get(crate::models::metadata_keys::JOB_STARTED_AT)
            .and_then(|v| v.as_str())
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(match connection.status {
            ConnectionStatus::NeedsReview | ConnectionStatus::Active => JobProgress {
                is_active: false,
                is_completed: true,
                is_failed: false,
                progress: 1.0,
                description: "completed".to_string(),
                total: None,
                processed: None,
            },
            ConnectionStatus::Error => JobProgress {
                is_active: false,
                is_completed: false,
                is_failed: true,
                progress: 0.0,
                description: "failed".to_string(),
                total: None,
                processed: None,
            },
            ConnectionStatus::Scanning | ConnectionStatus::Syncing | ConnectionStatus::Reconciling => {
                let estimate_minutes = if connection.status == ConnectionStatus::Scanning {
                    3.0
                } else {
                    5.0
                };
                let elapsed_minutes = job_started_at
                    .map(|started| (Utc::now() - started).num_seconds() as f64 / 60.0)
                    .unwrap_or(0.0);
                let progress = (elapsed_minutes / estimate_minutes).min(0.95).max(0.0);

                JobProgress {
                    is_active: true,
                    is_completed: false,
                    is_failed: false,
                    progress,
                    description: format!("{} in progress", connection.status),
                    total: None,
                    processed: None,
                }
            }
            _ => {
                warn!(job_id, status = %connection.status, "job progress requested for unexpected connection status");
                JobProgress {
                    is_active: false,
                    is_completed: false,
                    is_failed: false,
                    progress: 0.0,
                    description: "unknown".to_string(),
                    total: None,
                    processed: None,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_job_id_uses_no_connection_placeholder() {
        let id = mint_job_id(JobType::InitialScan, None);
        assert!(id.starts_with("initial-scan-no-connection-"));
    }

    #[test]
    fn test_job_id_roundtrips_connection_id() {
        let connection_id = Uuid::new_v4();
        let id = mint_job_id(JobType::InitialSync, Some(connection_id));
        assert_eq!(connection_id_from_job_id(&id), Some(connection_id));
    }

    #[test]
    fn test_sliding_window_requests_per_sec_empty() {
        let window = SlidingWindow::new();
        assert_eq!(window.requests_per_sec(), 0.0);
    }
}
