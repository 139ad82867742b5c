use std::sync::Arc;
use std::time::Duration;
use sync_engine::adapters::AdapterRegistry;
use sync_engine::dispatcher::{AdaptiveDispatcher, JobType};
use sync_engine::jobs::{self, JobContext};
use sync_engine::onboarding::OnboardingCoordinator;
use sync_engine::store::CanonicalStore;
use sync_engine::{create_router, database, metrics::MetricsCollector, AppConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("configuration error: {}", e))?;

    let db_pool = database::create_pool(&config.database).await?;
    database::run_migrations(&db_pool).await?;
    let redis_pool = database::create_redis_pool(&config.redis)?;

    let store = Arc::new(CanonicalStore::new(db_pool.clone()));
    let registry = Arc::new(AdapterRegistry::from_config(&config.platforms));
    let dispatcher = AdaptiveDispatcher::new(redis_pool.clone(), db_pool.clone(), config.dispatcher.clone());
    let onboarding = Arc::new(OnboardingCoordinator::new(store.clone(), dispatcher.clone()));
    let metrics = Arc::new(MetricsCollector::new().map_err(|e| anyhow::anyhow!("metrics init failed: {}", e))?);

    let job_context = JobContext {
        store: store.clone(),
        registry: registry.clone(),
        onboarding: onboarding.clone(),
    };
    spawn_job_worker(dispatcher.clone(), job_context);

    let bind_address = config.server.bind_address();
    let state = AppState {
        db_pool,
        redis_pool,
        config: Arc::new(config),
        store,
        registry,
        onboarding,
        dispatcher,
        metrics,
    };

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!(address = %bind_address, "sync-engine listening");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Pops queued jobs off the dispatcher and routes them to their handler
/// (spec §4.8). Runs for the lifetime of the process; an empty queue just
/// means a short backoff before polling again.
fn spawn_job_worker(dispatcher: Arc<AdaptiveDispatcher>, ctx: JobContext) {
    tokio::spawn(async move {
        loop {
            match dispatcher.process_next().await {
                Ok(Some(job)) => {
                    let Some(connection_id) = job.connection_id else {
                        tracing::warn!(job_id = %job.id, "dropping job with no connection id");
                        continue;
                    };

                    let result = match job.job_type {
                        JobType::InitialScan => jobs::scan::run(&ctx, connection_id).await,
                        JobType::InitialSync => jobs::sync::run(&ctx, connection_id).await,
                        JobType::ReconcileConnection => jobs::reconcile::run(&ctx, connection_id).await,
                        // MatchJob/GenerateJob/RegenerateJob back a future
                        // content-generation pipeline outside this crate's
                        // scope; the dispatcher never enqueues them today.
                        JobType::MatchJob | JobType::GenerateJob | JobType::RegenerateJob => {
                            tracing::warn!(job_id = %job.id, job_type = ?job.job_type, "no handler for job type");
                            continue;
                        }
                    };

                    if let Err(err) = result {
                        tracing::error!(job_id = %job.id, connection_id = %connection_id, error = %err, "job failed");
                    }
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to pop next job");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });
}
