//! Onboarding Coordinator (spec §4.3): enforces the connection status state
//! machine and idempotent job (re-)issuance.

use crate::dispatcher::{AdaptiveDispatcher, JobType};
use crate::error::{AppError, Result};
use crate::models::{metadata_keys, ConnectionStatus, PlatformConnection};
use crate::store::CanonicalStore;
use std::sync::Arc;
use uuid::Uuid;

pub struct OnboardingCoordinator {
    store: Arc<CanonicalStore>,
    dispatcher: Arc<AdaptiveDispatcher>,
}

impl OnboardingCoordinator {
    pub fn new(store: Arc<CanonicalStore>, dispatcher: Arc<AdaptiveDispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// `pending|needs_review|error|active → scanning`. Re-issuing while
    /// already scanning returns the existing job id (spec §4.3 idempotency).
    pub async fn start_scan(&self, connection_id: Uuid) -> Result<String> {
        let connection = self.store.get_connection(connection_id).await?;

        if connection.status == ConnectionStatus::Scanning {
            return connection.current_job_id().ok_or_else(|| AppError::DataIntegrityViolation {
                message: format!(
                    "connection {} is scanning but has no currentJobId",
                    connection_id
                ),
            });
        }

        if !connection.status.can_start_scan() {
            return Err(AppError::OperationNotAllowed {
                reason: format!(
                    "cannot start scan from status {}",
                    connection.status
                ),
            });
        }

        let job_id = self
            .dispatcher
            .enqueue(JobType::InitialScan, Some(connection_id), &connection)
            .await?;

        self.store
            .transition_status(connection_id, &[connection.status], ConnectionStatus::Scanning)
            .await?;
        self.store
            .merge_platform_specific_data(
                connection_id,
                serde_json::json!({
                    metadata_keys::CURRENT_JOB_ID: job_id,
                    metadata_keys::JOB_STARTED_AT: chrono::Utc::now(),
                    metadata_keys::JOB_TYPE: "initial-scan",
                }),
            )
            .await?;

        Ok(job_id)
    }

    /// `needs_review → syncing`. Re-issuing while already syncing returns the
    /// existing job id.
    pub async fn activate_sync(&self, connection_id: Uuid) -> Result<String> {
        let connection = self.store.get_connection(connection_id).await?;

        if connection.status == ConnectionStatus::Syncing {
            return connection.current_job_id().ok_or_else(|| AppError::DataIntegrityViolation {
                message: format!(
                    "connection {} is syncing but has no currentJobId",
                    connection_id
                ),
            });
        }

        if !connection.status.can_activate_sync() {
            return Err(AppError::OperationNotAllowed {
                reason: format!(
                    "cannot activate sync from status {}",
                    connection.status
                ),
            });
        }

        let job_id = self
            .dispatcher
            .enqueue(JobType::InitialSync, Some(connection_id), &connection)
            .await?;

        self.store
            .transition_status(connection_id, &[connection.status], ConnectionStatus::Syncing)
            .await?;
        self.store
            .merge_platform_specific_data(
                connection_id,
                serde_json::json!({
                    metadata_keys::CURRENT_JOB_ID: job_id,
                    metadata_keys::JOB_STARTED_AT: chrono::Utc::now(),
                    metadata_keys::JOB_TYPE: "initial-sync",
                }),
            )
            .await?;

        Ok(job_id)
    }

    /// `active → reconciling`, invoked by the periodic scheduler.
    pub async fn start_reconcile(&self, connection_id: Uuid) -> Result<String> {
        let connection = self.store.get_connection(connection_id).await?;

        let job_id = self
            .dispatcher
            .enqueue(JobType::ReconcileConnection, Some(connection_id), &connection)
            .await?;

        self.store
            .transition_status(
                connection_id,
                &[ConnectionStatus::Active],
                ConnectionStatus::Reconciling,
            )
            .await?;

        Ok(job_id)
    }

    /// `any → inactive`; a running job observes this on its next loop
    /// iteration and aborts cleanly (spec §5).
    pub async fn disconnect(&self, connection_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE platform_connections SET enabled = false, status = $1, updated_at = now() WHERE id = $2")
            .bind(ConnectionStatus::Inactive)
            .bind(connection_id)
            .execute(self.store.pool())
            .await?;
        Ok(())
    }

    /// Called by a job on success/failure to close out its status transition.
    pub async fn complete_scan(&self, connection_id: Uuid, succeeded: bool) -> Result<()> {
        let target = if succeeded {
            ConnectionStatus::NeedsReview
        } else {
            ConnectionStatus::Error
        };
        self.store
            .transition_status(connection_id, &[ConnectionStatus::Scanning], target)
            .await?;
        Ok(())
    }

    pub async fn complete_sync(&self, connection_id: Uuid, item_failures: u32) -> Result<()> {
        let target = if item_failures == 0 {
            ConnectionStatus::Active
        } else {
            ConnectionStatus::Error
        };
        self.store
            .transition_status(connection_id, &[ConnectionStatus::Syncing], target)
            .await?;
        Ok(())
    }

    pub async fn complete_reconcile(&self, connection_id: Uuid, succeeded: bool) -> Result<()> {
        let target = if succeeded {
            ConnectionStatus::Active
        } else {
            ConnectionStatus::Error
        };
        self.store
            .transition_status(connection_id, &[ConnectionStatus::Reconciling], target)
            .await?;
        Ok(())
    }

    /// Checked by a running job's outer loop to detect a user disconnect
    /// mid-job (spec §5's cooperative cancellation).
    pub async fn should_continue(&self, connection: &PlatformConnection) -> bool {
        match self.store.get_connection(connection.id).await {
            Ok(fresh) => fresh.status != ConnectionStatus::Inactive,
            Err(_) => false,
        }
    }
}
