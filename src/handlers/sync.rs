//! Sync Onboarding & Job API Handlers (spec §6): scan, mapping review, and
//! sync activation for a single platform connection.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatcher::JobProgress;
use crate::error::{AppError, Result};
use crate::models::{
    metadata_keys, AuthenticatedUser, ConfirmedAction, ConfirmedMatch, MappingConfirmations,
    MappingSuggestion, PlatformConnection,
};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct JobIdResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSummaryResponse {
    pub count_products: u64,
    pub count_variants: u64,
    pub count_locations: u64,
}

#[derive(Debug, Deserialize)]
pub struct MappingConfirmationsRequest {
    pub confirmed_matches: Vec<ConfirmedMatch>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPreviewResponse {
    pub actions: Vec<SyncPreviewAction>,
}

#[derive(Debug, Serialize)]
pub struct SyncPreviewAction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub description: String,
}

async fn owned_connection(
    state: &AppState,
    connection_id: Uuid,
    user: &AuthenticatedUser,
) -> Result<PlatformConnection> {
    let connection = state.store.get_connection(connection_id).await?;
    if connection.user_id != user.id {
        return Err(AppError::NotFound {
            resource: format!("platform_connection {}", connection_id),
        });
    }
    Ok(connection)
}

/// `POST /sync/connections/:id/start-scan` → `{jobId}`.
pub async fn start_scan_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<JobIdResponse>> {
    owned_connection(&state, connection_id, &user).await?;
    let job_id = state.onboarding.start_scan(connection_id).await?;
    Ok(Json(JobIdResponse { job_id }))
}

/// `GET /sync/connections/:id/scan-summary` → `{countProducts, countVariants, countLocations}`.
pub async fn scan_summary_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<ScanSummaryResponse>> {
    let connection = owned_connection(&state, connection_id, &user).await?;

    let summary = connection
        .platform_specific_data
        .get(metadata_keys::SCAN_SUMMARY)
        .cloned()
        .ok_or_else(|| AppError::NotFound {
            resource: format!("scan summary for connection {}", connection_id),
        })?;

    Ok(Json(ScanSummaryResponse {
        count_products: summary.get("countProducts").and_then(|v| v.as_u64()).unwrap_or(0),
        count_variants: summary.get("countVariants").and_then(|v| v.as_u64()).unwrap_or(0),
        count_locations: summary.get("countLocations").and_then(|v| v.as_u64()).unwrap_or(0),
    }))
}

/// `GET /sync/connections/:id/mapping-suggestions` → `MappingSuggestion[]`.
pub async fn mapping_suggestions_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<MappingSuggestion>>> {
    let connection = owned_connection(&state, connection_id, &user).await?;

    let suggestions: Vec<MappingSuggestion> = connection
        .platform_specific_data
        .get(metadata_keys::MAPPING_SUGGESTIONS)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    Ok(Json(suggestions))
}

/// `GET /sync/connections/:id/draft-mappings` → `{confirmedMatches, updatedAt?}`.
pub async fn get_draft_mappings_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<MappingConfirmations>> {
    let connection = owned_connection(&state, connection_id, &user).await?;

    let drafts: MappingConfirmations = connection
        .platform_specific_data
        .get(metadata_keys::MAPPING_DRAFTS)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_else(empty_confirmations);

    Ok(Json(drafts))
}

/// `PUT /sync/connections/:id/draft-mappings` → `204`, no side effects.
pub async fn put_draft_mappings_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(request): Json<MappingConfirmationsRequest>,
) -> Result<StatusCode> {
    owned_connection(&state, connection_id, &user).await?;

    let drafts = MappingConfirmations {
        confirmed_matches: request.confirmed_matches,
        updated_at: Utc::now(),
    };

    state
        .store
        .merge_platform_specific_data(
            connection_id,
            serde_json::json!({ metadata_keys::MAPPING_DRAFTS: drafts }),
        )
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// `POST /sync/connections/:id/confirm-mappings` → `{success:true}`.
///
/// Commits the caller's decisions to the key the initial-sync job reads;
/// this alone transitions nothing (spec §6). Writing the same payload twice
/// is a no-op beyond `updatedAt` moving forward (idempotent confirm, §8).
pub async fn confirm_mappings_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(request): Json<MappingConfirmationsRequest>,
) -> Result<Json<serde_json::Value>> {
    let connection = owned_connection(&state, connection_id, &user).await?;
    let sync_rules = connection.sync_rules();

    for confirmed in &request.confirmed_matches {
        if confirmed.action == ConfirmedAction::Create && confirmed.platform_snapshot.is_none() {
            return Err(AppError::InvalidFieldValue {
                field: "confirmedMatches".to_string(),
                message: format!(
                    "create action for platform product {} requires a platformSnapshot",
                    confirmed.platform_product_id
                ),
            });
        }
        if confirmed.action == ConfirmedAction::Create && !sync_rules.create_new {
            return Err(AppError::InvalidFieldValue {
                field: "confirmedMatches".to_string(),
                message: format!(
                    "create action for platform product {} is rejected because this connection's sync rules have createNew=false",
                    confirmed.platform_product_id
                ),
            });
        }
    }

    let confirmations = MappingConfirmations {
        confirmed_matches: request.confirmed_matches,
        updated_at: Utc::now(),
    };

    state
        .store
        .merge_platform_specific_data(
            connection_id,
            serde_json::json!({ metadata_keys::MAPPING_CONFIRMATIONS: confirmations }),
        )
        .await?;

    Ok(Json(serde_json::json!({ "success": true })))
}

/// `GET /sync/connections/:id/sync-preview` → `{actions:[{type,description}]}`.
pub async fn sync_preview_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<SyncPreviewResponse>> {
    let connection = owned_connection(&state, connection_id, &user).await?;

    let confirmations: MappingConfirmations = connection
        .platform_specific_data
        .get(metadata_keys::MAPPING_CONFIRMATIONS)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_else(empty_confirmations);

    let actions = confirmations
        .confirmed_matches
        .iter()
        .map(|m| match m.action {
            ConfirmedAction::Link => SyncPreviewAction {
                kind: "link",
                description: format!(
                    "link platform product {} to existing canonical variant",
                    m.platform_product_id
                ),
            },
            ConfirmedAction::Create => SyncPreviewAction {
                kind: "create",
                description: format!(
                    "create a new canonical variant for platform product {}",
                    m.platform_product_id
                ),
            },
            ConfirmedAction::Ignore => SyncPreviewAction {
                kind: "ignore",
                description: format!(
                    "leave platform product {} unmapped",
                    m.platform_product_id
                ),
            },
        })
        .collect();

    Ok(Json(SyncPreviewResponse { actions }))
}

/// `POST /sync/connections/:id/activate-sync` → `{jobId}`; idempotent re-issue
/// if already syncing.
pub async fn activate_sync_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<Json<JobIdResponse>> {
    owned_connection(&state, connection_id, &user).await?;
    let job_id = state.onboarding.activate_sync(connection_id).await?;
    Ok(Json(JobIdResponse { job_id }))
}

/// `GET /sync/jobs/:jobId/progress` → progress object (spec §4.8).
pub async fn job_progress_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    _user: AuthenticatedUser,
) -> Result<Json<JobProgress>> {
    let progress = state.dispatcher.get_job_progress(&job_id).await?;
    Ok(Json(progress))
}

/// `POST /sync/connection/:id/reconcile` → `202 {jobId}`.
pub async fn reconcile_handler(
    State(state): State<AppState>,
    Path(connection_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> Result<(StatusCode, Json<JobIdResponse>)> {
    owned_connection(&state, connection_id, &user).await?;
    let job_id = state.onboarding.start_reconcile(connection_id).await?;
    Ok((StatusCode::ACCEPTED, Json(JobIdResponse { job_id })))
}

fn empty_confirmations() -> MappingConfirmations {
    MappingConfirmations {
        confirmed_matches: Vec::new(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_preview_action_descriptions_are_distinct_per_kind() {
        let link = SyncPreviewAction {
            kind: "link",
            description: "link platform product p1 to existing canonical variant".to_string(),
        };
        let create = SyncPreviewAction {
            kind: "create",
            description: "create a new canonical variant for platform product p1".to_string(),
        };
        assert_ne!(link.kind, create.kind);
    }

    #[test]
    fn test_empty_confirmations_has_no_matches() {
        assert!(empty_confirmations().confirmed_matches.is_empty());
    }
}
