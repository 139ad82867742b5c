use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Info,
    Warning,
    Error,
}

/// Append-only audit entry. `LogActivity` never blocks or fails the caller
/// beyond logging the failure itself (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: String,
    pub status: ActivityStatus,
    pub message: String,
    pub connection_id: Option<Uuid>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ActivityLogEntry {
    pub user_id: Uuid,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: String,
    pub status: ActivityStatus,
    pub message: String,
    pub connection_id: Option<Uuid>,
    pub details: serde_json::Value,
}

/// Well-known event types used across jobs and the webhook dispatcher.
pub mod event_types {
    pub const RECONCILE_NEW_PRODUCT: &str = "RECONCILE_NEW_PRODUCT";
    pub const RECONCILE_MISSING_PRODUCT: &str = "RECONCILE_MISSING_PRODUCT";
    pub const WEBHOOK_RECEIVED: &str = "WEBHOOK_RECEIVED";
    pub const WEBHOOK_PROCESSED: &str = "WEBHOOK_PROCESSED";
    pub const WEBHOOK_PROCESSING_FAILED: &str = "WEBHOOK_PROCESSING_FAILED";
    pub const MISSING_PLATFORM_DATA: &str = "MISSING_PLATFORM_DATA";
    pub const USER_CONFIRMED_IGNORE: &str = "UserConfirmedIgnore";
    pub const DUPLICATE: &str = "duplicate";
}
