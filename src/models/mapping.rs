use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "PascalCase")]
#[serde(rename_all = "PascalCase")]
pub enum MappingSyncStatus {
    Linked,
    Synced,
    Pending,
    Ignored,
    Error,
}

/// The canonical <-> platform link.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformProductMapping {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub variant_id: Uuid,
    pub platform_product_id: String,
    pub platform_variant_id: Option<String>,
    pub platform_sku: Option<String>,
    pub sync_status: MappingSyncStatus,
    pub is_enabled: bool,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub platform_specific_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct MappingPatch {
    pub sync_status: Option<MappingSyncStatus>,
    pub is_enabled: Option<bool>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub platform_specific_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchType {
    Sku,
    Barcode,
    None,
}

/// A snapshot of the platform item a suggestion or confirmation refers to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformProductSnapshot {
    pub platform_product_id: String,
    pub platform_variant_id: Option<String>,
    pub platform_sku: Option<String>,
    pub platform_title: Option<String>,
    pub platform_barcode: Option<String>,
    pub raw: serde_json::Value,
}

/// Transient proposal produced by the Mapping Engine; stored as an array on
/// the connection's metadata bag (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSuggestion {
    pub platform_product_snapshot: PlatformProductSnapshot,
    pub suggested_variant_id: Option<Uuid>,
    pub match_type: MatchType,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmedAction {
    Link,
    Create,
    Ignore,
}

/// A user decision on a suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmedMatch {
    pub platform_product_id: String,
    pub platform_variant_id: Option<String>,
    pub platform_sku: Option<String>,
    pub platform_title: Option<String>,
    pub sssync_variant_id: Option<Uuid>,
    pub action: ConfirmedAction,
    /// Present for `create`; the engine requires it and skips the item with
    /// `missing_platform_data` if absent (spec §4.5).
    pub platform_snapshot: Option<PlatformProductSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingConfirmations {
    pub confirmed_matches: Vec<ConfirmedMatch>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}
