use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The platforms a seller can connect. `Csv` exists for manual/offline import
/// and carries no adapter of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    Shopify,
    Square,
    Clover,
    Ebay,
    Facebook,
    Whatnot,
    Csv,
}

impl PlatformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformKind::Shopify => "shopify",
            PlatformKind::Square => "square",
            PlatformKind::Clover => "clover",
            PlatformKind::Ebay => "ebay",
            PlatformKind::Facebook => "facebook",
            PlatformKind::Whatnot => "whatnot",
            PlatformKind::Csv => "csv",
        }
    }
}

impl std::fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Onboarding Coordinator state (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Pending,
    Scanning,
    NeedsReview,
    Syncing,
    Active,
    Reconciling,
    Error,
    Inactive,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Scanning => "scanning",
            ConnectionStatus::NeedsReview => "needs_review",
            ConnectionStatus::Syncing => "syncing",
            ConnectionStatus::Active => "active",
            ConnectionStatus::Reconciling => "reconciling",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Inactive => "inactive",
        }
    }

    /// States from which `start-scan` is accepted (spec §4.3 transition table).
    pub fn can_start_scan(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Pending
                | ConnectionStatus::NeedsReview
                | ConnectionStatus::Error
                | ConnectionStatus::Active
        )
    }

    pub fn can_activate_sync(&self) -> bool {
        matches!(self, ConnectionStatus::NeedsReview)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sync rules (spec §4.5).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRules {
    pub product_details_sot: SourceOfTruth,
    pub inventory_sot: SourceOfTruth,
    pub create_new: bool,
    pub delist_when_zero: bool,
}

impl Default for SyncRules {
    fn default() -> Self {
        Self {
            product_details_sot: SourceOfTruth::Platform,
            inventory_sot: SourceOfTruth::Platform,
            create_new: true,
            delist_when_zero: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceOfTruth {
    Platform,
    #[serde(rename = "SSSYNC")]
    Canonical,
}

/// Reserved keys in `PlatformConnection::platform_specific_data` (spec §6).
pub mod metadata_keys {
    pub const SHOP: &str = "shop";
    pub const MERCHANT_ID: &str = "merchantId";
    pub const SCAN_SUMMARY: &str = "scanSummary";
    pub const MAPPING_SUGGESTIONS: &str = "mappingSuggestions";
    pub const MAPPING_CONFIRMATIONS: &str = "mappingConfirmations";
    pub const MAPPING_DRAFTS: &str = "mappingDrafts";
    pub const CURRENT_JOB_ID: &str = "currentJobId";
    pub const JOB_STARTED_AT: &str = "jobStartedAt";
    pub const JOB_TYPE: &str = "jobType";
}

/// A user's linked account on one platform.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PlatformConnection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub platform_kind: PlatformKind,
    pub display_name: String,
    /// Opaque ciphertext; only `CanonicalStore::decrypt` may open it (spec §9).
    pub credentials_encrypted: Vec<u8>,
    pub status: ConnectionStatus,
    pub enabled: bool,
    /// Schemaless bag; see `metadata_keys` for reserved keys.
    pub platform_specific_data: serde_json::Value,
    pub sync_rules: serde_json::Value,
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    pub last_sync_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlatformConnection {
    pub fn sync_rules(&self) -> SyncRules {
        serde_json::from_value(self.sync_rules.clone()).unwrap_or_default()
    }

    pub fn current_job_id(&self) -> Option<String> {
        self.platform_specific_data
            .get(metadata_keys::CURRENT_JOB_ID)
            .and_then(|v| v.as_str())
            .map(String::from)
    }

    /// The platform-specific unique identifier used for connection dedup
    /// (spec §3: shop domain for Shopify, merchantId for Square/Clover).
    pub fn unique_identifier(&self) -> Option<String> {
        let key = match self.platform_kind {
            PlatformKind::Shopify => metadata_keys::SHOP,
            PlatformKind::Square | PlatformKind::Clover => metadata_keys::MERCHANT_ID,
            _ => return None,
        };
        self.platform_specific_data
            .get(key)
            .and_then(|v| v.as_str())
            .map(String::from)
    }
}

/// Non-secret view returned by `GET /platform-connections`.
#[derive(Debug, Serialize)]
pub struct PlatformConnectionResponse {
    pub id: Uuid,
    pub platform_kind: PlatformKind,
    pub display_name: String,
    pub status: ConnectionStatus,
    pub enabled: bool,
    pub last_sync_attempt_at: Option<DateTime<Utc>>,
    pub last_sync_success_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<PlatformConnection> for PlatformConnectionResponse {
    fn from(c: PlatformConnection) -> Self {
        Self {
            id: c.id,
            platform_kind: c.platform_kind,
            display_name: c.display_name,
            status: c.status,
            enabled: c.enabled,
            last_sync_attempt_at: c.last_sync_attempt_at,
            last_sync_success_at: c.last_sync_success_at,
            created_at: c.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_start_scan_transitions() {
        assert!(ConnectionStatus::Pending.can_start_scan());
        assert!(ConnectionStatus::NeedsReview.can_start_scan());
        assert!(ConnectionStatus::Error.can_start_scan());
        assert!(ConnectionStatus::Active.can_start_scan());
        assert!(!ConnectionStatus::Scanning.can_start_scan());
        assert!(!ConnectionStatus::Syncing.can_start_scan());
        assert!(!ConnectionStatus::Inactive.can_start_scan());
    }

    #[test]
    fn test_default_sync_rules_overlay_platform() {
        let rules = SyncRules::default();
        assert_eq!(rules.product_details_sot, SourceOfTruth::Platform);
        assert_eq!(rules.inventory_sot, SourceOfTruth::Platform);
        assert!(rules.create_new);
        assert!(!rules.delist_when_zero);
    }
}
