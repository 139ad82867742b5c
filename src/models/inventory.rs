use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Per (variant, connection, platformLocation) quantity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CanonicalInventoryLevel {
    pub variant_id: Uuid,
    pub connection_id: Uuid,
    pub platform_location_id: String,
    pub quantity: i32,
    pub last_platform_update_at: DateTime<Utc>,
}

impl CanonicalInventoryLevel {
    /// Last-writer-wins per (variantId, connectionId, locationId), discarding
    /// events older than what's already stored (spec §5).
    pub fn should_apply(&self, incoming_updated_at: DateTime<Utc>) -> bool {
        incoming_updated_at >= self.last_platform_update_at
    }
}

#[derive(Debug, Clone)]
pub struct InventoryLevelDraft {
    pub variant_ref: String,
    pub connection_id: Uuid,
    pub platform_location_id: String,
    pub quantity: i32,
    pub last_platform_update_at: DateTime<Utc>,
}
