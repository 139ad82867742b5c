//! Canonical Store Gateway (spec §4.2): the only component that talks to
//! Postgres on behalf of jobs, handlers, and adapters.

use crate::error::{AppError, Result};
use crate::models::{
    ActivityLogEntry, CanonicalInventoryLevel, CanonicalProduct, CanonicalProductVariant,
    InventoryLevelDraft, MappingPatch, MappingSyncStatus, PlatformConnection,
    PlatformProductMapping, ProductDraft, VariantDraft,
};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::warn;
use uuid::Uuid;

#[derive(Clone)]
pub struct CanonicalStore {
    pool: PgPool,
}

impl CanonicalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -- Connections ---------------------------------------------------

    pub async fn get_connection(&self, id: Uuid) -> Result<PlatformConnection> {
        sqlx::query_as::<_, PlatformConnection>(
            "SELECT * FROM platform_connections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("platform_connection {}", id),
        })
    }

    pub async fn list_connections(&self, user_id: Uuid) -> Result<Vec<PlatformConnection>> {
        Ok(sqlx::query_as::<_, PlatformConnection>(
            "SELECT * FROM platform_connections WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Webhook connection resolution fallback (spec §4.7 step 5): looked up
    /// by (platformKind, shop-or-merchant identifier) when the path has no
    /// explicit connectionId.
    pub async fn find_connection_by_identifier(
        &self,
        platform_kind: crate::models::PlatformKind,
        key: &str,
        identifier: &str,
    ) -> Result<PlatformConnection> {
        sqlx::query_as::<_, PlatformConnection>(
            "SELECT * FROM platform_connections
             WHERE platform_kind = $1 AND platform_specific_data ->> $2 = $3",
        )
        .bind(platform_kind)
        .bind(key)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("platform_connection for {} {}", platform_kind, identifier),
        })
    }

    /// Compare-and-set status transition; returns `Conflict` if the row's
    /// status moved out from under us (spec §5's writer-coordination policy).
    pub async fn transition_status(
        &self,
        id: Uuid,
        expected_current: &[crate::models::ConnectionStatus],
        new_status: crate::models::ConnectionStatus,
    ) -> Result<PlatformConnection> {
        let statuses: Vec<String> = expected_current.iter().map(|s| s.to_string()).collect();
        let row = sqlx::query_as::<_, PlatformConnection>(
            "UPDATE platform_connections
             SET status = $1, updated_at = now()
             WHERE id = $2 AND status = ANY($3)
             RETURNING *",
        )
        .bind(new_status)
        .bind(id)
        .bind(&statuses)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(AppError::Conflict {
            message: format!("connection {} is not in an expected prior state", id),
        })
    }

    pub async fn merge_platform_specific_data(
        &self,
        id: Uuid,
        patch: serde_json::Value,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE platform_connections
             SET platform_specific_data = platform_specific_data || $1, updated_at = now()
             WHERE id = $2",
        )
        .bind(patch)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Opaque boundary over the connection's encrypted credentials blob
    /// (spec §9): decrypted per-request, never cached or logged.
    pub fn decrypt(&self, connection: &PlatformConnection) -> Result<HashMap<String, serde_json::Value>> {
        let plaintext = String::from_utf8(connection.credentials_encrypted.clone())
            .map_err(|_| AppError::DataIntegrityViolation {
                message: "credentials blob is not valid utf-8".to_string(),
            })?;
        serde_json::from_str(&plaintext).map_err(|_| AppError::DataIntegrityViolation {
            message: "credentials blob is not valid json".to_string(),
        })
    }

    // -- Products --------------------------------------------------------

    pub async fn save_product(&self, draft: &ProductDraft) -> Result<CanonicalProduct> {
        Ok(sqlx::query_as::<_, CanonicalProduct>(
            "INSERT INTO products (user_id, title, description, image_urls, platform_specific_data)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(draft.user_id)
        .bind(&draft.title)
        .bind(&draft.description)
        .bind(&draft.image_urls)
        .bind(&draft.platform_specific_data)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<CanonicalProduct> {
        sqlx::query_as::<_, CanonicalProduct>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("product {}", id),
            })
    }

    pub async fn find_variants_by_user(&self, user_id: Uuid) -> Result<Vec<CanonicalProductVariant>> {
        Ok(sqlx::query_as::<_, CanonicalProductVariant>(
            "SELECT * FROM product_variants WHERE user_id = $1 AND NOT archived",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn get_variant(&self, id: Uuid) -> Result<CanonicalProductVariant> {
        sqlx::query_as::<_, CanonicalProductVariant>("SELECT * FROM product_variants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource: format!("variant {}", id),
            })
    }

    /// Batch upsert on (userId, sku); resolves `product_ref` against `id_map`
    /// when it names a temp id minted earlier in the same batch (spec §4.2's
    /// ordering invariant: call after `save_product` for every draft).
    pub async fn save_variants(
        &self,
        drafts: &[VariantDraft],
        id_map: &HashMap<String, Uuid>,
    ) -> Result<Vec<CanonicalProductVariant>> {
        let mut saved = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let product_id = resolve_ref(&draft.product_ref, id_map)?;
            let options = serde_json::to_value(&draft.options).unwrap_or_default();

            let row = sqlx::query_as::<_, CanonicalProductVariant>(
                "INSERT INTO product_variants
                 (product_id, user_id, sku, barcode, title, description, price,
                  compare_at_price, cost, weight, weight_unit, options,
                  requires_shipping, taxable, tax_code, archived)
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,false)
                 ON CONFLICT (user_id, sku) DO UPDATE SET
                   title = EXCLUDED.title,
                   barcode = COALESCE(EXCLUDED.barcode, product_variants.barcode),
                   price = EXCLUDED.price
                 RETURNING *",
            )
            .bind(product_id)
            .bind(draft.user_id)
            .bind(&draft.sku)
            .bind(&draft.barcode)
            .bind(&draft.title)
            .bind(&draft.description)
            .bind(draft.price)
            .bind(draft.compare_at_price)
            .bind(draft.cost)
            .bind(draft.weight)
            .bind(&draft.weight_unit)
            .bind(&options)
            .bind(draft.requires_shipping)
            .bind(draft.taxable)
            .bind(&draft.tax_code)
            .fetch_one(&self.pool)
            .await?;

            saved.push(row);
        }

        Ok(saved)
    }

    pub async fn save_variant_images(&self, variant_id: Uuid, urls: &[String]) -> Result<()> {
        for url in urls {
            sqlx::query(
                "INSERT INTO product_images (variant_id, url) VALUES ($1, $2)
                 ON CONFLICT DO NOTHING",
            )
            .bind(variant_id)
            .bind(url)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // -- Inventory --------------------------------------------------------

    pub async fn save_bulk_inventory_levels(
        &self,
        rows: &[InventoryLevelDraft],
        id_map: &HashMap<String, Uuid>,
    ) -> Result<()> {
        for row in rows {
            let variant_id = resolve_ref(&row.variant_ref, id_map)?;
            self.upsert_inventory_level(&CanonicalInventoryLevel {
                variant_id,
                connection_id: row.connection_id,
                platform_location_id: row.platform_location_id.clone(),
                quantity: row.quantity,
                last_platform_update_at: row.last_platform_update_at,
            })
            .await?;
        }
        Ok(())
    }

    pub async fn update_level(&self, row: &CanonicalInventoryLevel) -> Result<()> {
        self.upsert_inventory_level(row).await
    }

    /// Upsert on (variantId, connectionId, platformLocationId), discarding
    /// events older than what's stored (last-writer-wins, spec §5).
    async fn upsert_inventory_level(&self, row: &CanonicalInventoryLevel) -> Result<()> {
        sqlx::query(
            "INSERT INTO inventory_levels
                (variant_id, connection_id, platform_location_id, quantity, last_platform_update_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (variant_id, connection_id, platform_location_id) DO UPDATE SET
                quantity = EXCLUDED.quantity,
                last_platform_update_at = EXCLUDED.last_platform_update_at
             WHERE inventory_levels.last_platform_update_at <= EXCLUDED.last_platform_update_at",
        )
        .bind(row.variant_id)
        .bind(row.connection_id)
        .bind(&row.platform_location_id)
        .bind(row.quantity)
        .bind(row.last_platform_update_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- Mappings --------------------------------------------------------

    pub async fn get_mapping(
        &self,
        connection_id: Uuid,
        platform_product_id: &str,
    ) -> Result<Option<PlatformProductMapping>> {
        Ok(sqlx::query_as::<_, PlatformProductMapping>(
            "SELECT * FROM platform_product_mappings
             WHERE connection_id = $1 AND platform_product_id = $2",
        )
        .bind(connection_id)
        .bind(platform_product_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get_mapping_by_variant(
        &self,
        variant_id: Uuid,
        platform_product_id: &str,
        connection_id: Uuid,
    ) -> Result<Option<PlatformProductMapping>> {
        Ok(sqlx::query_as::<_, PlatformProductMapping>(
            "SELECT * FROM platform_product_mappings
             WHERE variant_id = $1 AND platform_product_id = $2 AND connection_id = $3",
        )
        .bind(variant_id)
        .bind(platform_product_id)
        .bind(connection_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get_mappings_by_connection(
        &self,
        connection_id: Uuid,
        only_active: bool,
    ) -> Result<Vec<PlatformProductMapping>> {
        let query = if only_active {
            "SELECT * FROM platform_product_mappings WHERE connection_id = $1 AND is_enabled"
        } else {
            "SELECT * FROM platform_product_mappings WHERE connection_id = $1"
        };
        Ok(sqlx::query_as::<_, PlatformProductMapping>(query)
            .bind(connection_id)
            .fetch_all(&self.pool)
            .await?)
    }

    pub async fn upsert_mapping(
        &self,
        connection_id: Uuid,
        variant_id: Uuid,
        platform_product_id: &str,
        platform_variant_id: Option<&str>,
        platform_sku: Option<&str>,
        sync_status: MappingSyncStatus,
    ) -> Result<PlatformProductMapping> {
        Ok(sqlx::query_as::<_, PlatformProductMapping>(
            "INSERT INTO platform_product_mappings
                (connection_id, variant_id, platform_product_id, platform_variant_id,
                 platform_sku, sync_status, is_enabled, last_synced_at)
             VALUES ($1,$2,$3,$4,$5,$6,true,now())
             ON CONFLICT (connection_id, variant_id) DO UPDATE SET
                platform_product_id = EXCLUDED.platform_product_id,
                platform_variant_id = EXCLUDED.platform_variant_id,
                platform_sku = EXCLUDED.platform_sku,
                sync_status = EXCLUDED.sync_status,
                is_enabled = true,
                last_synced_at = now(),
                updated_at = now()
             RETURNING *",
        )
        .bind(connection_id)
        .bind(variant_id)
        .bind(platform_product_id)
        .bind(platform_variant_id)
        .bind(platform_sku)
        .bind(sync_status)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn update_mapping(&self, id: Uuid, patch: &MappingPatch) -> Result<PlatformProductMapping> {
        let existing = sqlx::query_as::<_, PlatformProductMapping>(
            "SELECT * FROM platform_product_mappings WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound {
            resource: format!("mapping {}", id),
        })?;

        let sync_status = patch.sync_status.unwrap_or(existing.sync_status);
        let is_enabled = patch.is_enabled.unwrap_or(existing.is_enabled);
        let last_synced_at = patch.last_synced_at.or(existing.last_synced_at);
        let platform_specific_data = patch
            .platform_specific_data
            .clone()
            .unwrap_or(existing.platform_specific_data);

        Ok(sqlx::query_as::<_, PlatformProductMapping>(
            "UPDATE platform_product_mappings
             SET sync_status = $1, is_enabled = $2, last_synced_at = $3,
                 platform_specific_data = $4, updated_at = now()
             WHERE id = $5
             RETURNING *",
        )
        .bind(sync_status)
        .bind(is_enabled)
        .bind(last_synced_at)
        .bind(&platform_specific_data)
        .bind(id)
        .fetch_one(&self.pool)
        .await?)
    }

    // -- Activity log -----------------------------------------------------

    /// Never blocks or fails the caller beyond logging the failure itself
    /// (spec §4.2).
    pub async fn log_activity(&self, entry: ActivityLogEntry) {
        let result = sqlx::query(
            "INSERT INTO activity_logs
                (user_id, entity_type, entity_id, event_type, status, message, connection_id, details)
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8)",
        )
        .bind(entry.user_id)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.event_type)
        .bind(entry.status)
        .bind(&entry.message)
        .bind(entry.connection_id)
        .bind(&entry.details)
        .execute(&self.pool)
        .await;

        if let Err(err) = result {
            warn!(error = %err, event_type = %entry.event_type, "failed to persist activity log entry");
        }
    }
}

fn resolve_ref(reference: &str, id_map: &HashMap<String, Uuid>) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(reference) {
        return Ok(uuid);
    }
    id_map
        .get(reference)
        .copied()
        .ok_or_else(|| AppError::DataIntegrityViolation {
            message: format!("unresolved temp id reference: {}", reference),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ref_accepts_real_uuid() {
        let id = Uuid::new_v4();
        let map = HashMap::new();
        assert_eq!(resolve_ref(&id.to_string(), &map).unwrap(), id);
    }

    #[test]
    fn test_resolve_ref_resolves_temp_id() {
        let id = Uuid::new_v4();
        let mut map = HashMap::new();
        map.insert("shop-prod-123".to_string(), id);
        assert_eq!(resolve_ref("shop-prod-123", &map).unwrap(), id);
    }

    #[test]
    fn test_resolve_ref_fails_on_unknown() {
        let map = HashMap::new();
        assert!(resolve_ref("shop-prod-unknown", &map).is_err());
    }
}
