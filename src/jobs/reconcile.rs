//! Reconciliation Job (spec §4.6): diffs the platform catalog against
//! active mappings and refreshes inventory for a connection already in
//! steady-state sync.

use super::JobContext;
use crate::error::Result;
use crate::models::{
    event_types, ActivityLogEntry, ActivityStatus, CanonicalInventoryLevel, ProductDraft,
};
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};
use uuid::Uuid;

pub async fn run(ctx: &JobContext, connection_id: Uuid) -> Result<()> {
    let outcome = run_inner(ctx, connection_id).await;

    match &outcome {
        Ok(()) => {
            ctx.onboarding.complete_reconcile(connection_id, true).await?;
        }
        Err(err) => {
            error!(connection_id = %connection_id, error = %err, "reconciliation failed");
            ctx.onboarding
                .complete_reconcile(connection_id, false)
                .await
                .ok();
        }
    }

    outcome
}

async fn run_inner(ctx: &JobContext, connection_id: Uuid) -> Result<()> {
    sqlx::query("UPDATE platform_connections SET last_sync_attempt_at = now() WHERE id = $1")
        .bind(connection_id)
        .execute(ctx.store.pool())
        .await?;

    let connection = ctx.store.get_connection(connection_id).await?;
    if !connection.enabled {
        info!(connection_id = %connection_id, "connection disabled, skipping reconcile");
        return Ok(());
    }

    let adapter = ctx.registry.get(connection.platform_kind)?;
    let api_client = adapter.get_api_client(&connection).await?;

    let overviews = api_client.fetch_overviews().await?;
    let active_mappings = ctx
        .store
        .get_mappings_by_connection(connection_id, true)
        .await?;

    let mapped_platform_ids: HashSet<String> = active_mappings
        .iter()
        .map(|m| m.platform_product_id.clone())
        .collect();

    let overview_ids: HashSet<String> = overviews
        .iter()
        .map(|o| o["id"].to_string())
        .collect();

    let new_on_platform: Vec<&serde_json::Value> = overviews
        .iter()
        .filter(|o| !mapped_platform_ids.contains(&o["id"].to_string()))
        .collect();

    let missing_on_platform: Vec<_> = active_mappings
        .iter()
        .filter(|m| !overview_ids.contains(&m.platform_product_id))
        .collect();

    let mapper = adapter.get_mapper();

    for overview in new_on_platform {
        let platform_product_id = overview["id"].to_string();
        match api_client.fetch_product(&platform_product_id).await {
            Ok(full) => {
                if let Err(err) =
                    persist_new_product(ctx, &connection, mapper, &full, connection_id).await
                {
                    warn!(connection_id = %connection_id, platform_product_id, error = %err, "failed to persist new-on-platform product");
                    continue;
                }
                ctx.store
                    .log_activity(ActivityLogEntry {
                        user_id: connection.user_id,
                        entity_type: "platform_product".to_string(),
                        entity_id: platform_product_id.clone(),
                        event_type: event_types::RECONCILE_NEW_PRODUCT.to_string(),
                        status: ActivityStatus::Info,
                        message: "discovered a new product on the platform".to_string(),
                        connection_id: Some(connection_id),
                        details: serde_json::json!({}),
                    })
                    .await;
            }
            Err(err) => {
                warn!(connection_id = %connection_id, platform_product_id, error = %err, "failed to fetch new-on-platform product detail");
            }
        }
    }

    for mapping in &missing_on_platform {
        ctx.store
            .log_activity(ActivityLogEntry {
                user_id: connection.user_id,
                entity_type: "platform_product_mapping".to_string(),
                entity_id: mapping.id.to_string(),
                event_type: event_types::RECONCILE_MISSING_PRODUCT.to_string(),
                status: ActivityStatus::Warning,
                message: format!(
                    "mapped product {} is no longer present on the platform; left enabled for operator review",
                    mapping.platform_product_id
                ),
                connection_id: Some(connection_id),
                details: serde_json::json!({ "mappingId": mapping.id }),
            })
            .await;
    }

    refresh_inventory(ctx, &connection, &active_mappings, api_client.as_ref()).await?;

    sqlx::query("UPDATE platform_connections SET last_sync_success_at = now() WHERE id = $1")
        .bind(connection_id)
        .execute(ctx.store.pool())
        .await?;

    Ok(())
}

async fn persist_new_product(
    ctx: &JobContext,
    connection: &crate::models::PlatformConnection,
    mapper: &dyn crate::adapters::Mapper,
    full_product: &serde_json::Value,
    connection_id: Uuid,
) -> Result<()> {
    let batch = mapper.map_platform_data_to_canonical(
        std::slice::from_ref(full_product),
        connection.user_id,
        connection_id,
    );

    let mut id_map: HashMap<String, Uuid> = HashMap::new();
    for draft in &batch.products {
        let saved = persist_product_draft(ctx, draft).await?;
        if let Some(temp_id) = &draft.temp_id {
            id_map.insert(temp_id.clone(), saved);
        }
    }

    let saved_variants = ctx.store.save_variants(&batch.variants, &id_map).await?;
    for (draft, saved) in batch.variants.iter().zip(saved_variants.iter()) {
        if !draft.image_urls.is_empty() {
            ctx.store
                .save_variant_images(saved.id, &draft.image_urls)
                .await?;
        }

        let platform_product_id = full_product["id"].to_string();
        let platform_variant_id = full_product["variants"]
            .as_array()
            .and_then(|vs| vs.iter().find(|v| v["sku"].as_str() == draft.sku.as_deref()))
            .and_then(|v| v["id"].as_str())
            .map(String::from);

        ctx.store
            .upsert_mapping(
                connection_id,
                saved.id,
                &platform_product_id,
                platform_variant_id.as_deref(),
                draft.sku.as_deref(),
                crate::models::MappingSyncStatus::Synced,
            )
            .await?;
    }

    ctx.store
        .save_bulk_inventory_levels(&batch.inventory, &id_map)
        .await?;

    Ok(())
}

async fn persist_product_draft(ctx: &JobContext, draft: &ProductDraft) -> Result<Uuid> {
    Ok(ctx.store.save_product(draft).await?.id)
}

async fn refresh_inventory(
    ctx: &JobContext,
    connection: &crate::models::PlatformConnection,
    active_mappings: &[crate::models::PlatformProductMapping],
    api_client: &dyn crate::adapters::ApiClient,
) -> Result<()> {
    let with_platform_variant: Vec<_> = active_mappings
        .iter()
        .filter(|m| m.platform_variant_id.is_some())
        .collect();

    if with_platform_variant.is_empty() {
        return Ok(());
    }

    let location_ids: Vec<String> = with_platform_variant
        .iter()
        .filter_map(|m| m.platform_specific_data.get("locationId").and_then(|v| v.as_str()))
        .map(String::from)
        .collect();

    let levels = api_client.fetch_inventory(&location_ids).await?;

    let by_variant: HashMap<&str, &serde_json::Value> = levels
        .iter()
        .filter_map(|l| l["inventory_item_id"].as_str().map(|id| (id, l)))
        .collect();

    for mapping in with_platform_variant {
        let Some(platform_variant_id) = &mapping.platform_variant_id else {
            continue;
        };
        let Some(level) = by_variant.get(platform_variant_id.as_str()) else {
            continue;
        };

        let quantity = level["available"].as_i64().unwrap_or(0) as i32;
        let location_id = level["location_id"].to_string();

        let row = CanonicalInventoryLevel {
            variant_id: mapping.variant_id,
            connection_id: connection.id,
            platform_location_id: location_id,
            quantity,
            last_platform_update_at: chrono::Utc::now(),
        };

        ctx.store.update_level(&row).await?;
    }

    Ok(())
}
