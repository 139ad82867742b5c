//! Initial-Scan Job (spec §4.4). The coordinator already flips the
//! connection to `scanning` and stamps `currentJobId` before enqueueing;
//! this handler owns steps 3-8.

use super::JobContext;
use crate::error::{AppError, Result};
use crate::mapping::VariantIndex;
use crate::models::{metadata_keys, MappingSuggestion, PlatformProductSnapshot};
use serde_json::json;
use std::collections::HashMap;
use tracing::{error, info};
use uuid::Uuid;

pub async fn run(ctx: &JobContext, connection_id: Uuid) -> Result<()> {
    let outcome = run_inner(ctx, connection_id).await;

    match &outcome {
        Ok(()) => {
            ctx.onboarding.complete_scan(connection_id, true).await?;
        }
        Err(err) => {
            error!(connection_id = %connection_id, error = %err, "initial scan failed");
            ctx.onboarding.complete_scan(connection_id, false).await.ok();
        }
    }

    outcome
}

async fn run_inner(ctx: &JobContext, connection_id: Uuid) -> Result<()> {
    let connection = ctx.store.get_connection(connection_id).await?;
    if !connection.enabled {
        return Err(AppError::OperationNotAllowed {
            reason: "connection is disabled".to_string(),
        });
    }

    let adapter = ctx.registry.get(connection.platform_kind)?;
    let api_client = adapter.get_api_client(&connection).await?;
    let raw = api_client.fetch_all().await?;

    let mapper = adapter.get_mapper();
    let batch = mapper.map_platform_data_to_canonical(&raw, connection.user_id, connection_id);

    // Index the user's pre-existing canonical variants (from other
    // connections) before this scan's own variants land in the same table.
    let existing_variants = ctx.store.find_variants_by_user(connection.user_id).await?;
    let index = VariantIndex::build(&existing_variants);

    let mut id_map: HashMap<String, Uuid> = HashMap::new();
    for draft in &batch.products {
        let saved = ctx.store.save_product(draft).await?;
        if let Some(temp_id) = &draft.temp_id {
            id_map.insert(temp_id.clone(), saved.id);
        }
    }

    let saved_variants = ctx.store.save_variants(&batch.variants, &id_map).await?;
    for (draft, saved) in batch.variants.iter().zip(saved_variants.iter()) {
        if !draft.image_urls.is_empty() {
            ctx.store.save_variant_images(saved.id, &draft.image_urls).await?;
        }
        if let Some(temp_id) = &draft.temp_id {
            id_map.insert(temp_id.clone(), saved.id);
        }
    }

    ctx.store.save_bulk_inventory_levels(&batch.inventory, &id_map).await?;

    let suggestions = build_suggestions(&raw, &index);

    let location_count = batch
        .inventory
        .iter()
        .map(|row| row.platform_location_id.clone())
        .collect::<std::collections::HashSet<_>>()
        .len();

    let scan_summary = json!({
        "countProducts": batch.products.len(),
        "countVariants": batch.variants.len(),
        "countLocations": location_count,
    });

    ctx.store
        .merge_platform_specific_data(
            connection_id,
            json!({
                metadata_keys::SCAN_SUMMARY: scan_summary,
                metadata_keys::MAPPING_SUGGESTIONS: suggestions,
            }),
        )
        .await?;

    info!(
        connection_id = %connection_id,
        products = batch.products.len(),
        variants = batch.variants.len(),
        suggestions = suggestions.len(),
        "initial scan completed"
    );

    Ok(())
}

/// Step 6: one `PlatformProductSnapshot` per raw platform product, scored
/// against the pre-scan canonical index. Products without variants still
/// produce an (unmatched) snapshot so the user sees every scanned item.
fn build_suggestions(raw: &[serde_json::Value], index: &VariantIndex) -> Vec<MappingSuggestion> {
    let mut suggestions = Vec::new();

    for product in raw {
        let platform_product_id = product["id"].to_string();
        let platform_title = product["title"].as_str().map(String::from);
        let variants = product["variants"].as_array().cloned().unwrap_or_default();

        if variants.is_empty() {
            let snapshot = PlatformProductSnapshot {
                platform_product_id: platform_product_id.clone(),
                platform_variant_id: None,
                platform_sku: None,
                platform_title: platform_title.clone(),
                platform_barcode: None,
                raw: product.clone(),
            };
            suggestions.extend(index.score(&snapshot));
            continue;
        }

        for variant in &variants {
            let snapshot = PlatformProductSnapshot {
                platform_product_id: platform_product_id.clone(),
                platform_variant_id: variant["id"].as_str().map(String::from),
                platform_sku: variant["sku"].as_str().filter(|s| !s.is_empty()).map(String::from),
                platform_title: platform_title.clone(),
                platform_barcode: variant["barcode"].as_str().map(String::from),
                raw: variant.clone(),
            };
            suggestions.extend(index.score(&snapshot));
        }
    }

    suggestions
}
