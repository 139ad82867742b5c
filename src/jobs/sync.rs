//! Initial-Sync Job (spec §4.5): applies the user's confirmed mapping
//! decisions against the platform, honoring the connection's sync rules.

use super::JobContext;
use crate::error::Result;
use crate::models::{
    event_types, metadata_keys, ActivityLogEntry, ActivityStatus, ConfirmedAction, ConfirmedMatch,
    InventoryLevelDraft, MappingConfirmations, MappingPatch, MappingSyncStatus, ProductDraft,
    SourceOfTruth, VariantDraft,
};
use std::collections::HashMap;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct SyncTally {
    processed: u32,
    succeeded: u32,
    failed: u32,
}

pub async fn run(ctx: &JobContext, connection_id: Uuid) -> Result<()> {
    let outcome = run_inner(ctx, connection_id).await;

    match &outcome {
        Ok(tally) => {
            ctx.onboarding
                .complete_sync(connection_id, tally.failed)
                .await?;
        }
        Err(err) => {
            error!(connection_id = %connection_id, error = %err, "initial sync failed entirely");
            ctx.onboarding.complete_sync(connection_id, 1).await.ok();
        }
    }

    outcome.map(|_| ())
}

async fn run_inner(ctx: &JobContext, connection_id: Uuid) -> Result<SyncTally> {
    let connection = ctx.store.get_connection(connection_id).await?;
    let sync_rules = connection.sync_rules();

    let confirmations: MappingConfirmations = connection
        .platform_specific_data
        .get(metadata_keys::MAPPING_CONFIRMATIONS)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_else(|| MappingConfirmations {
            confirmed_matches: Vec::new(),
            updated_at: chrono::Utc::now(),
        });

    let mut tally = SyncTally::default();
    let total = confirmations.confirmed_matches.len();

    for confirmed in &confirmations.confirmed_matches {
        tally.processed += 1;

        let result = match confirmed.action {
            ConfirmedAction::Link => apply_link(ctx, &connection, confirmed, &sync_rules).await,
            ConfirmedAction::Create => apply_create(ctx, &connection, confirmed).await,
            ConfirmedAction::Ignore => apply_ignore(ctx, &connection, confirmed).await,
        };

        match result {
            Ok(()) => tally.succeeded += 1,
            Err(err) => {
                tally.failed += 1;
                warn!(
                    connection_id = %connection_id,
                    platform_product_id = %confirmed.platform_product_id,
                    error = %err,
                    "sync item failed"
                );
                ctx.store
                    .log_activity(ActivityLogEntry {
                        user_id: connection.user_id,
                        entity_type: "platform_product".to_string(),
                        entity_id: confirmed.platform_product_id.clone(),
                        event_type: "SYNC_ITEM_FAILED".to_string(),
                        status: ActivityStatus::Error,
                        message: err.to_string(),
                        connection_id: Some(connection_id),
                        details: serde_json::json!({ "action": confirmed.action }),
                    })
                    .await;
            }
        }
    }

    info!(
        connection_id = %connection_id,
        processed = tally.processed,
        total,
        succeeded = tally.succeeded,
        failed = tally.failed,
        "initial sync batch complete"
    );

    Ok(tally)
}

async fn apply_link(
    ctx: &JobContext,
    connection: &crate::models::PlatformConnection,
    confirmed: &ConfirmedMatch,
    sync_rules: &crate::models::SyncRules,
) -> Result<()> {
    let variant_id = confirmed
        .sssync_variant_id
        .ok_or_else(|| crate::error::AppError::DataIntegrityViolation {
            message: format!(
                "link action for platform product {} has no sssyncVariantId",
                confirmed.platform_product_id
            ),
        })?;

    let mapping = ctx
        .store
        .upsert_mapping(
            connection.id,
            variant_id,
            &confirmed.platform_product_id,
            confirmed.platform_variant_id.as_deref(),
            confirmed.platform_sku.as_deref(),
            MappingSyncStatus::Linked,
        )
        .await?;

    if sync_rules.product_details_sot == SourceOfTruth::Platform {
        if let Some(snapshot) = &confirmed.platform_snapshot {
            overlay_platform_fields(ctx, variant_id, snapshot).await?;
        }
    }

    if sync_rules.inventory_sot == SourceOfTruth::Platform {
        if let Some(snapshot) = &confirmed.platform_snapshot {
            sync_inventory_for_mapping(ctx, connection, &mapping, snapshot).await?;
        }
    }

    Ok(())
}

/// Field-by-field merge that never lets a platform null clobber a canonical
/// value (spec §4.5's link semantics).
async fn overlay_platform_fields(
    ctx: &JobContext,
    variant_id: Uuid,
    snapshot: &crate::models::PlatformProductSnapshot,
) -> Result<()> {
    let existing = ctx.store.get_variant(variant_id).await?;

    let title = snapshot
        .platform_title
        .clone()
        .unwrap_or(existing.title.clone());
    let sku = snapshot.platform_sku.clone().or(existing.sku.clone());
    let barcode = snapshot.platform_barcode.clone().or(existing.barcode.clone());

    let draft = VariantDraft {
        temp_id: None,
        product_ref: existing.product_id.to_string(),
        user_id: existing.user_id,
        sku,
        barcode,
        title,
        description: existing.description.clone(),
        price: existing.price,
        compare_at_price: existing.compare_at_price,
        cost: existing.cost,
        weight: existing.weight,
        weight_unit: existing.weight_unit.clone(),
        options: existing.options_map(),
        requires_shipping: existing.requires_shipping,
        taxable: existing.taxable,
        tax_code: existing.tax_code.clone(),
        image_urls: Vec::new(),
    };

    ctx.store
        .save_variants(std::slice::from_ref(&draft), &HashMap::new())
        .await?;
    Ok(())
}

async fn sync_inventory_for_mapping(
    ctx: &JobContext,
    connection: &crate::models::PlatformConnection,
    mapping: &crate::models::PlatformProductMapping,
    snapshot: &crate::models::PlatformProductSnapshot,
) -> Result<()> {
    let quantity = snapshot
        .raw
        .get("inventory_quantity")
        .and_then(|v| v.as_i64())
        .unwrap_or(0) as i32;
    let location_id = snapshot
        .raw
        .get("location_id")
        .and_then(|v| v.as_str())
        .unwrap_or("default")
        .to_string();

    ctx.store
        .update_level(&crate::models::CanonicalInventoryLevel {
            variant_id: mapping.variant_id,
            connection_id: connection.id,
            platform_location_id: location_id,
            quantity,
            last_platform_update_at: chrono::Utc::now(),
        })
        .await
}

async fn apply_create(
    ctx: &JobContext,
    connection: &crate::models::PlatformConnection,
    confirmed: &ConfirmedMatch,
) -> Result<()> {
    let snapshot = match &confirmed.platform_snapshot {
        Some(s) => s,
        None => {
            ctx.store
                .log_activity(ActivityLogEntry {
                    user_id: connection.user_id,
                    entity_type: "platform_product".to_string(),
                    entity_id: confirmed.platform_product_id.clone(),
                    event_type: event_types::MISSING_PLATFORM_DATA.to_string(),
                    status: ActivityStatus::Warning,
                    message: "create action requested without a platform snapshot".to_string(),
                    connection_id: Some(connection.id),
                    details: serde_json::json!({}),
                })
                .await;
            return Ok(());
        }
    };

    let existing_mapping = ctx
        .store
        .get_mapping(connection.id, &confirmed.platform_product_id)
        .await?;

    let mut id_map = HashMap::new();
    let product_id = match &existing_mapping {
        Some(m) => ctx.store.get_variant(m.variant_id).await?.product_id,
        None => {
            let draft = ProductDraft {
                temp_id: Some(format!("create-{}", confirmed.platform_product_id)),
                user_id: connection.user_id,
                title: snapshot.platform_title.clone(),
                description: None,
                image_urls: Vec::new(),
                platform_specific_data: serde_json::json!({}),
            };
            let saved = ctx.store.save_product(&draft).await?;
            saved.id
        }
    };
    id_map.insert(format!("create-{}", confirmed.platform_product_id), product_id);

    let sku = confirmed.platform_sku.clone().unwrap_or_else(|| {
        VariantDraft::mint_temp_sku(
            &confirmed.platform_product_id,
            confirmed.platform_variant_id.as_deref(),
        )
    });

    let variant_draft = VariantDraft {
        temp_id: Some(format!("create-var-{}", confirmed.platform_product_id)),
        product_ref: product_id.to_string(),
        user_id: connection.user_id,
        sku: Some(sku),
        barcode: snapshot.platform_barcode.clone(),
        title: snapshot
            .platform_title
            .clone()
            .unwrap_or_else(|| "untitled".to_string()),
        description: None,
        price: rust_decimal::Decimal::ZERO,
        compare_at_price: None,
        cost: None,
        weight: None,
        weight_unit: None,
        options: HashMap::new(),
        requires_shipping: true,
        taxable: true,
        tax_code: None,
        image_urls: Vec::new(),
    };

    let saved_variants = ctx.store.save_variants(&[variant_draft], &id_map).await?;
    let variant = saved_variants
        .into_iter()
        .next()
        .ok_or_else(|| crate::error::AppError::DataIntegrityViolation {
            message: "variant insert returned no row".to_string(),
        })?;

    let mapping = ctx
        .store
        .upsert_mapping(
            connection.id,
            variant.id,
            &confirmed.platform_product_id,
            confirmed.platform_variant_id.as_deref(),
            confirmed.platform_sku.as_deref(),
            MappingSyncStatus::Synced,
        )
        .await?;

    let inventory_draft = InventoryLevelDraft {
        variant_ref: variant.id.to_string(),
        connection_id: connection.id,
        platform_location_id: "default".to_string(),
        quantity: snapshot
            .raw
            .get("inventory_quantity")
            .and_then(|v| v.as_i64())
            .unwrap_or(0) as i32,
        last_platform_update_at: chrono::Utc::now(),
    };
    ctx.store
        .save_bulk_inventory_levels(&[inventory_draft], &HashMap::new())
        .await?;

    let _ = mapping;
    Ok(())
}

async fn apply_ignore(
    ctx: &JobContext,
    connection: &crate::models::PlatformConnection,
    confirmed: &ConfirmedMatch,
) -> Result<()> {
    match ctx
        .store
        .get_mapping(connection.id, &confirmed.platform_product_id)
        .await?
    {
        Some(existing) => {
            ctx.store
                .update_mapping(
                    existing.id,
                    &MappingPatch {
                        sync_status: Some(MappingSyncStatus::Ignored),
                        is_enabled: Some(false),
                        last_synced_at: None,
                        platform_specific_data: Some(serde_json::json!({
                            "ignoredReason": event_types::USER_CONFIRMED_IGNORE,
                        })),
                    },
                )
                .await?;
        }
        None => {
            ctx.store
                .log_activity(ActivityLogEntry {
                    user_id: connection.user_id,
                    entity_type: "platform_product".to_string(),
                    entity_id: confirmed.platform_product_id.clone(),
                    event_type: event_types::USER_CONFIRMED_IGNORE.to_string(),
                    status: ActivityStatus::Info,
                    message: "user ignored an unmapped platform item".to_string(),
                    connection_id: Some(connection.id),
                    details: serde_json::json!({}),
                })
                .await;
        }
    }
    Ok(())
}
