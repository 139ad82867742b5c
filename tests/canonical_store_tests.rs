//! Canonical Store Gateway integration tests (spec §4.2, §8 universal
//! invariants). Requires a reachable Postgres; see `tests/common/mod.rs`.

mod common;

use chrono::Utc;
use serial_test::serial;
use std::collections::HashMap;
use sync_engine::models::{
    ActivityLogEntry, ActivityStatus, ConnectionStatus, InventoryLevelDraft, MappingSyncStatus,
    PlatformKind, ProductDraft, VariantDraft,
};
use sync_engine::store::CanonicalStore;
use uuid::Uuid;

fn product_draft(user_id: Uuid) -> ProductDraft {
    ProductDraft {
        temp_id: Some("shop-prod-1".to_string()),
        user_id,
        title: Some("Classic Tee".to_string()),
        description: None,
        image_urls: vec!["https://cdn.example.com/tee.png".to_string()],
        platform_specific_data: serde_json::json!({}),
    }
}

fn variant_draft(user_id: Uuid, product_ref: &str, sku: &str) -> VariantDraft {
    VariantDraft {
        temp_id: Some(format!("shop-var-{}", sku)),
        product_ref: product_ref.to_string(),
        user_id,
        sku: Some(sku.to_string()),
        barcode: None,
        title: "Classic Tee - Medium".to_string(),
        description: None,
        price: rust_decimal::Decimal::new(1999, 2),
        compare_at_price: None,
        cost: None,
        weight: None,
        weight_unit: None,
        options: HashMap::from([("Size".to_string(), "Medium".to_string())]),
        requires_shipping: true,
        taxable: true,
        tax_code: None,
        image_urls: vec![],
    }
}

/// Products persist before variants, which persist before inventory and
/// mappings (spec §4.2 ordering invariant), all threaded through a single
/// temp-id-to-real-id map.
#[tokio::test]
#[serial]
async fn test_product_variant_inventory_ordering_and_id_map_resolution() {
    let pool = common::test_pool().await;
    let store = CanonicalStore::new(pool.clone());
    let user_id = common::new_user_id();
    let connection = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::Active,
        serde_json::json!({"shop": "test-shop.myshopify.com"}),
    )
    .await;

    let draft = product_draft(user_id);
    let saved_product = store.save_product(&draft).await.expect("save product");
    assert_eq!(saved_product.user_id, user_id);

    let mut id_map = HashMap::new();
    id_map.insert(draft.temp_id.clone().unwrap(), saved_product.id);

    let sku = format!("SKU-{}", Uuid::new_v4());
    let v_draft = variant_draft(user_id, &draft.temp_id.clone().unwrap(), &sku);
    let saved_variants = store
        .save_variants(std::slice::from_ref(&v_draft), &id_map)
        .await
        .expect("save variants");
    assert_eq!(saved_variants.len(), 1);
    let variant = &saved_variants[0];
    assert_eq!(variant.product_id, saved_product.id);
    assert_eq!(variant.user_id, user_id);
    assert_eq!(variant.sku.as_deref(), Some(sku.as_str()));

    id_map.insert(v_draft.temp_id.clone().unwrap(), variant.id);

    let inventory_draft = InventoryLevelDraft {
        variant_ref: v_draft.temp_id.clone().unwrap(),
        connection_id: connection.id,
        platform_location_id: "loc-1".to_string(),
        quantity: 42,
        last_platform_update_at: Utc::now(),
    };
    store
        .save_bulk_inventory_levels(std::slice::from_ref(&inventory_draft), &id_map)
        .await
        .expect("save inventory");

    let mapping = store
        .upsert_mapping(
            connection.id,
            variant.id,
            "shop-prod-1",
            Some("shop-var-1"),
            Some(&sku),
            MappingSyncStatus::Synced,
        )
        .await
        .expect("upsert mapping");
    assert_eq!(mapping.variant_id, variant.id);
    assert_eq!(mapping.connection_id, connection.id);
    assert_eq!(mapping.sync_status, MappingSyncStatus::Synced);
}

/// Universal invariant (spec §8): for every (userId, non-null sku), at most
/// one canonical variant exists. `save_variants` upserts on that key rather
/// than creating a duplicate row.
#[tokio::test]
#[serial]
async fn test_sku_uniqueness_upserts_instead_of_duplicating() {
    let pool = common::test_pool().await;
    let store = CanonicalStore::new(pool.clone());
    let user_id = common::new_user_id();

    let draft = product_draft(user_id);
    let saved_product = store.save_product(&draft).await.expect("save product");
    let mut id_map = HashMap::new();
    id_map.insert(draft.temp_id.clone().unwrap(), saved_product.id);

    let sku = format!("SKU-{}", Uuid::new_v4());
    let first = variant_draft(user_id, &draft.temp_id.clone().unwrap(), &sku);
    let saved_first = store
        .save_variants(std::slice::from_ref(&first), &id_map)
        .await
        .expect("save first variant");

    let mut second = variant_draft(user_id, &draft.temp_id.clone().unwrap(), &sku);
    second.title = "Classic Tee - Medium (relisted)".to_string();
    let saved_second = store
        .save_variants(std::slice::from_ref(&second), &id_map)
        .await
        .expect("save second variant with same sku");

    assert_eq!(saved_first[0].id, saved_second[0].id);
    assert_eq!(saved_second[0].title, "Classic Tee - Medium (relisted)");

    let all = store.find_variants_by_user(user_id).await.expect("find variants");
    let matching: Vec<_> = all.iter().filter(|v| v.sku.as_deref() == Some(sku.as_str())).collect();
    assert_eq!(matching.len(), 1);
}

/// Universal invariant (spec §8): `(variantId, connectionId, platformLocationId)`
/// is unique, and inventory upserts are last-writer-wins on
/// `LastPlatformUpdateAt` (spec §5) — a stale event is discarded.
#[tokio::test]
#[serial]
async fn test_inventory_level_upsert_is_last_writer_wins() {
    let pool = common::test_pool().await;
    let store = CanonicalStore::new(pool.clone());
    let user_id = common::new_user_id();
    let connection = common::insert_connection(
        &pool,
        user_id,
        PlatformKind::Square,
        ConnectionStatus::Active,
        serde_json::json!({"merchantId": "merchant-1"}),
    )
    .await;

    let draft = product_draft(user_id);
    let saved_product = store.save_product(&draft).await.expect("save product");
    let mut id_map = HashMap::new();
    id_map.insert(draft.temp_id.clone().unwrap(), saved_product.id);

    let sku = format!("SKU-{}", Uuid::new_v4());
    let v_draft = variant_draft(user_id, &draft.temp_id.clone().unwrap(), &sku);
    let saved = store
        .save_variants(std::slice::from_ref(&v_draft), &id_map)
        .await
        .expect("save variant");
    let variant_id = saved[0].id;

    let now = Utc::now();
    let fresh = sync_engine::models::CanonicalInventoryLevel {
        variant_id,
        connection_id: connection.id,
        platform_location_id: "loc-1".to_string(),
        quantity: 10,
        last_platform_update_at: now,
    };
    store.update_level(&fresh).await.expect("insert inventory level");

    let newer = sync_engine::models::CanonicalInventoryLevel {
        quantity: 25,
        last_platform_update_at: now + chrono::Duration::seconds(10),
        ..fresh.clone()
    };
    store.update_level(&newer).await.expect("apply newer update");

    let stale = sync_engine::models::CanonicalInventoryLevel {
        quantity: 999,
        last_platform_update_at: now - chrono::Duration::seconds(10),
        ..fresh.clone()
    };
    store.update_level(&stale).await.expect("stale update is a no-op, not an error");

    let row: (i32,) = sqlx::query_as(
        "SELECT quantity FROM inventory_levels WHERE variant_id = $1 AND connection_id = $2 AND platform_location_id = $3",
    )
    .bind(variant_id)
    .bind(connection.id)
    .bind("loc-1")
    .fetch_one(&pool)
    .await
    .expect("fetch inventory row");

    assert_eq!(row.0, 25, "stale event must not overwrite the newer quantity");
}

/// `LogActivity` never blocks or fails the caller beyond logging (spec §4.2);
/// here we only assert that a well-formed entry round-trips.
#[tokio::test]
#[serial]
async fn test_log_activity_persists_entry() {
    let pool = common::test_pool().await;
    let store = CanonicalStore::new(pool.clone());
    let user_id = common::new_user_id();

    store
        .log_activity(ActivityLogEntry {
            user_id,
            entity_type: "connection".to_string(),
            entity_id: Uuid::new_v4().to_string(),
            event_type: "RECONCILE_NEW_PRODUCT".to_string(),
            status: ActivityStatus::Info,
            message: "test entry".to_string(),
            connection_id: None,
            details: serde_json::json!({}),
        })
        .await;

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM activity_logs WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .expect("count activity logs");
    assert_eq!(count.0, 1);
}
