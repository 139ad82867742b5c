//! Webhook processing integration tests (spec §4.7 step 6, §8 idempotent
//! webhook law). Requires a reachable Postgres; see `tests/common/mod.rs`.

mod common;

use serial_test::serial;
use std::collections::HashMap;
use sync_engine::adapters::{PlatformAdapter, ShopifyAdapter};
use sync_engine::config::ShopifyCredentials;
use sync_engine::models::{
    event_types, ConnectionStatus, MappingSyncStatus, PlatformKind, ProductDraft, VariantDraft,
};
use sync_engine::store::CanonicalStore;
use uuid::Uuid;

fn shopify_adapter() -> ShopifyAdapter {
    ShopifyAdapter::new(ShopifyCredentials {
        api_key: "test-token".to_string(),
        api_secret: "test-secret".to_string(),
        webhook_signing_key: "whsec_test".to_string(),
    })
}

/// Seeds a connection with one mapped variant, returning (connection, mapping id).
async fn seed_mapped_product(
    pool: &sqlx::PgPool,
    store: &CanonicalStore,
    user_id: Uuid,
    platform_product_id: &str,
) -> (sync_engine::models::PlatformConnection, Uuid) {
    let connection = common::insert_connection(
        pool,
        user_id,
        PlatformKind::Shopify,
        ConnectionStatus::Active,
        serde_json::json!({ "shop": "test-shop.myshopify.com" }),
    )
    .await;

    let product = store
        .save_product(&ProductDraft {
            temp_id: None,
            user_id,
            title: Some("Widget".to_string()),
            description: None,
            image_urls: vec![],
            platform_specific_data: serde_json::json!({}),
        })
        .await
        .expect("save product");

    let variant_draft = VariantDraft {
        temp_id: None,
        product_ref: product.id.to_string(),
        user_id,
        sku: Some("WIDGET-1".to_string()),
        barcode: None,
        title: "Widget".to_string(),
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
        image_urls: vec![],
    };
    let variant = store
        .save_variants(std::slice::from_ref(&variant_draft), &HashMap::new())
        .await
        .expect("save variant")
        .remove(0);

    let mapping = store
        .upsert_mapping(
            connection.id,
            variant.id,
            platform_product_id,
            None,
            Some("WIDGET-1"),
            MappingSyncStatus::Linked,
        )
        .await
        .expect("upsert mapping");

    (connection, mapping.id)
}

/// A webhook naming an already-mapped product upserts its inventory reading
/// and logs `WEBHOOK_PROCESSED`; a second delivery with the same webhookId
/// is a no-op that logs `duplicate` instead (spec §8).
#[tokio::test]
#[serial]
async fn test_shopify_webhook_upserts_inventory_then_dedups_repeat_delivery() {
    let pool = common::test_pool().await;
    let store = CanonicalStore::new(pool.clone());
    let user_id = common::new_user_id();
    let (connection, mapping_id) = seed_mapped_product(&pool, &store, user_id, "9001").await;

    let adapter = shopify_adapter();
    let payload = serde_json::json!({ "id": 9001, "inventory_quantity": 85, "location_id": "L1" });
    let headers = HashMap::new();

    let first = adapter
        .process_webhook(&store, &connection, &payload, &headers, Some("wh-1"))
        .await
        .expect("first delivery processes");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].event_type, event_types::WEBHOOK_PROCESSED);

    let level: (i32,) = sqlx::query_as(
        "SELECT quantity FROM inventory_levels WHERE connection_id = $1 AND platform_location_id = $2",
    )
    .bind(connection.id)
    .bind("L1")
    .fetch_one(&pool)
    .await
    .expect("inventory level row exists");
    assert_eq!(level.0, 85);

    let repeat = adapter
        .process_webhook(&store, &connection, &payload, &headers, Some("wh-1"))
        .await
        .expect("repeat delivery is a no-op, not an error");
    assert_eq!(repeat.len(), 1);
    assert_eq!(repeat[0].event_type, event_types::DUPLICATE);
    assert_eq!(repeat[0].entity_id, mapping_id.to_string());
}

/// A fresh `webhook_id` after a prior delivery is treated as a new event,
/// not a duplicate, and mutates state again.
#[tokio::test]
#[serial]
async fn test_shopify_webhook_different_webhook_id_is_not_deduped() {
    let pool = common::test_pool().await;
    let store = CanonicalStore::new(pool.clone());
    let user_id = common::new_user_id();
    let (connection, _mapping_id) = seed_mapped_product(&pool, &store, user_id, "9002").await;

    let adapter = shopify_adapter();
    let headers = HashMap::new();

    let first_payload = serde_json::json!({ "id": 9002, "inventory_quantity": 40, "location_id": "L1" });
    adapter
        .process_webhook(&store, &connection, &first_payload, &headers, Some("wh-a"))
        .await
        .expect("first delivery processes");

    let second_payload = serde_json::json!({ "id": 9002, "inventory_quantity": 55, "location_id": "L1" });
    let second = adapter
        .process_webhook(&store, &connection, &second_payload, &headers, Some("wh-b"))
        .await
        .expect("second delivery with a different webhookId processes");
    assert_eq!(second[0].event_type, event_types::WEBHOOK_PROCESSED);

    let level: (i32,) = sqlx::query_as(
        "SELECT quantity FROM inventory_levels WHERE connection_id = $1 AND platform_location_id = $2",
    )
    .bind(connection.id)
    .bind("L1")
    .fetch_one(&pool)
    .await
    .expect("inventory level row exists");
    assert_eq!(level.0, 55);
}
