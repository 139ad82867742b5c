//! Adapter Contract: one implementation per platform kind, registered by
//! `PlatformKind` and looked up through `AdapterRegistry`.

mod clover;
mod registry;
mod shopify;
mod square;
mod stub;

pub use registry::AdapterRegistry;
pub use shopify::verify_shopify_signature;
pub use square::verify_square_signature;

use crate::error::Result;
use crate::models::{
    event_types, ActivityLogEntry, ActivityStatus, CanonicalInventoryLevel, CanonicalProduct,
    CanonicalProductVariant, MappingPatch, MappingSyncStatus, PlatformConnection,
    PlatformProductMapping,
};
use crate::store::CanonicalStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

pub use clover::CloverAdapter;
pub use shopify::ShopifyAdapter;
pub use square::SquareAdapter;
pub use stub::StubAdapter;

/// A paginated raw payload pulled from a platform, already decrypted/authed.
#[derive(Debug, Clone)]
pub struct FetchPage {
    pub items: Vec<Value>,
    pub next_cursor: Option<String>,
}

/// Stateful client bound to one connection's decrypted credentials.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Full paginated traversal of the platform catalog. Implementations must
    /// retry HTTP 429 with exponential backoff and bubble up 401/403 as
    /// `AppError::PlatformAuthError`.
    async fn fetch_all(&self) -> Result<Vec<Value>>;

    /// One page, used by the reconciliation job's overview pass.
    async fn fetch_overviews(&self) -> Result<Vec<Value>>;

    async fn fetch_product(&self, platform_product_id: &str) -> Result<Value>;

    async fn create_product(&self, bundle: &Value) -> Result<CreatedProduct>;

    async fn update_product(&self, platform_product_id: &str, bundle: &Value) -> Result<()>;

    async fn delete_product(&self, platform_product_id: &str) -> Result<()>;

    async fn update_inventory(&self, updates: &[InventoryUpdate]) -> Result<InventoryUpdateResult>;

    async fn fetch_inventory(&self, platform_location_ids: &[String]) -> Result<Vec<Value>>;
}

#[derive(Debug, Clone)]
pub struct CreatedProduct {
    pub platform_product_id: String,
    pub platform_variant_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct InventoryUpdate {
    pub mapping: PlatformProductMapping,
    pub level: CanonicalInventoryLevel,
}

#[derive(Debug, Clone, Default)]
pub struct InventoryUpdateResult {
    pub success: u32,
    pub failure: u32,
    pub errors: Vec<String>,
}

/// Drafts produced by a mapper pass, keyed by temp id until the gateway
/// assigns real ids (spec §4.2's ordering invariant).
#[derive(Debug, Clone, Default)]
pub struct MappedBatch {
    pub products: Vec<crate::models::ProductDraft>,
    pub variants: Vec<crate::models::VariantDraft>,
    pub inventory: Vec<crate::models::InventoryLevelDraft>,
}

pub trait Mapper: Send + Sync {
    fn map_platform_data_to_canonical(
        &self,
        raw: &[Value],
        user_id: Uuid,
        connection_id: Uuid,
    ) -> MappedBatch;

    /// Build the platform-specific create payload (options/images/variants
    /// grouped per the target API's shape).
    fn build_create_bundle(
        &self,
        product: &CanonicalProduct,
        variants: &[CanonicalProductVariant],
        inventory: &[CanonicalInventoryLevel],
    ) -> Value;
}

/// Small value object controlling sync behavior that doesn't warrant a full
/// trait method on the adapter (spec §4.1).
pub trait SyncPolicy: Send + Sync {
    fn should_delist(&self, qty: i32) -> bool;
}

pub struct DelistOnZero;

impl SyncPolicy for DelistOnZero {
    fn should_delist(&self, qty: i32) -> bool {
        qty <= 0
    }
}

/// Per-platform capability surface (spec §4.1).
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn get_mapper(&self) -> &dyn Mapper;
    fn get_sync_logic(&self) -> &dyn SyncPolicy;

    async fn get_api_client(&self, connection: &PlatformConnection) -> Result<Box<dyn ApiClient>>;

    /// Webhook processing is the only place that mutates canonical state from
    /// an inbound event; adapters own idempotency via `webhook_id`.
    async fn process_webhook(
        &self,
        store: &CanonicalStore,
        connection: &PlatformConnection,
        payload: &Value,
        headers: &HashMap<String, String>,
        webhook_id: Option<&str>,
    ) -> Result<Vec<ActivityLogEntry>>;

    /// Pulls one product fresh off the platform and persists it end to end
    /// (product, variants, mapping, inventory). Used from webhooks when the
    /// inbound event names a platform product with no existing mapping yet,
    /// so it isn't missed until the next scan or reconcile pass (spec §4.1).
    async fn sync_single_product_from_platform(
        &self,
        store: &CanonicalStore,
        connection: &PlatformConnection,
        platform_product_id: &str,
        user_id: Uuid,
    ) -> Result<Uuid> {
        let api_client = self.get_api_client(connection).await?;
        let full_product = api_client.fetch_product(platform_product_id).await?;

        let batch = self.get_mapper().map_platform_data_to_canonical(
            std::slice::from_ref(&full_product),
            user_id,
            connection.id,
        );

        let mut id_map: HashMap<String, Uuid> = HashMap::new();
        for draft in &batch.products {
            let saved = store.save_product(draft).await?;
            if let Some(temp_id) = &draft.temp_id {
                id_map.insert(temp_id.clone(), saved.id);
            }
        }

        let saved_variants = store.save_variants(&batch.variants, &id_map).await?;
        let mut variant_id = None;
        for (draft, saved) in batch.variants.iter().zip(saved_variants.iter()) {
            if !draft.image_urls.is_empty() {
                store.save_variant_images(saved.id, &draft.image_urls).await?;
            }

            let platform_variant_id = full_product["variants"]
                .as_array()
                .and_then(|vs| vs.iter().find(|v| v["sku"].as_str() == draft.sku.as_deref()))
                .and_then(|v| v["id"].as_str())
                .map(String::from);

            store
                .upsert_mapping(
                    connection.id,
                    saved.id,
                    platform_product_id,
                    platform_variant_id.as_deref(),
                    draft.sku.as_deref(),
                    MappingSyncStatus::Synced,
                )
                .await?;

            variant_id = Some(saved.id);
        }

        store
            .save_bulk_inventory_levels(&batch.inventory, &id_map)
            .await?;

        variant_id.ok_or_else(|| crate::error::AppError::DataIntegrityViolation {
            message: format!(
                "fetching platform product {} produced no variants",
                platform_product_id
            ),
        })
    }
}

/// Shared core for each adapter's `process_webhook`: looks up the mapping
/// for the platform product the event names, dedups repeat deliveries of
/// the same `webhook_id`, and upserts the inventory reading the payload
/// carried (spec §4.7 step 6, §8 idempotent-webhook law). If there is no
/// mapping yet the product is pulled in full via
/// `sync_single_product_from_platform` rather than dropped.
pub(crate) async fn process_inventory_webhook(
    adapter: &dyn PlatformAdapter,
    store: &CanonicalStore,
    connection: &PlatformConnection,
    platform_product_id: &str,
    inventory: Option<(i32, &str)>,
    webhook_id: Option<&str>,
    platform: &str,
) -> Result<Vec<ActivityLogEntry>> {
    let mapping = store.get_mapping(connection.id, platform_product_id).await?;

    let Some(mapping) = mapping else {
        adapter
            .sync_single_product_from_platform(
                store,
                connection,
                platform_product_id,
                connection.user_id,
            )
            .await?;
        return Ok(vec![ActivityLogEntry {
            user_id: connection.user_id,
            entity_type: "platform_product".to_string(),
            entity_id: platform_product_id.to_string(),
            event_type: event_types::WEBHOOK_PROCESSED.to_string(),
            status: ActivityStatus::Info,
            message: format!(
                "{} webhook named a previously-unmapped product, synced it in full",
                platform
            ),
            connection_id: Some(connection.id),
            details: serde_json::json!({ "webhookId": webhook_id }),
        }]);
    };

    let last_webhook_id = mapping
        .platform_specific_data
        .get("lastWebhookId")
        .and_then(|v| v.as_str());
    if webhook_id.is_some() && last_webhook_id == webhook_id {
        return Ok(vec![ActivityLogEntry {
            user_id: connection.user_id,
            entity_type: "platform_product_mapping".to_string(),
            entity_id: mapping.id.to_string(),
            event_type: event_types::DUPLICATE.to_string(),
            status: ActivityStatus::Info,
            message: format!(
                "{} webhook {} already processed, skipping",
                platform,
                webhook_id.unwrap_or("")
            ),
            connection_id: Some(connection.id),
            details: serde_json::json!({}),
        }]);
    }

    if let Some((quantity, location_id)) = inventory {
        store
            .update_level(&CanonicalInventoryLevel {
                variant_id: mapping.variant_id,
                connection_id: connection.id,
                platform_location_id: location_id.to_string(),
                quantity,
                last_platform_update_at: chrono::Utc::now(),
            })
            .await?;
    }

    if let Some(id) = webhook_id {
        let mut platform_specific_data = mapping.platform_specific_data.clone();
        match platform_specific_data {
            Value::Object(ref mut map) => {
                map.insert("lastWebhookId".to_string(), serde_json::json!(id));
            }
            _ => platform_specific_data = serde_json::json!({ "lastWebhookId": id }),
        }
        store
            .update_mapping(
                mapping.id,
                &MappingPatch {
                    platform_specific_data: Some(platform_specific_data),
                    ..Default::default()
                },
            )
            .await?;
    }

    Ok(vec![ActivityLogEntry {
        user_id: connection.user_id,
        entity_type: "platform_product_mapping".to_string(),
        entity_id: mapping.id.to_string(),
        event_type: event_types::WEBHOOK_PROCESSED.to_string(),
        status: ActivityStatus::Info,
        message: format!("{} webhook processed", platform),
        connection_id: Some(connection.id),
        details: serde_json::json!({ "webhookId": webhook_id }),
    }])
}

/// Decrypted view of a connection's credentials, produced by
/// `CanonicalStore::decrypt` (spec §9) and never persisted or logged.
#[derive(Debug, Clone, Default)]
pub struct DecryptedCredentials(pub std::collections::HashMap<String, Value>);

impl DecryptedCredentials {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.as_str())
    }
}
