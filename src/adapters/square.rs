use super::{
    process_inventory_webhook, ApiClient, CreatedProduct, InventoryUpdate, InventoryUpdateResult,
    MappedBatch, Mapper, PlatformAdapter, SyncPolicy,
};
use crate::config::SquareCredentials;
use crate::error::{AppError, Result};
use crate::models::{
    ActivityLogEntry, CanonicalInventoryLevel, CanonicalProduct, CanonicalProductVariant,
    PlatformConnection, ProductDraft, VariantDraft,
};
use crate::recovery::CircuitBreaker;
use crate::store::CanonicalStore;
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Verifies `X-Square-HmacSHA256-Signature` against `notificationUrl + rawBody`.
pub fn verify_square_signature(
    signature_key: &str,
    notification_url: &str,
    raw_body: &[u8],
    signature_b64: &str,
) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature_b64) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(signature_key.as_bytes()) else {
        return false;
    };
    mac.update(notification_url.as_bytes());
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

pub struct SquareAdapter {
    credentials: SquareCredentials,
    http: Client,
}

impl SquareAdapter {
    pub fn new(credentials: SquareCredentials) -> Self {
        Self {
            credentials,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for SquareAdapter {
    fn get_mapper(&self) -> &dyn Mapper {
        &SquareMapper
    }

    fn get_sync_logic(&self) -> &dyn SyncPolicy {
        &super::DelistOnZero
    }

    async fn get_api_client(&self, connection: &PlatformConnection) -> Result<Box<dyn ApiClient>> {
        let merchant_id = connection.unique_identifier().ok_or_else(|| {
            AppError::MissingPlatformData {
                platform: "square".to_string(),
                message: "connection is missing merchant id".to_string(),
            }
        })?;
        Ok(Box::new(SquareApiClient {
            http: self.http.clone(),
            merchant_id,
            access_token: self.credentials.application_secret.clone(),
            breaker: Mutex::new(CircuitBreaker::new(5, Duration::from_secs(30))),
        }))
    }

    async fn process_webhook(
        &self,
        store: &CanonicalStore,
        connection: &PlatformConnection,
        payload: &Value,
        _headers: &HashMap<String, String>,
        webhook_id: Option<&str>,
    ) -> Result<Vec<ActivityLogEntry>> {
        let event_type = payload["type"].as_str().unwrap_or("unknown");
        info!(webhook_id, event_type, connection_id = %connection.id, "processing square webhook");

        let platform_product_id = payload["id"].to_string();
        let quantity = payload.get("inventory_quantity").and_then(|v| v.as_i64());
        let location_id = payload
            .get("location_id")
            .and_then(|v| v.as_str())
            .unwrap_or("default");
        let inventory = quantity.map(|q| (q as i32, location_id));

        process_inventory_webhook(
            self,
            store,
            connection,
            &platform_product_id,
            inventory,
            webhook_id,
            "square",
        )
        .await
    }
}

struct SquareApiClient {
    http: Client,
    merchant_id: String,
    access_token: String,
    breaker: Mutex<CircuitBreaker>,
}

impl SquareApiClient {
    fn base_url(&self) -> &'static str {
        "https://connect.squareup.com/v2"
    }

    /// Gated by a per-connection circuit breaker (spec §5): repeated
    /// transient failures open the circuit so a struggling merchant account
    /// doesn't get hammered by every subsequent scan/sync tick.
    async fn authed_get(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url(), path);
        let mut breaker = self.breaker.lock().await;
        crate::recovery::with_circuit_breaker(
            &mut breaker,
            || async {
                let resp = self
                    .http
                    .get(&url)
                    .bearer_auth(&self.access_token)
                    .send()
                    .await
                    .map_err(|e| AppError::PlatformTransient {
                        platform: "square".to_string(),
                        message: e.to_string(),
                    })?;

                match resp.status().as_u16() {
                    401 | 403 => Err(AppError::PlatformAuthError {
                        platform: "square".to_string(),
                        message: "credentials rejected".to_string(),
                    }),
                    200..=299 => resp.json().await.map_err(|e| AppError::PlatformTransient {
                        platform: "square".to_string(),
                        message: e.to_string(),
                    }),
                    status => Err(AppError::PlatformTransient {
                        platform: "square".to_string(),
                        message: format!("unexpected status {}", status),
                    }),
                }
            },
            "square",
        )
        .await
    }
}

#[async_trait]
impl ApiClient for SquareApiClient {
    async fn fetch_all(&self) -> Result<Vec<Value>> {
        let body = self.authed_get("/catalog/list?types=ITEM").await?;
        Ok(body
            .get("objects")
            .and_then(|o| o.as_array())
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_overviews(&self) -> Result<Vec<Value>> {
        self.fetch_all().await
    }

    async fn fetch_product(&self, platform_product_id: &str) -> Result<Value> {
        let body = self
            .authed_get(&format!("/catalog/object/{}", platform_product_id))
            .await?;
        body.get("object").cloned().ok_or_else(|| AppError::NotFound {
            resource: format!("square catalog object {}", platform_product_id),
        })
    }

    async fn create_product(&self, bundle: &Value) -> Result<CreatedProduct> {
        let resp = self
            .http
            .post(format!("{}/catalog/object", self.base_url()))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "object": bundle, "idempotency_key": Uuid::new_v4().to_string() }))
            .send()
            .await
            .map_err(|e| AppError::PlatformTransient {
                platform: "square".to_string(),
                message: e.to_string(),
            })?;

        let body: Value = resp.json().await.map_err(|e| AppError::PlatformTransient {
            platform: "square".to_string(),
            message: e.to_string(),
        })?;

        Ok(CreatedProduct {
            platform_product_id: body["catalog_object"]["id"].as_str().unwrap_or_default().to_string(),
            platform_variant_ids: body["catalog_object"]["item_data"]["variations"]
                .as_array()
                .map(|vs| vs.iter().filter_map(|v| v["id"].as_str().map(String::from)).collect())
                .unwrap_or_default(),
        })
    }

    async fn update_product(&self, _platform_product_id: &str, bundle: &Value) -> Result<()> {
        self.http
            .post(format!("{}/catalog/object", self.base_url()))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "object": bundle }))
            .send()
            .await
            .map_err(|e| AppError::PlatformTransient {
                platform: "square".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete_product(&self, platform_product_id: &str) -> Result<()> {
        self.http
            .delete(format!("{}/catalog/object/{}", self.base_url(), platform_product_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::PlatformTransient {
                platform: "square".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn update_inventory(&self, updates: &[InventoryUpdate]) -> Result<InventoryUpdateResult> {
        let mut result = InventoryUpdateResult::default();
        let changes: Vec<Value> = updates
            .iter()
            .map(|u| {
                serde_json::json!({
                    "type": "PHYSICAL_COUNT",
                    "physical_count": {
                        "catalog_object_id": u.mapping.platform_variant_id,
                        "location_id": u.level.platform_location_id,
                        "quantity": u.level.quantity.to_string(),
                        "state": "IN_STOCK",
                    }
                })
            })
            .collect();

        let resp = self
            .http
            .post(format!("{}/inventory/changes/batch-create", self.base_url()))
            .bearer_auth(&self.access_token)
            .json(&serde_json::json!({ "idempotency_key": Uuid::new_v4().to_string(), "changes": changes }))
            .send()
            .await;

        match resp {
            Ok(r) if r.status().is_success() => result.success = updates.len() as u32,
            Ok(r) => {
                result.failure = updates.len() as u32;
                result.errors.push(format!("status {}", r.status()));
            }
            Err(e) => {
                result.failure = updates.len() as u32;
                result.errors.push(e.to_string());
            }
        }
        Ok(result)
    }

    async fn fetch_inventory(&self, platform_location_ids: &[String]) -> Result<Vec<Value>> {
        let body = self
            .authed_get(&format!(
                "/inventory/counts/batch-retrieve?location_ids={}",
                platform_location_ids.join(",")
            ))
            .await?;
        Ok(body
            .get("counts")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

struct SquareMapper;

impl Mapper for SquareMapper {
    fn map_platform_data_to_canonical(
        &self,
        raw: &[Value],
        user_id: Uuid,
        _connection_id: Uuid,
    ) -> MappedBatch {
        let mut batch = MappedBatch::default();

        for object in raw {
            let item_data = &object["item_data"];
            let platform_product_id = object["id"].as_str().unwrap_or_default().to_string();
            let temp_product_id = format!("sq-prod-{}", platform_product_id);

            batch.products.push(ProductDraft {
                temp_id: Some(temp_product_id.clone()),
                user_id,
                title: item_data["name"].as_str().map(String::from),
                description: item_data["description"].as_str().map(String::from),
                image_urls: Vec::new(),
                platform_specific_data: serde_json::json!({ "squareItemId": platform_product_id }),
            });

            for variation in item_data["variations"].as_array().unwrap_or(&Vec::new()) {
                let var_data = &variation["item_variation_data"];
                let platform_variant_id = variation["id"].as_str().map(String::from);
                let sku = var_data["sku"]
                    .as_str()
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .unwrap_or_else(|| {
                        VariantDraft::mint_temp_sku(&platform_product_id, platform_variant_id.as_deref())
                    });

                let price = var_data["price_money"]["amount"]
                    .as_i64()
                    .map(|cents| rust_decimal::Decimal::new(cents, 2))
                    .unwrap_or_default();

                batch.variants.push(VariantDraft {
                    temp_id: Some(format!("sq-var-{}", variation["id"])),
                    product_ref: temp_product_id.clone(),
                    user_id,
                    sku: Some(sku),
                    barcode: var_data["upc"].as_str().map(String::from),
                    title: var_data["name"].as_str().unwrap_or_default().to_string(),
                    description: None,
                    price,
                    compare_at_price: None,
                    cost: None,
                    weight: None,
                    weight_unit: None,
                    options: HashMap::new(),
                    requires_shipping: true,
                    taxable: true,
                    tax_code: None,
                    image_urls: Vec::new(),
                });
            }
        }

        batch
    }

    fn build_create_bundle(
        &self,
        product: &CanonicalProduct,
        variants: &[CanonicalProductVariant],
        _inventory: &[CanonicalInventoryLevel],
    ) -> Value {
        serde_json::json!({
            "type": "ITEM",
            "id": format!("#{}", product.id),
            "item_data": {
                "name": product.title,
                "description": product.description,
                "variations": variants.iter().map(|v| serde_json::json!({
                    "type": "ITEM_VARIATION",
                    "id": format!("#{}", v.id),
                    "item_variation_data": {
                        "name": v.title,
                        "sku": v.sku,
                        "upc": v.barcode,
                        "price_money": { "amount": (v.price * rust_decimal::Decimal::from(100)).to_string(), "currency": "USD" },
                    }
                })).collect::<Vec<_>>(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_square_signature_rejects_garbage() {
        assert!(!verify_square_signature("key", "https://example.com/webhook", b"body", "not-base64!"));
    }

    #[test]
    fn test_verify_square_signature_accepts_valid_hmac() {
        let url = "https://example.com/webhook";
        let mut mac = HmacSha256::new_from_slice(b"key").unwrap();
        mac.update(url.as_bytes());
        mac.update(b"body");
        let sig = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        assert!(verify_square_signature("key", url, b"body", &sig));
    }

    #[test]
    fn test_mapper_mints_temp_sku_when_sku_blank() {
        let raw = vec![serde_json::json!({
            "id": "SQITEM1",
            "item_data": {
                "name": "Widget",
                "variations": [{
                    "id": "SQVAR1",
                    "item_variation_data": { "name": "Default", "sku": "", "price_money": { "amount": 1999 } }
                }]
            }
        })];

        let batch = SquareMapper.map_platform_data_to_canonical(&raw, Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(batch.products.len(), 1);
        assert_eq!(batch.variants.len(), 1);
        assert_eq!(batch.variants[0].sku.as_deref(), Some("TEMP-SKU-SQITEM1-SQVAR1"));
        assert_eq!(batch.variants[0].price, rust_decimal::Decimal::new(1999, 2));
    }

    #[test]
    fn test_mapper_keeps_non_blank_sku_and_upc_barcode() {
        let raw = vec![serde_json::json!({
            "id": "SQITEM2",
            "item_data": {
                "name": "Gadget",
                "variations": [{
                    "id": "SQVAR2",
                    "item_variation_data": { "name": "Default", "sku": "GADGET-1", "upc": "012345678905", "price_money": { "amount": 500 } }
                }]
            }
        })];

        let batch = SquareMapper.map_platform_data_to_canonical(&raw, Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(batch.variants[0].sku.as_deref(), Some("GADGET-1"));
        assert_eq!(batch.variants[0].barcode.as_deref(), Some("012345678905"));
    }
}
