use super::{
    process_inventory_webhook, ApiClient, CreatedProduct, InventoryUpdate, InventoryUpdateResult,
    MappedBatch, Mapper, PlatformAdapter, SyncPolicy,
};
use crate::config::CloverCredentials;
use crate::error::{AppError, Result};
use crate::models::{
    ActivityLogEntry, CanonicalInventoryLevel, CanonicalProduct, CanonicalProductVariant,
    PlatformConnection, ProductDraft, VariantDraft,
};
use crate::recovery::CircuitBreaker;
use crate::store::CanonicalStore;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

pub struct CloverAdapter {
    credentials: CloverCredentials,
    http: Client,
}

impl CloverAdapter {
    pub fn new(credentials: CloverCredentials) -> Self {
        Self {
            credentials,
            http: Client::new(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for CloverAdapter {
    fn get_mapper(&self) -> &dyn Mapper {
        &CloverMapper
    }

    fn get_sync_logic(&self) -> &dyn SyncPolicy {
        &super::DelistOnZero
    }

    async fn get_api_client(&self, connection: &PlatformConnection) -> Result<Box<dyn ApiClient>> {
        let merchant_id = connection.unique_identifier().ok_or_else(|| {
            AppError::MissingPlatformData {
                platform: "clover".to_string(),
                message: "connection is missing merchant id".to_string(),
            }
        })?;
        Ok(Box::new(CloverApiClient {
            http: self.http.clone(),
            merchant_id,
            app_secret: self.credentials.app_secret.clone(),
            breaker: Mutex::new(CircuitBreaker::new(5, Duration::from_secs(30))),
        }))
    }

    async fn process_webhook(
        &self,
        store: &CanonicalStore,
        connection: &PlatformConnection,
        payload: &Value,
        headers: &HashMap<String, String>,
        webhook_id: Option<&str>,
    ) -> Result<Vec<ActivityLogEntry>> {
        // Clover identifies the merchant by header or body field (spec §4.7).
        let merchant_id = headers
            .get("x-clover-merchant-id")
            .cloned()
            .or_else(|| payload["merchantId"].as_str().map(String::from))
            .unwrap_or_default();

        info!(webhook_id, merchant_id, connection_id = %connection.id, "processing clover webhook");

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
            "clover",
        )
        .await
    }
}

struct CloverApiClient {
    http: Client,
    merchant_id: String,
    app_secret: String,
    breaker: Mutex<CircuitBreaker>,
}

impl CloverApiClient {
    fn base_url(&self) -> String {
        format!("https://api.clover.com/v3/merchants/{}", self.merchant_id)
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
                    .bearer_auth(&self.app_secret)
                    .send()
                    .await
                    .map_err(|e| AppError::PlatformTransient {
                        platform: "clover".to_string(),
                        message: e.to_string(),
                    })?;

                match resp.status().as_u16() {
                    401 | 403 => Err(AppError::PlatformAuthError {
                        platform: "clover".to_string(),
                        message: "credentials rejected".to_string(),
                    }),
                    200..=299 => resp.json().await.map_err(|e| AppError::PlatformTransient {
                        platform: "clover".to_string(),
                        message: e.to_string(),
                    }),
                    status => Err(AppError::PlatformTransient {
                        platform: "clover".to_string(),
                        message: format!("unexpected status {}", status),
                    }),
                }
            },
            "clover",
        )
        .await
    }
}

#[async_trait]
impl ApiClient for CloverApiClient {
    async fn fetch_all(&self) -> Result<Vec<Value>> {
        let body = self.authed_get("/items?expand=itemStock,categories").await?;
        Ok(body
            .get("elements")
            .and_then(|e| e.as_array())
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_overviews(&self) -> Result<Vec<Value>> {
        let body = self.authed_get("/items").await?;
        Ok(body
            .get("elements")
            .and_then(|e| e.as_array())
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_product(&self, platform_product_id: &str) -> Result<Value> {
        self.authed_get(&format!("/items/{}", platform_product_id)).await
    }

    async fn create_product(&self, bundle: &Value) -> Result<CreatedProduct> {
        let resp = self
            .http
            .post(format!("{}/items", self.base_url()))
            .bearer_auth(&self.app_secret)
            .json(bundle)
            .send()
            .await
            .map_err(|e| AppError::PlatformTransient {
                platform: "clover".to_string(),
                message: e.to_string(),
            })?;

        let body: Value = resp.json().await.map_err(|e| AppError::PlatformTransient {
            platform: "clover".to_string(),
            message: e.to_string(),
        })?;

        Ok(CreatedProduct {
            platform_product_id: body["id"].as_str().unwrap_or_default().to_string(),
            platform_variant_ids: Vec::new(),
        })
    }

    async fn update_product(&self, platform_product_id: &str, bundle: &Value) -> Result<()> {
        self.http
            .post(format!("{}/items/{}", self.base_url(), platform_product_id))
            .bearer_auth(&self.app_secret)
            .json(bundle)
            .send()
            .await
            .map_err(|e| AppError::PlatformTransient {
                platform: "clover".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete_product(&self, platform_product_id: &str) -> Result<()> {
        self.http
            .delete(format!("{}/items/{}", self.base_url(), platform_product_id))
            .bearer_auth(&self.app_secret)
            .send()
            .await
            .map_err(|e| AppError::PlatformTransient {
                platform: "clover".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn update_inventory(&self, updates: &[InventoryUpdate]) -> Result<InventoryUpdateResult> {
        let mut result = InventoryUpdateResult::default();
        for update in updates {
            let resp = self
                .http
                .post(format!(
                    "{}/item_stocks/{}",
                    self.base_url(),
                    update.mapping.platform_variant_id.as_deref().unwrap_or_default()
                ))
                .bearer_auth(&self.app_secret)
                .json(&serde_json::json!({ "quantity": update.level.quantity }))
                .send()
                .await;

            match resp {
                Ok(r) if r.status().is_success() => result.success += 1,
                Ok(r) => {
                    result.failure += 1;
                    result.errors.push(format!("status {}", r.status()));
                }
                Err(e) => {
                    result.failure += 1;
                    result.errors.push(e.to_string());
                }
            }
        }
        Ok(result)
    }

    async fn fetch_inventory(&self, _platform_location_ids: &[String]) -> Result<Vec<Value>> {
        let body = self.authed_get("/item_stocks").await?;
        Ok(body
            .get("elements")
            .and_then(|e| e.as_array())
            .cloned()
            .unwrap_or_default())
    }
}

struct CloverMapper;

impl Mapper for CloverMapper {
    fn map_platform_data_to_canonical(
        &self,
        raw: &[Value],
        user_id: Uuid,
        _connection_id: Uuid,
    ) -> MappedBatch {
        let mut batch = MappedBatch::default();

        for item in raw {
            let platform_product_id = item["id"].as_str().unwrap_or_default().to_string();
            let temp_id = format!("clover-prod-{}", platform_product_id);

            let sku = item["sku"]
                .as_str()
                .filter(|s| !s.is_empty())
                .map(String::from)
                .unwrap_or_else(|| VariantDraft::mint_temp_sku(&platform_product_id, None));

            let price = item["price"]
                .as_i64()
                .map(|cents| rust_decimal::Decimal::new(cents, 2))
                .unwrap_or_default();

            batch.products.push(ProductDraft {
                temp_id: Some(temp_id.clone()),
                user_id,
                title: item["name"].as_str().map(String::from),
                description: None,
                image_urls: Vec::new(),
                platform_specific_data: serde_json::json!({ "cloverItemId": platform_product_id }),
            });

            // Clover items are single-variant; one canonical variant per item.
            batch.variants.push(VariantDraft {
                temp_id: Some(format!("clover-var-{}", platform_product_id)),
                product_ref: temp_id,
                user_id,
                sku: Some(sku),
                barcode: item["code"].as_str().map(String::from),
                title: item["name"].as_str().unwrap_or_default().to_string(),
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

        batch
    }

    fn build_create_bundle(
        &self,
        product: &CanonicalProduct,
        variants: &[CanonicalProductVariant],
        _inventory: &[CanonicalInventoryLevel],
    ) -> Value {
        let variant = variants.first();
        serde_json::json!({
            "name": product.title,
            "price": variant.map(|v| (v.price * rust_decimal::Decimal::from(100)).to_string()),
            "sku": variant.and_then(|v| v.sku.clone()),
            "code": variant.and_then(|v| v.barcode.clone()),
        })
    }
}
