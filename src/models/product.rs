use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Owner-scoped grouping for variants sharing title/description/images.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CanonicalProduct {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub archived: bool,
    pub image_urls: Vec<String>,
    pub platform_specific_data: serde_json::Value,
}

/// A draft product awaiting a real id (e.g. `shop-prod-…`) while a job
/// threads a temp-id-to-real-id map through a batch (spec §4.2).
#[derive(Debug, Clone)]
pub struct ProductDraft {
    pub temp_id: Option<String>,
    pub user_id: Uuid,
    pub title: Option<String>,
    pub description: Option<String>,
    pub image_urls: Vec<String>,
    pub platform_specific_data: serde_json::Value,
}

/// The atomic sellable unit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CanonicalProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    /// name -> value (e.g. "Size" -> "Large"). Must be a subset of the
    /// options declared on the owning product.
    pub options: serde_json::Value,
    pub requires_shipping: bool,
    pub taxable: bool,
    pub tax_code: Option<String>,
    pub image_id: Option<Uuid>,
    pub archived: bool,
}

impl CanonicalProductVariant {
    pub fn options_map(&self) -> HashMap<String, String> {
        serde_json::from_value(self.options.clone()).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct VariantDraft {
    pub temp_id: Option<String>,
    /// References either a real product id or a temp id resolved via the
    /// batch's id map.
    pub product_ref: String,
    pub user_id: Uuid,
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub weight: Option<Decimal>,
    pub weight_unit: Option<String>,
    pub options: HashMap<String, String>,
    pub requires_shipping: bool,
    pub taxable: bool,
    pub tax_code: Option<String>,
    pub image_urls: Vec<String>,
}

impl VariantDraft {
    /// Mint a stable temp SKU per spec §4.5: `TEMP-SKU-{platformProductId}-{platformVariantId|timestamp}`.
    pub fn mint_temp_sku(platform_product_id: &str, platform_variant_id: Option<&str>) -> String {
        match platform_variant_id {
            Some(pvid) => format!("TEMP-SKU-{}-{}", platform_product_id, pvid),
            None => format!(
                "TEMP-SKU-{}-{}",
                platform_product_id,
                chrono::Utc::now().timestamp_millis()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_temp_sku_stable_with_variant_id() {
        let a = VariantDraft::mint_temp_sku("p1", Some("v1"));
        let b = VariantDraft::mint_temp_sku("p1", Some("v1"));
        assert_eq!(a, b);
        assert_eq!(a, "TEMP-SKU-p1-v1");
    }
}
