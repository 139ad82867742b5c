//! Mapping Engine (spec §4.4 step 6): scores candidate matches between
//! incoming platform variants and a user's existing canonical variants.

use crate::models::{CanonicalProductVariant, MatchType, MappingSuggestion, PlatformProductSnapshot};
use std::collections::HashMap;
use uuid::Uuid;

const BARCODE_CONFIDENCE: f64 = 0.95;
const SKU_CONFIDENCE: f64 = 0.90;

/// Indexes a user's canonical variants by normalized sku/barcode for O(1)
/// lookup while scanning an incoming platform page.
pub struct VariantIndex {
    by_sku: HashMap<String, Uuid>,
    by_barcode: HashMap<String, Uuid>,
}

impl VariantIndex {
    pub fn build(variants: &[CanonicalProductVariant]) -> Self {
        let mut by_sku = HashMap::new();
        let mut by_barcode = HashMap::new();

        for variant in variants {
            if let Some(sku) = &variant.sku {
                by_sku.insert(normalize(sku), variant.id);
            }
            if let Some(barcode) = &variant.barcode {
                by_barcode.insert(normalize(barcode), variant.id);
            }
        }

        Self { by_sku, by_barcode }
    }

    /// Score one incoming platform variant against the index (spec §4.4
    /// step 6): prefer barcode, else sku, else emit both when they diverge,
    /// else NONE/0.
    pub fn score(&self, snapshot: &PlatformProductSnapshot) -> Vec<MappingSuggestion> {
        let barcode_match = snapshot
            .platform_barcode
            .as_deref()
            .map(normalize)
            .and_then(|b| self.by_barcode.get(&b).copied());

        let sku_match = snapshot
            .platform_sku
            .as_deref()
            .map(normalize)
            .and_then(|s| self.by_sku.get(&s).copied());

        match (barcode_match, sku_match) {
            (Some(barcode_id), Some(sku_id)) if barcode_id != sku_id => vec![
                MappingSuggestion {
                    platform_product_snapshot: snapshot.clone(),
                    suggested_variant_id: Some(barcode_id),
                    match_type: MatchType::Barcode,
                    confidence: BARCODE_CONFIDENCE,
                },
                MappingSuggestion {
                    platform_product_snapshot: snapshot.clone(),
                    suggested_variant_id: Some(sku_id),
                    match_type: MatchType::Sku,
                    confidence: SKU_CONFIDENCE,
                },
            ],
            (Some(barcode_id), _) => vec![MappingSuggestion {
                platform_product_snapshot: snapshot.clone(),
                suggested_variant_id: Some(barcode_id),
                match_type: MatchType::Barcode,
                confidence: BARCODE_CONFIDENCE,
            }],
            (None, Some(sku_id)) => vec![MappingSuggestion {
                platform_product_snapshot: snapshot.clone(),
                suggested_variant_id: Some(sku_id),
                match_type: MatchType::Sku,
                confidence: SKU_CONFIDENCE,
            }],
            (None, None) => vec![MappingSuggestion {
                platform_product_snapshot: snapshot.clone(),
                suggested_variant_id: None,
                match_type: MatchType::None,
                confidence: 0.0,
            }],
        }
    }
}

fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn variant(id: Uuid, sku: Option<&str>, barcode: Option<&str>) -> CanonicalProductVariant {
        CanonicalProductVariant {
            id,
            product_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            sku: sku.map(String::from),
            barcode: barcode.map(String::from),
            title: "test".to_string(),
            description: None,
            price: Decimal::ZERO,
            compare_at_price: None,
            cost: None,
            weight: None,
            weight_unit: None,
            options: serde_json::json!({}),
            requires_shipping: true,
            taxable: true,
            tax_code: None,
            image_id: None,
            archived: false,
        }
    }

    fn snapshot(sku: Option<&str>, barcode: Option<&str>) -> PlatformProductSnapshot {
        PlatformProductSnapshot {
            platform_product_id: "p1".to_string(),
            platform_variant_id: Some("v1".to_string()),
            platform_sku: sku.map(String::from),
            platform_title: None,
            platform_barcode: barcode.map(String::from),
            raw: serde_json::json!({}),
        }
    }

    #[test]
    fn test_prefers_barcode_match() {
        let id_barcode = Uuid::new_v4();
        let id_sku = Uuid::new_v4();
        let index = VariantIndex::build(&[
            variant(id_barcode, None, Some("012345")),
            variant(id_sku, Some("SKU-1"), None),
        ]);

        let suggestions = index.score(&snapshot(Some("sku-1"), Some("012345")));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].match_type, MatchType::Barcode);
        assert_eq!(suggestions[0].confidence, 0.95);
    }

    #[test]
    fn test_emits_both_when_barcode_and_sku_diverge() {
        let id_barcode = Uuid::new_v4();
        let id_sku = Uuid::new_v4();
        let index = VariantIndex::build(&[
            variant(id_barcode, Some("OTHER-SKU"), Some("012345")),
            variant(id_sku, Some("SKU-1"), Some("999999")),
        ]);

        let suggestions = index.score(&snapshot(Some("sku-1"), Some("012345")));
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions.iter().any(|s| s.match_type == MatchType::Barcode));
        assert!(suggestions.iter().any(|s| s.match_type == MatchType::Sku));
    }

    #[test]
    fn test_none_when_no_match() {
        let index = VariantIndex::build(&[variant(Uuid::new_v4(), Some("SKU-9"), Some("999"))]);
        let suggestions = index.score(&snapshot(Some("sku-1"), Some("012345")));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].match_type, MatchType::None);
        assert_eq!(suggestions[0].confidence, 0.0);
    }

    #[test]
    fn test_sku_match_is_case_and_whitespace_insensitive() {
        let id = Uuid::new_v4();
        let index = VariantIndex::build(&[variant(id, Some("  SKU-1 "), None)]);
        let suggestions = index.score(&snapshot(Some("sku-1"), None));
        assert_eq!(suggestions[0].suggested_variant_id, Some(id));
    }
}
