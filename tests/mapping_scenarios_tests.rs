//! End-to-end Mapping Engine scenarios from spec §8, exercised without a
//! database: the scoring algorithm (§4.4 step 6) and temp-SKU minting are
//! both pure.

use rust_decimal::Decimal;
use sync_engine::mapping::VariantIndex;
use sync_engine::models::{
    CanonicalProductVariant, MatchType, PlatformProductSnapshot, VariantDraft,
};
use uuid::Uuid;

fn variant(sku: Option<&str>, barcode: Option<&str>) -> CanonicalProductVariant {
    CanonicalProductVariant {
        id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        sku: sku.map(String::from),
        barcode: barcode.map(String::from),
        title: "fixture".to_string(),
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

fn snapshot(platform_product_id: &str, sku: Option<&str>, barcode: Option<&str>) -> PlatformProductSnapshot {
    PlatformProductSnapshot {
        platform_product_id: platform_product_id.to_string(),
        platform_variant_id: Some(format!("{}-v1", platform_product_id)),
        platform_sku: sku.map(String::from),
        platform_title: None,
        platform_barcode: barcode.map(String::from),
        raw: serde_json::json!({}),
    }
}

/// Scenario 1 (spec §8): first scan of a 3-product, 4-variant catalog with
/// no existing canonical variants yields 4 NONE suggestions.
#[test]
fn test_scenario_first_scan_with_no_existing_catalog_yields_all_none() {
    let index = VariantIndex::build(&[]);

    let snapshots = [
        snapshot("p1", Some("A"), None),
        snapshot("p1", Some("B"), None),
        snapshot("p2", Some("C"), None),
        snapshot("p3", Some("D"), None),
    ];

    let suggestions: Vec<_> = snapshots.iter().flat_map(|s| index.score(s)).collect();

    assert_eq!(suggestions.len(), 4);
    assert!(suggestions.iter().all(|s| s.match_type == MatchType::None));
    assert!(suggestions.iter().all(|s| s.confidence == 0.0));
    assert!(suggestions.iter().all(|s| s.suggested_variant_id.is_none()));
}

/// Boundary behavior (spec §8): a platform variant whose barcode matches one
/// canonical variant and whose SKU matches a *different* canonical variant
/// yields two distinct suggestions, not one merged or arbitrarily-chosen one.
#[test]
fn test_boundary_divergent_barcode_and_sku_matches_yield_two_suggestions() {
    let barcode_owner = variant(Some("OTHER-SKU"), Some("012345678"));
    let sku_owner = variant(Some("SKU-1"), Some("999999999"));
    let index = VariantIndex::build(&[barcode_owner.clone(), sku_owner.clone()]);

    let suggestions = index.score(&snapshot("p99", Some("sku-1"), Some("012345678")));

    assert_eq!(suggestions.len(), 2);
    let barcode_suggestion = suggestions
        .iter()
        .find(|s| s.match_type == MatchType::Barcode)
        .expect("barcode suggestion present");
    let sku_suggestion = suggestions
        .iter()
        .find(|s| s.match_type == MatchType::Sku)
        .expect("sku suggestion present");

    assert_eq!(barcode_suggestion.suggested_variant_id, Some(barcode_owner.id));
    assert_eq!(sku_suggestion.suggested_variant_id, Some(sku_owner.id));
    assert_eq!(barcode_suggestion.confidence, 0.95);
    assert_eq!(sku_suggestion.confidence, 0.90);
}

/// When barcode and sku agree on the same canonical variant, only one
/// suggestion is emitted, preferring the barcode match type (spec §4.4 step 6).
#[test]
fn test_agreeing_barcode_and_sku_yield_single_barcode_suggestion() {
    let owner = variant(Some("SKU-1"), Some("012345678"));
    let index = VariantIndex::build(&[owner.clone()]);

    let suggestions = index.score(&snapshot("p1", Some("sku-1"), Some("012345678")));

    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].match_type, MatchType::Barcode);
    assert_eq!(suggestions[0].suggested_variant_id, Some(owner.id));
}

/// Scan replay (spec §8 round-trip): scoring the same snapshots against the
/// same index twice produces the same suggestion set (modulo ordering).
#[test]
fn test_scan_replay_is_deterministic() {
    let owner = variant(Some("SKU-1"), Some("012345678"));
    let index = VariantIndex::build(&[owner]);
    let snap = snapshot("p1", Some("sku-1"), None);

    let first = index.score(&snap);
    let second = index.score(&snap);

    assert_eq!(first.len(), second.len());
    assert_eq!(first[0].match_type, second[0].match_type);
    assert_eq!(first[0].suggested_variant_id, second[0].suggested_variant_id);
    assert_eq!(first[0].confidence, second[0].confidence);
}

/// Boundary behavior (spec §8): a variant with a null SKU receives a minted
/// TEMP-SKU that is stable for (platformProductId, platformVariantId).
#[test]
fn test_minted_temp_sku_is_stable_for_same_platform_ids() {
    let a = VariantDraft::mint_temp_sku("shop-prod-42", Some("shop-var-7"));
    let b = VariantDraft::mint_temp_sku("shop-prod-42", Some("shop-var-7"));
    assert_eq!(a, b);

    let different_variant = VariantDraft::mint_temp_sku("shop-prod-42", Some("shop-var-8"));
    assert_ne!(a, different_variant);
}
