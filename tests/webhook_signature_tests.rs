//! Webhook Dispatcher signature verification (spec §4.7 step 3). These are
//! pure functions re-exported from the adapters module, so they're tested
//! here without a database or HTTP server.

use sync_engine::adapters::{verify_shopify_signature, verify_square_signature};

const BODY: &[u8] = br#"{"id":123,"inventory_quantity":85}"#;

#[test]
fn test_shopify_signature_accepts_valid_hmac() {
    let secret = "shhh_shopify_secret";
    // HMAC-SHA256(secret, BODY), base64, computed independently of the crate.
    let signature = "BeAVcNt9Rd+nagfphy2JrKeBRHjGiItyoENCDRIuyD8=";
    assert!(verify_shopify_signature(secret, BODY, signature));
}

#[test]
fn test_shopify_signature_rejects_wrong_secret() {
    let signature = "BeAVcNt9Rd+nagfphy2JrKeBRHjGiItyoENCDRIuyD8=";
    assert!(!verify_shopify_signature("some_other_secret", BODY, signature));
}

#[test]
fn test_shopify_signature_rejects_tampered_body() {
    let secret = "shhh_shopify_secret";
    let signature = "BeAVcNt9Rd+nagfphy2JrKeBRHjGiItyoENCDRIuyD8=";
    let tampered = br#"{"id":123,"inventory_quantity":0}"#;
    assert!(!verify_shopify_signature(secret, tampered, signature));
}

#[test]
fn test_shopify_signature_rejects_malformed_base64() {
    assert!(!verify_shopify_signature("shhh_shopify_secret", BODY, "not-valid-base64!!"));
}

#[test]
fn test_square_signature_accepts_valid_hmac() {
    let key = "square_signing_key";
    let url = "https://example.com/webhook/square";
    // HMAC-SHA256(key, url || BODY), base64, computed independently of the crate.
    let signature = "dTDCiAIyuf9aSGTiZk/eT3TpaFfivYYInilsTr1n1uM=";
    assert!(verify_square_signature(key, url, BODY, signature));
}

#[test]
fn test_square_signature_is_bound_to_notification_url() {
    let key = "square_signing_key";
    let signature = "dTDCiAIyuf9aSGTiZk/eT3TpaFfivYYInilsTr1n1uM=";
    // Same key/body/signature but a different URL must not verify: Square
    // binds the MAC to the delivery URL precisely to prevent replay against
    // a different endpoint.
    assert!(!verify_square_signature(
        key,
        "https://example.com/webhook/square-other",
        BODY,
        signature
    ));
}

#[test]
fn test_square_signature_rejects_wrong_key() {
    let url = "https://example.com/webhook/square";
    let signature = "dTDCiAIyuf9aSGTiZk/eT3TpaFfivYYInilsTr1n1uM=";
    assert!(!verify_square_signature("wrong_key", url, BODY, signature));
}
