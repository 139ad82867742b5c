//! Request validation utilities and custom validators

use crate::error::{AppError, Result};
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationError};

/// Validated JSON extractor that automatically validates incoming requests
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::InvalidRequestFormat(rejection.to_string()))?;

        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

/// Custom validator for SKUs
pub fn validate_sku(sku: &str) -> std::result::Result<(), ValidationError> {
    if sku.trim().is_empty() {
        return Err(ValidationError::new("sku_empty"));
    }

    if sku.len() > 255 {
        return Err(ValidationError::new("sku_too_long"));
    }

    if sku.contains(['<', '>', '"', '\'']) {
        return Err(ValidationError::new("sku_invalid_characters"));
    }

    Ok(())
}

/// Custom validator for barcodes (GTIN/UPC/EAN family, digits only)
pub fn validate_barcode(barcode: &str) -> std::result::Result<(), ValidationError> {
    if barcode.is_empty() || barcode.len() > 14 {
        return Err(ValidationError::new("barcode_invalid_length"));
    }

    if !barcode.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("barcode_invalid_format"));
    }

    Ok(())
}

/// Custom validator for platform identifiers (shop domains, merchant ids)
pub fn validate_platform_identifier(identifier: &str) -> std::result::Result<(), ValidationError> {
    if identifier.trim().is_empty() {
        return Err(ValidationError::new("platform_identifier_empty"));
    }

    if identifier.len() > 255 {
        return Err(ValidationError::new("platform_identifier_too_long"));
    }

    Ok(())
}

/// Custom validator for UUIDs
pub fn validate_uuid_string(uuid_str: &str) -> std::result::Result<(), ValidationError> {
    uuid::Uuid::parse_str(uuid_str).map_err(|_| ValidationError::new("invalid_uuid"))?;
    Ok(())
}

/// Custom validator for pagination limits
pub fn validate_pagination_limit(limit: i32) -> std::result::Result<(), ValidationError> {
    if limit < 1 {
        return Err(ValidationError::new("limit_too_small"));
    }

    if limit > 100 {
        return Err(ValidationError::new("limit_too_large"));
    }

    Ok(())
}

/// Custom validator for pagination offsets
pub fn validate_pagination_offset(offset: i32) -> std::result::Result<(), ValidationError> {
    if offset < 0 {
        return Err(ValidationError::new("offset_negative"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_sku() {
        assert!(validate_sku("SKU-001").is_ok());
        assert!(validate_sku("").is_err());
        assert!(validate_sku("bad<script>").is_err());
    }

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("012345678905").is_ok());
        assert!(validate_barcode("").is_err());
        assert!(validate_barcode("abc123").is_err());
        assert!(validate_barcode("123456789012345").is_err());
    }

    #[test]
    fn test_validate_platform_identifier() {
        assert!(validate_platform_identifier("my-shop.myshopify.com").is_ok());
        assert!(validate_platform_identifier("").is_err());
    }

    #[test]
    fn test_validate_pagination_limit() {
        assert!(validate_pagination_limit(50).is_ok());
        assert!(validate_pagination_limit(0).is_err());
        assert!(validate_pagination_limit(101).is_err());
    }

    #[test]
    fn test_validate_uuid_string() {
        assert!(validate_uuid_string(&uuid::Uuid::new_v4().to_string()).is_ok());
        assert!(validate_uuid_string("not-a-uuid").is_err());
    }
}
