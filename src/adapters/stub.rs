use super::{ApiClient, MappedBatch, Mapper, PlatformAdapter, SyncPolicy};
use crate::error::{AppError, Result};
use crate::models::{ActivityLogEntry, CanonicalProduct, CanonicalProductVariant, PlatformConnection, PlatformKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Capability-typed placeholder for platforms whose adapter isn't built out
/// yet (eBay, Facebook, Whatnot). Registered so the onboarding coordinator
/// and dispatcher can route to a platform kind uniformly; every operation
/// fails with `platform_transient` rather than panicking.
pub struct StubAdapter {
    kind: PlatformKind,
}

impl StubAdapter {
    pub fn new(kind: PlatformKind) -> Self {
        Self { kind }
    }

    fn unavailable(&self) -> AppError {
        AppError::PlatformTransient {
            platform: self.kind.to_string(),
            message: "adapter not yet implemented for this platform".to_string(),
        }
    }
}

#[async_trait]
impl PlatformAdapter for StubAdapter {
    fn get_mapper(&self) -> &dyn Mapper {
        &NullMapper
    }

    fn get_sync_logic(&self) -> &dyn SyncPolicy {
        &super::DelistOnZero
    }

    async fn get_api_client(&self, _connection: &PlatformConnection) -> Result<Box<dyn ApiClient>> {
        Err(self.unavailable())
    }

    async fn process_webhook(
        &self,
        _store: &crate::store::CanonicalStore,
        _connection: &PlatformConnection,
        _payload: &Value,
        _headers: &HashMap<String, String>,
        _webhook_id: Option<&str>,
    ) -> Result<Vec<ActivityLogEntry>> {
        Err(self.unavailable())
    }
}

struct NullMapper;

impl Mapper for NullMapper {
    fn map_platform_data_to_canonical(&self, _raw: &[Value], _user_id: Uuid, _connection_id: Uuid) -> MappedBatch {
        MappedBatch::default()
    }

    fn build_create_bundle(&self, _product: &CanonicalProduct, _variants: &[CanonicalProductVariant], _inventory: &[crate::models::CanonicalInventoryLevel]) -> Value {
        Value::Null
    }
}
