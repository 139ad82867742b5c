use super::{CloverAdapter, PlatformAdapter, ShopifyAdapter, SquareAdapter, StubAdapter};
use crate::config::PlatformCredentialsConfig;
use crate::error::{AppError, Result};
use crate::models::PlatformKind;
use std::collections::HashMap;
use std::sync::Arc;

/// Looks up the one adapter registered for a platform kind. Built once at
/// startup from whichever platform credentials are configured.
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Arc<HashMap<PlatformKind, Arc<dyn PlatformAdapter>>>,
}

impl AdapterRegistry {
    pub fn from_config(config: &PlatformCredentialsConfig) -> Self {
        let mut adapters: HashMap<PlatformKind, Arc<dyn PlatformAdapter>> = HashMap::new();

        if let Some(shopify) = &config.shopify {
            adapters.insert(
                PlatformKind::Shopify,
                Arc::new(ShopifyAdapter::new(shopify.clone())),
            );
        }
        if let Some(square) = &config.square {
            adapters.insert(
                PlatformKind::Square,
                Arc::new(SquareAdapter::new(square.clone())),
            );
        }
        if let Some(clover) = &config.clover {
            adapters.insert(
                PlatformKind::Clover,
                Arc::new(CloverAdapter::new(clover.clone())),
            );
        }
        // eBay, Facebook and Whatnot ship as capability stubs until their
        // adapters are built out; they still answer the contract so the
        // onboarding coordinator can route to them without special-casing.
        for kind in [PlatformKind::Ebay, PlatformKind::Facebook, PlatformKind::Whatnot] {
            adapters.insert(kind, Arc::new(StubAdapter::new(kind)));
        }

        Self {
            adapters: Arc::new(adapters),
        }
    }

    pub fn get(&self, kind: PlatformKind) -> Result<Arc<dyn PlatformAdapter>> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| AppError::ConfigurationError {
                message: format!("no adapter registered for platform {}", kind),
            })
    }

    pub fn available_platforms(&self) -> Vec<PlatformKind> {
        self.adapters.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_always_has_capability_stubs() {
        let registry = AdapterRegistry::from_config(&PlatformCredentialsConfig::default());
        assert!(registry.get(PlatformKind::Ebay).is_ok());
        assert!(registry.get(PlatformKind::Shopify).is_err());
    }
}
