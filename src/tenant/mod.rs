use async_trait::async_trait;
use std::collections::HashMap;
use wa_relay_core::{InboundRoute, TenantResolver};

use crate::config::TenantsConfig;

/// Resolves tenants from a fixed phone-number-id table with an optional
/// fallback tenant.
#[derive(Debug, Clone, Default)]
pub struct StaticTenantResolver {
    by_phone_number_id: HashMap<String, String>,
    default_tenant: Option<String>,
}

impl StaticTenantResolver {
    pub fn new(by_phone_number_id: HashMap<String, String>, default_tenant: Option<String>) -> Self {
        Self {
            by_phone_number_id,
            default_tenant: default_tenant.filter(|t| !t.trim().is_empty()),
        }
    }

    /// Every event resolves to `tenant_id`.
    pub fn single(tenant_id: impl Into<String>) -> Self {
        Self::new(HashMap::new(), Some(tenant_id.into()))
    }

    pub fn from_config(config: &TenantsConfig) -> Self {
        Self::new(
            config.phone_numbers.clone(),
            Some(config.default_tenant.clone()),
        )
    }

    pub fn resolve(&self, route: &InboundRoute<'_>) -> Option<String> {
        route
            .phone_number_id
            .and_then(|id| self.by_phone_number_id.get(id))
            .or(self.default_tenant.as_ref())
            .cloned()
    }
}

#[async_trait]
impl TenantResolver for StaticTenantResolver {
    async fn resolve_inbound(&self, route: &InboundRoute<'_>) -> Option<String> {
        self.resolve(route)
    }
}
