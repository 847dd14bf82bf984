//! Tenant directory: who the tenants are and how to reach their shops.
//!
//! Each tenant's shop client is built once at startup and shared by every
//! cycle for that tenant.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::warn;

use stocksync_core::TenantName;
use stocksync_reconcile::{CategoryPolicyConfig, CommerceStore, ShopClient, TenantContext};

use crate::config::ConfigError;

/// One entry of the tenants JSON file.
#[derive(Clone, Deserialize)]
pub struct TenantConfig {
    pub name: TenantName,
    pub shop_url: String,
    pub access_token: String,
    #[serde(default)]
    pub location_id: Option<u64>,
    #[serde(default)]
    pub fulfillment_handle: Option<String>,
    #[serde(default)]
    pub category_policy: Option<CategoryPolicyConfig>,
}

impl std::fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConfig")
            .field("name", &self.name)
            .field("shop_url", &self.shop_url)
            .field("location_id", &self.location_id)
            .field("fulfillment_handle", &self.fulfillment_handle)
            .field("category_policy", &self.category_policy)
            .finish_non_exhaustive()
    }
}

impl TenantConfig {
    fn context(&self) -> TenantContext {
        TenantContext {
            tenant: self.name.clone(),
            location_id: self.location_id,
            fulfillment_handle: self.fulfillment_handle.clone(),
            category_policy: self.category_policy.as_ref().map(CategoryPolicyConfig::build),
        }
    }
}

#[derive(Clone)]
pub struct TenantEntry {
    pub context: TenantContext,
    pub shop: Arc<dyn CommerceStore>,
}

impl std::fmt::Debug for TenantEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantEntry")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TenantDirectory {
    tenants: BTreeMap<TenantName, TenantEntry>,
}

impl TenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the tenants file and build a shop client per tenant.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::TenantsFile {
            path: path.to_path_buf(),
            source,
        })?;
        let configs: Vec<TenantConfig> = serde_json::from_str(&raw).map_err(|source| ConfigError::TenantsDecode {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_configs(configs)
    }

    pub fn from_configs(configs: Vec<TenantConfig>) -> Result<Self, ConfigError> {
        let mut directory = Self::new();
        for config in configs {
            if directory.get(&config.name).is_some() {
                return Err(ConfigError::Tenant {
                    tenant: config.name,
                    reason: "listed more than once".to_string(),
                });
            }
            if config.location_id.is_none() {
                // Still loaded: the tenant's cycles fail on their own while others run.
                warn!(tenant = %config.name, "tenant has no inventory location configured");
            }
            let shop = ShopClient::new(&config.shop_url, config.access_token.clone()).map_err(|e| {
                ConfigError::Tenant {
                    tenant: config.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            directory.insert(config.context(), Arc::new(shop));
        }
        Ok(directory)
    }

    pub fn insert(&mut self, context: TenantContext, shop: Arc<dyn CommerceStore>) {
        self.tenants.insert(context.tenant.clone(), TenantEntry { context, shop });
    }

    pub fn get(&self, tenant: &TenantName) -> Option<&TenantEntry> {
        self.tenants.get(tenant)
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &TenantName> {
        self.tenants.keys()
    }
}
