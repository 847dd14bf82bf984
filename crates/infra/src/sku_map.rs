//! SKU -> UPC fallback map, rebuilt from each tenant's product export.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use stocksync_core::{TenantName, Upc};

use crate::error::StoreError;
use crate::keys::SKU_MAP_TTL;

pub trait SkuMapStore: Send + Sync {
    /// Replace the tenant's whole map.
    fn replace(&self, tenant: &TenantName, entries: &BTreeMap<String, Upc>) -> Result<(), StoreError>;

    fn lookup(&self, tenant: &TenantName, sku: &str) -> Result<Option<Upc>, StoreError>;
}

impl<S: SkuMapStore + ?Sized> SkuMapStore for Arc<S> {
    fn replace(&self, tenant: &TenantName, entries: &BTreeMap<String, Upc>) -> Result<(), StoreError> {
        (**self).replace(tenant, entries)
    }

    fn lookup(&self, tenant: &TenantName, sku: &str) -> Result<Option<Upc>, StoreError> {
        (**self).lookup(tenant, sku)
    }
}

#[derive(Debug)]
pub struct InMemorySkuMapStore {
    ttl: Duration,
    maps: RwLock<HashMap<TenantName, (BTreeMap<String, Upc>, Instant)>>,
}

impl Default for InMemorySkuMapStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySkuMapStore {
    pub fn new() -> Self {
        Self {
            ttl: SKU_MAP_TTL,
            maps: RwLock::new(HashMap::new()),
        }
    }
}

impl SkuMapStore for InMemorySkuMapStore {
    fn replace(&self, tenant: &TenantName, entries: &BTreeMap<String, Upc>) -> Result<(), StoreError> {
        let mut maps = self
            .maps
            .write()
            .map_err(|_| StoreError::Command("sku map lock poisoned".to_string()))?;
        if entries.is_empty() {
            maps.remove(tenant);
        } else {
            maps.insert(tenant.clone(), (entries.clone(), Instant::now() + self.ttl));
        }
        Ok(())
    }

    fn lookup(&self, tenant: &TenantName, sku: &str) -> Result<Option<Upc>, StoreError> {
        let maps = self
            .maps
            .read()
            .map_err(|_| StoreError::Command("sku map lock poisoned".to_string()))?;
        Ok(maps
            .get(tenant)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .and_then(|(map, _)| map.get(sku).copied()))
    }
}
