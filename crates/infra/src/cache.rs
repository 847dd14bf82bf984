//! Per-tenant inventory cache.
//!
//! One field hash per UPC under `{tenant}:inventory:upc:{UPC}` plus a set of
//! known UPCs under `{tenant}:inventory:upcs`. Both carry a 12-hour TTL that is
//! refreshed on every write.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use stocksync_core::{TenantName, Upc};

use crate::error::StoreError;
use crate::keys::INVENTORY_TTL;

/// Field name to stringified value.
pub type InventoryFields = BTreeMap<String, String>;

/// Shared inventory cache, namespaced by tenant.
pub trait InventoryCache: Send + Sync {
    /// Delete every record and the UPC set of `tenant`.
    fn reset(&self, tenant: &TenantName) -> Result<(), StoreError>;

    /// Write all fields of one record, add the UPC to the set and refresh both TTLs.
    fn add_item(&self, tenant: &TenantName, upc: Upc, fields: &InventoryFields) -> Result<(), StoreError>;

    fn get_item(&self, tenant: &TenantName, upc: Upc) -> Result<Option<InventoryFields>, StoreError>;

    fn get_item_value(&self, tenant: &TenantName, upc: Upc, field: &str) -> Result<Option<String>, StoreError>;

    /// Number of UPCs in the tenant's set.
    fn count(&self, tenant: &TenantName) -> Result<usize, StoreError>;
}

impl<C: InventoryCache + ?Sized> InventoryCache for Arc<C> {
    fn reset(&self, tenant: &TenantName) -> Result<(), StoreError> {
        (**self).reset(tenant)
    }

    fn add_item(&self, tenant: &TenantName, upc: Upc, fields: &InventoryFields) -> Result<(), StoreError> {
        (**self).add_item(tenant, upc, fields)
    }

    fn get_item(&self, tenant: &TenantName, upc: Upc) -> Result<Option<InventoryFields>, StoreError> {
        (**self).get_item(tenant, upc)
    }

    fn get_item_value(&self, tenant: &TenantName, upc: Upc, field: &str) -> Result<Option<String>, StoreError> {
        (**self).get_item_value(tenant, upc, field)
    }

    fn count(&self, tenant: &TenantName) -> Result<usize, StoreError> {
        (**self).count(tenant)
    }
}

#[derive(Debug, Default)]
struct TenantInventory {
    upcs: BTreeSet<Upc>,
    set_expires_at: Option<Instant>,
    items: HashMap<Upc, (InventoryFields, Instant)>,
}

/// In-memory cache with the same TTL semantics as the Redis one.
#[derive(Debug)]
pub struct InMemoryInventoryCache {
    ttl: Duration,
    tenants: RwLock<HashMap<TenantName, TenantInventory>>,
}

impl Default for InMemoryInventoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInventoryCache {
    pub fn new() -> Self {
        Self::with_ttl(INVENTORY_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    fn poisoned() -> StoreError {
        StoreError::Command("inventory cache lock poisoned".to_string())
    }
}

impl InventoryCache for InMemoryInventoryCache {
    fn reset(&self, tenant: &TenantName) -> Result<(), StoreError> {
        let mut tenants = self.tenants.write().map_err(|_| Self::poisoned())?;
        tenants.remove(tenant);
        Ok(())
    }

    fn add_item(&self, tenant: &TenantName, upc: Upc, fields: &InventoryFields) -> Result<(), StoreError> {
        let mut tenants = self.tenants.write().map_err(|_| Self::poisoned())?;
        let now = Instant::now();
        let entry = tenants.entry(tenant.clone()).or_default();

        if entry.set_expires_at.is_some_and(|at| at <= now) {
            entry.upcs.clear();
        }
        let expires_at = now + self.ttl;

        let (stored, stored_expiry) = entry
            .items
            .entry(upc)
            .or_insert_with(|| (InventoryFields::new(), expires_at));
        if *stored_expiry <= now {
            stored.clear();
        }
        // HSET semantics: fields are merged over whatever the record held.
        stored.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
        *stored_expiry = expires_at;

        entry.upcs.insert(upc);
        entry.set_expires_at = Some(expires_at);
        Ok(())
    }

    fn get_item(&self, tenant: &TenantName, upc: Upc) -> Result<Option<InventoryFields>, StoreError> {
        let tenants = self.tenants.read().map_err(|_| Self::poisoned())?;
        let now = Instant::now();
        Ok(tenants
            .get(tenant)
            .and_then(|t| t.items.get(&upc))
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(fields, _)| fields.clone()))
    }

    fn get_item_value(&self, tenant: &TenantName, upc: Upc, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .get_item(tenant, upc)?
            .and_then(|fields| fields.get(field).cloned()))
    }

    fn count(&self, tenant: &TenantName) -> Result<usize, StoreError> {
        let tenants = self.tenants.read().map_err(|_| Self::poisoned())?;
        let now = Instant::now();
        Ok(tenants
            .get(tenant)
            .filter(|t| t.set_expires_at.is_some_and(|at| at > now))
            .map(|t| t.upcs.len())
            .unwrap_or(0))
    }
}
