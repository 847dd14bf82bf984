use std::collections::HashMap;
use std::time::Duration;

use redis::Commands;
use tracing::{debug, instrument};

use stocksync_core::{TenantName, Upc};

use super::{RedisConnector, ttl_secs};
use crate::cache::{InventoryCache, InventoryFields};
use crate::error::StoreError;
use crate::keys::{self, INVENTORY_TTL};

#[derive(Debug, Clone)]
pub struct RedisInventoryCache {
    connector: RedisConnector,
    ttl: Duration,
}

impl RedisInventoryCache {
    pub fn new(connector: RedisConnector) -> Self {
        Self {
            connector,
            ttl: INVENTORY_TTL,
        }
    }
}

impl InventoryCache for RedisInventoryCache {
    #[instrument(skip(self), fields(tenant = %tenant))]
    fn reset(&self, tenant: &TenantName) -> Result<(), StoreError> {
        let mut conn = self.connector.connection()?;
        let set_key = keys::inventory_set_key(tenant);

        // Records whose set entry was lost are still matched by the pattern.
        let mut stale: Vec<String> = conn
            .scan_match::<_, String>(keys::inventory_item_pattern(tenant))?
            .collect();
        stale.push(set_key);

        let removed = stale.len() - 1;
        for chunk in stale.chunks(500) {
            redis::cmd("DEL").arg(chunk).query::<()>(&mut conn)?;
        }
        debug!(removed, "inventory cache reset");
        Ok(())
    }

    fn add_item(&self, tenant: &TenantName, upc: Upc, fields: &InventoryFields) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.connector.connection()?;
        let item_key = keys::inventory_item_key(tenant, &upc);
        let set_key = keys::inventory_set_key(tenant);
        let ttl = ttl_secs(self.ttl);

        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.cmd("HSET").arg(&item_key);
        for (field, value) in fields {
            pipe.arg(field).arg(value);
        }
        pipe.ignore()
            .cmd("EXPIRE").arg(&item_key).arg(ttl).ignore()
            .cmd("SADD").arg(&set_key).arg(upc.to_string()).ignore()
            .cmd("EXPIRE").arg(&set_key).arg(ttl).ignore();
        pipe.query::<()>(&mut conn)?;
        Ok(())
    }

    fn get_item(&self, tenant: &TenantName, upc: Upc) -> Result<Option<InventoryFields>, StoreError> {
        let mut conn = self.connector.connection()?;
        let raw: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(keys::inventory_item_key(tenant, &upc))
            .query(&mut conn)?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(raw.into_iter().collect()))
    }

    fn get_item_value(&self, tenant: &TenantName, upc: Upc, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connector.connection()?;
        let value: Option<String> = redis::cmd("HGET")
            .arg(keys::inventory_item_key(tenant, &upc))
            .arg(field)
            .query(&mut conn)?;
        Ok(value)
    }

    fn count(&self, tenant: &TenantName) -> Result<usize, StoreError> {
        let mut conn = self.connector.connection()?;
        let count: usize = redis::cmd("SCARD")
            .arg(keys::inventory_set_key(tenant))
            .query(&mut conn)?;
        Ok(count)
    }
}
