use std::collections::BTreeMap;

use stocksync_core::{TenantName, Upc};

use super::{RedisConnector, ttl_secs};
use crate::error::StoreError;
use crate::keys::{self, SKU_MAP_TTL};
use crate::sku_map::SkuMapStore;

#[derive(Debug, Clone)]
pub struct RedisSkuMapStore {
    connector: RedisConnector,
}

impl RedisSkuMapStore {
    pub fn new(connector: RedisConnector) -> Self {
        Self { connector }
    }
}

impl SkuMapStore for RedisSkuMapStore {
    fn replace(&self, tenant: &TenantName, entries: &BTreeMap<String, Upc>) -> Result<(), StoreError> {
        let mut conn = self.connector.connection()?;
        let key = keys::sku_map_key(tenant);
        let entries: Vec<_> = entries.iter().collect();

        let mut pipe = redis::pipe();
        pipe.atomic().cmd("DEL").arg(&key).ignore();
        for chunk in entries.chunks(500) {
            pipe.cmd("HSET").arg(&key);
            for (sku, upc) in chunk {
                pipe.arg(sku.as_str()).arg(upc.to_string());
            }
            pipe.ignore();
        }
        if !entries.is_empty() {
            pipe.cmd("EXPIRE").arg(&key).arg(ttl_secs(SKU_MAP_TTL)).ignore();
        }
        pipe.query::<()>(&mut conn)?;
        Ok(())
    }

    fn lookup(&self, tenant: &TenantName, sku: &str) -> Result<Option<Upc>, StoreError> {
        let mut conn = self.connector.connection()?;
        let raw: Option<String> = redis::cmd("HGET")
            .arg(keys::sku_map_key(tenant))
            .arg(sku)
            .query(&mut conn)?;
        match raw {
            Some(raw) => Upc::parse(&raw)
                .map(Some)
                .map_err(|e| StoreError::Decode(e.to_string())),
            None => Ok(None),
        }
    }
}
