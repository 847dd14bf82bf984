//! Redis implementations of the shared stores.
//!
//! All stores share one `redis::Client` and open a blocking connection per
//! operation.

mod cache;
mod cursor;
mod lock;
mod sku_map;

use std::sync::Arc;

pub use cache::RedisInventoryCache;
pub use cursor::RedisCursorStore;
pub use lock::RedisLockStore;
pub use sku_map::RedisSkuMapStore;

use crate::error::StoreError;

/// Connection factory shared by every Redis-backed store.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: Arc<redis::Client>,
}

impl RedisConnector {
    pub fn open(redis_url: impl AsRef<str>) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    pub(crate) fn connection(&self) -> Result<redis::Connection, StoreError> {
        self.client
            .get_connection()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }

    pub fn inventory_cache(&self) -> RedisInventoryCache {
        RedisInventoryCache::new(self.clone())
    }

    pub fn cursor_store(&self) -> RedisCursorStore {
        RedisCursorStore::new(self.clone())
    }

    pub fn lock_store(&self) -> RedisLockStore {
        RedisLockStore::new(self.clone())
    }

    pub fn sku_map_store(&self) -> RedisSkuMapStore {
        RedisSkuMapStore::new(self.clone())
    }
}

fn ttl_secs(ttl: std::time::Duration) -> u64 {
    ttl.as_secs().max(1)
}
