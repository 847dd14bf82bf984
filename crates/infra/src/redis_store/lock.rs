use std::time::Duration;

use super::RedisConnector;
use crate::error::StoreError;
use crate::lock::LockStore;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// `SET NX PX` acquisition with a compare-and-delete release script.
#[derive(Debug, Clone)]
pub struct RedisLockStore {
    connector: RedisConnector,
}

impl RedisLockStore {
    pub fn new(connector: RedisConnector) -> Self {
        Self { connector }
    }
}

impl LockStore for RedisLockStore {
    fn set_if_absent(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.connector.connection()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(holder)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis().max(1) as u64)
            .query(&mut conn)?;
        Ok(reply.is_some())
    }

    fn delete_if_holder(&self, key: &str, holder: &str) -> Result<bool, StoreError> {
        let mut conn = self.connector.connection()?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(holder)
            .invoke(&mut conn)?;
        Ok(deleted == 1)
    }
}
