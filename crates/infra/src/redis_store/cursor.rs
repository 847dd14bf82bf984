use std::time::Duration;

use super::{RedisConnector, ttl_secs};
use crate::cursor_store::{CursorScope, CursorStore};
use crate::error::StoreError;

#[derive(Debug, Clone)]
pub struct RedisCursorStore {
    connector: RedisConnector,
}

impl RedisCursorStore {
    pub fn new(connector: RedisConnector) -> Self {
        Self { connector }
    }
}

impl CursorStore for RedisCursorStore {
    fn load(&self, scope: &CursorScope) -> Result<Option<String>, StoreError> {
        let mut conn = self.connector.connection()?;
        let cursor: Option<String> = redis::cmd("GET").arg(scope.key()).query(&mut conn)?;
        Ok(cursor)
    }

    fn save(&self, scope: &CursorScope, cursor: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.connector.connection()?;
        redis::cmd("SET")
            .arg(scope.key())
            .arg(cursor)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query::<()>(&mut conn)?;
        Ok(())
    }

    fn delete(&self, scope: &CursorScope) -> Result<(), StoreError> {
        let mut conn = self.connector.connection()?;
        redis::cmd("DEL").arg(scope.key()).query::<()>(&mut conn)?;
        Ok(())
    }
}
