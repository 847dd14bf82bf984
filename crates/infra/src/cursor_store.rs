//! Persisted change-feed cursors, keyed by integration and account.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::error::StoreError;
use crate::keys;

/// Which feed a cursor belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CursorScope {
    pub integration: String,
    pub account: String,
}

impl CursorScope {
    pub fn new(integration: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            integration: integration.into(),
            account: account.into(),
        }
    }

    pub fn key(&self) -> String {
        keys::cursor_key(&self.integration, &self.account)
    }
}

pub trait CursorStore: Send + Sync {
    fn load(&self, scope: &CursorScope) -> Result<Option<String>, StoreError>;

    /// Overwrite the cursor and (re)arm its TTL.
    fn save(&self, scope: &CursorScope, cursor: &str, ttl: Duration) -> Result<(), StoreError>;

    fn delete(&self, scope: &CursorScope) -> Result<(), StoreError>;
}

impl<S: CursorStore + ?Sized> CursorStore for Arc<S> {
    fn load(&self, scope: &CursorScope) -> Result<Option<String>, StoreError> {
        (**self).load(scope)
    }

    fn save(&self, scope: &CursorScope, cursor: &str, ttl: Duration) -> Result<(), StoreError> {
        (**self).save(scope, cursor, ttl)
    }

    fn delete(&self, scope: &CursorScope) -> Result<(), StoreError> {
        (**self).delete(scope)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCursorStore {
    cursors: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CursorStore for InMemoryCursorStore {
    fn load(&self, scope: &CursorScope) -> Result<Option<String>, StoreError> {
        let cursors = self
            .cursors
            .read()
            .map_err(|_| StoreError::Command("cursor store lock poisoned".to_string()))?;
        Ok(cursors
            .get(&scope.key())
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(cursor, _)| cursor.clone()))
    }

    fn save(&self, scope: &CursorScope, cursor: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| StoreError::Command("cursor store lock poisoned".to_string()))?;
        cursors.insert(scope.key(), (cursor.to_string(), Instant::now() + ttl));
        Ok(())
    }

    fn delete(&self, scope: &CursorScope) -> Result<(), StoreError> {
        let mut cursors = self
            .cursors
            .write()
            .map_err(|_| StoreError::Command("cursor store lock poisoned".to_string()))?;
        cursors.remove(&scope.key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_load_delete() {
        let store = InMemoryCursorStore::new();
        let scope = CursorScope::new("dropbox", "default");
        assert_eq!(store.load(&scope).unwrap(), None);

        store.save(&scope, "c1", Duration::from_secs(60)).unwrap();
        store.save(&scope, "c2", Duration::from_secs(60)).unwrap();
        assert_eq!(store.load(&scope).unwrap().as_deref(), Some("c2"));

        store.delete(&scope).unwrap();
        assert_eq!(store.load(&scope).unwrap(), None);
    }

    #[test]
    fn scopes_do_not_share_cursors() {
        let store = InMemoryCursorStore::new();
        store
            .save(&CursorScope::new("dropbox", "a"), "ca", Duration::from_secs(60))
            .unwrap();
        assert_eq!(store.load(&CursorScope::new("dropbox", "b")).unwrap(), None);
    }

    #[test]
    fn expired_cursor_reads_as_absent() {
        let store = InMemoryCursorStore::new();
        let scope = CursorScope::new("dropbox", "default");
        store.save(&scope, "c1", Duration::from_millis(10)).unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(store.load(&scope).unwrap(), None);
    }
}
