//! Distributed job lock.
//!
//! A lock is a TTL'd key named after the task and a hash of its canonical
//! parameters. Acquisition is an atomic set-if-absent; release is a
//! compare-and-delete that is skipped once the TTL may have elapsed, since the
//! key could by then belong to another holder.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::keys::{self, LOCK_TTL};

/// Backend of the job lock.
pub trait LockStore: Send + Sync {
    /// Set `key` to `holder` with a TTL only if `key` does not exist.
    fn set_if_absent(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Delete `key` only if its value is still `holder`.
    fn delete_if_holder(&self, key: &str, holder: &str) -> Result<bool, StoreError>;
}

impl<S: LockStore + ?Sized> LockStore for Arc<S> {
    fn set_if_absent(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        (**self).set_if_absent(key, holder, ttl)
    }

    fn delete_if_holder(&self, key: &str, holder: &str) -> Result<bool, StoreError> {
        (**self).delete_if_holder(key, holder)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LockError {
    pub fn is_transient(&self) -> bool {
        match self {
            LockError::Store(err) => err.is_transient(),
        }
    }
}

/// Lock identifier derived from a task name and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockId(String);

impl LockId {
    /// Same task and same parameters (in any key order) give the same id.
    pub fn derive(task: &str, params: &Value) -> Self {
        let mut signature = String::new();
        write_canonical(params, &mut signature);
        Self(keys::lock_key(task, &signature))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Proof of a held lock. Hand it back to [`JobLock::release`].
#[derive(Debug)]
pub struct LockLease {
    id: LockId,
    holder: String,
    acquired_at: Instant,
    ttl: Duration,
}

impl LockLease {
    pub fn id(&self) -> &LockId {
        &self.id
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// False once the TTL may have run out on the store side.
    pub fn is_within_ttl(&self) -> bool {
        self.acquired_at.elapsed() < self.ttl
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released,
    /// Held past the TTL; the key was left alone.
    Expired,
    /// The key no longer belonged to this holder.
    NotHeld,
}

/// TTL'd mutex keyed by (task, parameters).
#[derive(Debug, Clone)]
pub struct JobLock<S> {
    store: S,
    ttl: Duration,
}

impl<S: LockStore> JobLock<S> {
    pub fn new(store: S) -> Self {
        Self::with_ttl(store, LOCK_TTL)
    }

    pub fn with_ttl(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lock for `task` with `params`.
    ///
    /// `Ok(None)` means another holder is active.
    pub fn acquire(&self, task: &str, params: &Value) -> Result<Option<LockLease>, LockError> {
        let id = LockId::derive(task, params);
        let holder = Uuid::now_v7().to_string();
        // Taken before the store call so elapsed time is never underestimated.
        let acquired_at = Instant::now();

        if self.store.set_if_absent(id.as_str(), &holder, self.ttl)? {
            debug!(lock = %id, holder = %holder, "lock acquired");
            Ok(Some(LockLease {
                id,
                holder,
                acquired_at,
                ttl: self.ttl,
            }))
        } else {
            debug!(lock = %id, "lock held elsewhere");
            Ok(None)
        }
    }

    pub fn release(&self, lease: LockLease) -> Result<ReleaseOutcome, LockError> {
        if !lease.is_within_ttl() {
            warn!(
                lock = %lease.id,
                elapsed_ms = lease.acquired_at.elapsed().as_millis() as u64,
                "lock held past its ttl, not releasing"
            );
            return Ok(ReleaseOutcome::Expired);
        }

        if self.store.delete_if_holder(lease.id.as_str(), &lease.holder)? {
            debug!(lock = %lease.id, "lock released");
            Ok(ReleaseOutcome::Released)
        } else {
            warn!(lock = %lease.id, "lock was no longer held by this holder");
            Ok(ReleaseOutcome::NotHeld)
        }
    }
}

/// In-memory lock store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    locks: Mutex<HashMap<String, (String, Instant)>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder_of(&self, key: &str) -> Option<String> {
        let locks = self.locks.lock().ok()?;
        locks
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(holder, _)| holder.clone())
    }
}

impl LockStore for InMemoryLockStore {
    fn set_if_absent(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::Command("lock store mutex poisoned".to_string()))?;
        let now = Instant::now();
        if locks.get(key).is_some_and(|(_, expires_at)| *expires_at > now) {
            return Ok(false);
        }
        locks.insert(key.to_string(), (holder.to_string(), now + ttl));
        Ok(true)
    }

    fn delete_if_holder(&self, key: &str, holder: &str) -> Result<bool, StoreError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| StoreError::Command("lock store mutex poisoned".to_string()))?;
        let now = Instant::now();
        let held = locks
            .get(key)
            .is_some_and(|(current, expires_at)| current == holder && *expires_at > now);
        if held {
            locks.remove(key);
        }
        Ok(held)
    }
}
