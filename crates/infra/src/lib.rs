//! Infrastructure layer: shared TTL'd stores and the background job system.
//!
//! Every store is a trait with an in-memory implementation (tests/dev) and a
//! Redis implementation behind the `redis` feature.

pub mod cache;
pub mod cursor_store;
pub mod error;
pub mod jobs;
pub mod keys;
pub mod lock;
pub mod sku_map;

#[cfg(feature = "redis")]
pub mod redis_store;

pub use cache::{InMemoryInventoryCache, InventoryCache, InventoryFields};
pub use cursor_store::{CursorScope, CursorStore, InMemoryCursorStore};
pub use error::StoreError;
pub use lock::{InMemoryLockStore, JobLock, LockError, LockId, LockLease, LockStore, ReleaseOutcome};
pub use sku_map::{InMemorySkuMapStore, SkuMapStore};
