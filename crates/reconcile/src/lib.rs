//! Reconciliation of cached inventory against the remote commerce store.

pub mod commerce;
pub mod memory;
pub mod paginate;
pub mod policy;
pub mod reconciler;
pub mod shop;

pub use commerce::{CommerceError, CommerceStore, InventoryLevel, Product, Variant};
pub use memory::InMemoryCommerceStore;
pub use policy::{CategoryPolicy, CategoryPolicyConfig, StockCategoryPolicy};
pub use reconciler::{ExportSummary, ReconcileError, Reconciler, TenantContext};
pub use shop::ShopClient;
