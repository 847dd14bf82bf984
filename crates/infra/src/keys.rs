//! Key shapes and TTLs for everything stored in the shared key-value store.

use std::time::Duration;

use sha2::{Digest, Sha256};

use stocksync_core::{TenantName, Upc};

/// Lifetime of cached inventory records and the per-tenant UPC set.
pub const INVENTORY_TTL: Duration = Duration::from_secs(12 * 60 * 60);

/// Lifetime of a persisted change-feed cursor.
pub const CURSOR_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Lifetime of a job lock.
pub const LOCK_TTL: Duration = Duration::from_secs(10 * 60);

/// Lifetime of the per-tenant SKU -> UPC fallback map.
pub const SKU_MAP_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// `{tenant}:inventory:upc:{UPC}` holds the field hash of one record.
pub fn inventory_item_key(tenant: &TenantName, upc: &Upc) -> String {
    format!("{tenant}:inventory:upc:{upc}")
}

/// Glob matching every record hash of a tenant.
pub fn inventory_item_pattern(tenant: &TenantName) -> String {
    format!("{tenant}:inventory:upc:*")
}

/// `{tenant}:inventory:upcs` holds the set of known UPCs.
pub fn inventory_set_key(tenant: &TenantName) -> String {
    format!("{tenant}:inventory:upcs")
}

/// `{tenant}:variant:sku_upc_map` holds the SKU -> UPC hash.
pub fn sku_map_key(tenant: &TenantName) -> String {
    format!("{tenant}:variant:sku_upc_map")
}

/// `{integration}:account:{account}:cursor` holds a change-feed cursor.
pub fn cursor_key(integration: &str, account: &str) -> String {
    format!("{integration}:account:{account}:cursor")
}

/// `{task}-lock-{sha256(signature)}` names a job lock.
pub fn lock_key(task: &str, signature: &str) -> String {
    let digest = Sha256::digest(signature.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{task}-lock-{hex}")
}
