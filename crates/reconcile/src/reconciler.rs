//! Diffs a tenant's cached inventory against the remote store and writes only
//! what changed.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use stocksync_core::{TenantName, Upc};
use stocksync_infra::{InventoryCache, SkuMapStore, StoreError};

use crate::commerce::{CommerceError, CommerceStore, Variant};
use crate::paginate::fetch_all;
use crate::policy::CategoryPolicy;

pub const DEFAULT_PAGE_SIZE: u32 = 250;
pub const QUANTITY_FIELD: &str = "QUANTITY";

/// Everything the reconciler needs to know about one tenant's shop.
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant: TenantName,
    pub location_id: Option<u64>,
    /// Only variants managed by this fulfillment service are reconciled.
    pub fulfillment_handle: Option<String>,
    pub category_policy: Option<Arc<dyn CategoryPolicy>>,
}

impl TenantContext {
    pub fn new(tenant: TenantName) -> Self {
        Self {
            tenant,
            location_id: None,
            fulfillment_handle: None,
            category_policy: None,
        }
    }

    pub fn with_location(mut self, location_id: u64) -> Self {
        self.location_id = Some(location_id);
        self
    }

    pub fn with_fulfillment_handle(mut self, handle: impl Into<String>) -> Self {
        self.fulfillment_handle = Some(handle.into());
        self
    }

    pub fn with_category_policy(mut self, policy: Arc<dyn CategoryPolicy>) -> Self {
        self.category_policy = Some(policy);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub variants_seen: usize,
    pub updated_count: usize,
    pub unchanged: usize,
    pub unresolved: usize,
    pub failed_writes: usize,
    pub categories_updated: usize,
    /// The tenant cache was empty, so nothing was compared or written.
    pub skipped_empty_cache: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("tenant {tenant} is misconfigured: {reason}")]
    Configuration { tenant: TenantName, reason: String },

    #[error(transparent)]
    Commerce(#[from] CommerceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ReconcileError {
    pub fn is_transient(&self) -> bool {
        match self {
            ReconcileError::Configuration { .. } => false,
            ReconcileError::Commerce(e) => e.is_transient(),
            ReconcileError::Store(e) => e.is_transient(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler<C, M> {
    cache: C,
    sku_map: M,
    page_size: u32,
}

impl<C: InventoryCache, M: SkuMapStore> Reconciler<C, M> {
    pub fn new(cache: C, sku_map: M) -> Self {
        Self {
            cache,
            sku_map,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Push cached quantities for `ctx.tenant` to `shop`, then clear the cache.
    #[instrument(skip(self, ctx, shop), fields(tenant = %ctx.tenant))]
    pub fn export<S>(&self, ctx: &TenantContext, shop: &S) -> Result<ExportSummary, ReconcileError>
    where
        S: CommerceStore + ?Sized,
    {
        let tenant = &ctx.tenant;
        let location_id = ctx.location_id.ok_or_else(|| ReconcileError::Configuration {
            tenant: tenant.clone(),
            reason: "no inventory location configured".to_string(),
        })?;

        let mut summary = ExportSummary::default();
        if self.cache.count(tenant)? == 0 {
            info!("inventory cache is empty, nothing to export");
            summary.skipped_empty_cache = true;
            return Ok(summary);
        }

        let variants: Vec<Variant> = fetch_all(self.page_size, |page, limit| shop.variants(page, limit))?
            .into_iter()
            .filter(|v| match &ctx.fulfillment_handle {
                Some(handle) => v.fulfillment_service.as_deref() == Some(handle.as_str()),
                None => true,
            })
            .collect();
        let mut levels: HashMap<u64, Option<i64>> = fetch_all(self.page_size, |page, limit| {
            shop.inventory_levels(location_id, page, limit)
        })?
        .into_iter()
        .map(|level| (level.inventory_item_id, level.available))
        .collect();
        debug!(variants = variants.len(), levels = levels.len(), "remote state loaded");

        for variant in &variants {
            summary.variants_seen += 1;
            let Some(upc) = self.resolve_upc(tenant, variant)? else {
                warn!(
                    variant_id = variant.id,
                    barcode = variant.barcode.as_deref().unwrap_or(""),
                    sku = variant.sku.as_deref().unwrap_or(""),
                    "variant barcode could not be resolved, skipping"
                );
                summary.unresolved += 1;
                continue;
            };

            let desired = self.desired_quantity(tenant, upc)?;
            let known = levels.get(&variant.inventory_item_id).copied().flatten();
            if known == Some(desired) {
                summary.unchanged += 1;
                continue;
            }

            match shop.set_inventory_level(location_id, variant.inventory_item_id, desired) {
                Ok(level) => {
                    debug!(variant_id = variant.id, upc = %upc, from = ?known, to = desired, "inventory level set");
                    levels.insert(variant.inventory_item_id, level.available.or(Some(desired)));
                    summary.updated_count += 1;
                }
                Err(e) => {
                    error!(variant_id = variant.id, upc = %upc, error = %e, "inventory level write failed");
                    summary.failed_writes += 1;
                }
            }
        }

        if let Some(policy) = &ctx.category_policy {
            summary.categories_updated = self.apply_category_policy(policy.as_ref(), shop, &variants, &levels)?;
        }

        self.cache.reset(tenant)?;
        info!(
            variants_seen = summary.variants_seen,
            updated = summary.updated_count,
            unchanged = summary.unchanged,
            unresolved = summary.unresolved,
            failed_writes = summary.failed_writes,
            categories_updated = summary.categories_updated,
            "inventory exported"
        );
        Ok(summary)
    }

    /// Barcode first; the SKU map is the fallback.
    fn resolve_upc(&self, tenant: &TenantName, variant: &Variant) -> Result<Option<Upc>, StoreError> {
        if let Some(upc) = variant.barcode.as_deref().and_then(|b| Upc::parse(b).ok()) {
            return Ok(Some(upc));
        }
        match variant.sku.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(sku) => self.sku_map.lookup(tenant, sku),
            None => Ok(None),
        }
    }

    /// Cached quantity, or 0 when the record is missing or not an integer.
    fn desired_quantity(&self, tenant: &TenantName, upc: Upc) -> Result<i64, StoreError> {
        let raw = self.cache.get_item_value(tenant, upc, QUANTITY_FIELD)?;
        Ok(match raw {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(upc = %upc, quantity = %raw, "cached quantity is not an integer, using 0");
                0
            }),
            None => 0,
        })
    }

    fn apply_category_policy<S>(
        &self,
        policy: &dyn CategoryPolicy,
        shop: &S,
        variants: &[Variant],
        levels: &HashMap<u64, Option<i64>>,
    ) -> Result<usize, CommerceError>
    where
        S: CommerceStore + ?Sized,
    {
        let mut in_stock: HashMap<u64, bool> = HashMap::new();
        for variant in variants {
            let available = levels.get(&variant.inventory_item_id).copied().flatten().unwrap_or(0);
            *in_stock.entry(variant.product_id).or_default() |= available > 0;
        }

        let products = fetch_all(self.page_size, |page, limit| shop.products(page, limit))?;
        let mut updated = 0;
        for product in products.iter().filter(|p| in_stock.contains_key(&p.id)) {
            let stocked = in_stock.get(&product.id).copied().unwrap_or(false);
            let wanted = policy.product_type_for(product, stocked);
            if wanted == product.product_type {
                continue;
            }
            match shop.update_product_type(product.id, wanted) {
                Ok(()) => updated += 1,
                Err(e) => error!(product_id = product.id, error = %e, "product type update failed"),
            }
        }
        Ok(updated)
    }
}
