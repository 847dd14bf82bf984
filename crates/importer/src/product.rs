//! Product export -> tenant SKU -> UPC map.
//!
//! Each product row describes one style in one color with up to fifteen
//! (size, UPC) pairs. Every pair with both parts present becomes the SKU
//! `{style}-{color code}-{size}`.

use std::collections::BTreeMap;

use tracing::{info, instrument, warn};

use stocksync_core::{TenantName, Upc};
use stocksync_infra::SkuMapStore;

use crate::ImportError;
use crate::rows::{CsvRows, Row};
use crate::schema::{SIZE_UPC_PAIRS, Schema, size_header, upc_header};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductSummary {
    pub rows_read: usize,
    pub rows_rejected: usize,
    pub skus_mapped: usize,
}

#[derive(Debug, Clone)]
pub struct ProductImporter<M> {
    sku_map: M,
    schema: Schema,
}

impl<M: SkuMapStore> ProductImporter<M> {
    pub fn new(sku_map: M) -> Self {
        Self {
            sku_map,
            schema: Schema::product(),
        }
    }

    /// Rebuild the tenant's SKU map from a product export. An export that
    /// yields no SKUs leaves the existing map in place.
    #[instrument(skip(self, text), fields(tenant = %tenant))]
    pub fn import(&self, tenant: &TenantName, text: &str) -> Result<ProductSummary, ImportError> {
        let mut rows = CsvRows::new(text, &self.schema);
        let mut map = BTreeMap::new();
        for row in rows.by_ref() {
            map.extend(skus_for_row(&row));
        }

        let stats = rows.stats();
        if map.is_empty() {
            warn!(rows_read = stats.read, "product export produced no SKUs, keeping previous map");
        } else {
            self.sku_map.replace(tenant, &map)?;
        }

        let summary = ProductSummary {
            rows_read: stats.read,
            rows_rejected: stats.rejected,
            skus_mapped: map.len(),
        };
        info!(
            rows_read = summary.rows_read,
            rows_rejected = summary.rows_rejected,
            skus_mapped = summary.skus_mapped,
            "product export imported"
        );
        Ok(summary)
    }
}

pub fn sku(style: i64, color_code: &str, size: &str) -> String {
    format!("{style:06}-{color_code}-{size}")
}

fn skus_for_row(row: &Row) -> Vec<(String, Upc)> {
    let Some(style) = row.get("STYLE NUMBER").and_then(|v| v.as_integer()) else {
        return Vec::new();
    };
    let Some(color_code) = row.get("COLOR CODE").and_then(|v| v.as_text()) else {
        return Vec::new();
    };

    (1..=SIZE_UPC_PAIRS)
        .filter_map(|n| {
            let size = row.get(&size_header(n)).and_then(|v| v.as_text())?;
            let upc = row.get(&upc_header(n)).and_then(|v| v.as_upc())?;
            Some((sku(style, color_code, size), upc))
        })
        .collect()
}
