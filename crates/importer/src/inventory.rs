//! Inventory export -> tenant inventory cache.

use tracing::{info, instrument};

use stocksync_core::TenantName;
use stocksync_infra::InventoryCache;

use crate::ImportError;
use crate::rows::CsvRows;
use crate::schema::Schema;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InventorySummary {
    pub rows_read: usize,
    pub rows_rejected: usize,
    pub records_written: usize,
}

/// Replaces a tenant's cached inventory with the content of one export.
#[derive(Debug, Clone)]
pub struct InventoryImporter<C> {
    cache: C,
    schema: Schema,
}

impl<C: InventoryCache> InventoryImporter<C> {
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            schema: Schema::inventory(),
        }
    }

    /// Reset the tenant's cache, then write one record per valid row.
    ///
    /// Rows without a UPC are skipped. A later row with the same UPC
    /// overwrites an earlier one.
    #[instrument(skip(self, text), fields(tenant = %tenant))]
    pub fn import(&self, tenant: &TenantName, text: &str) -> Result<InventorySummary, ImportError> {
        self.cache.reset(tenant)?;

        let mut rows = CsvRows::new(text, &self.schema);
        let mut written = 0;
        for row in rows.by_ref() {
            let Some(upc) = row.get("UPC").and_then(|v| v.as_upc()) else {
                continue;
            };
            self.cache.add_item(tenant, upc, &row.to_fields())?;
            written += 1;
        }

        let stats = rows.stats();
        let summary = InventorySummary {
            rows_read: stats.read,
            rows_rejected: stats.rejected,
            records_written: written,
        };
        info!(
            rows_read = summary.rows_read,
            rows_rejected = summary.rows_rejected,
            records_written = summary.records_written,
            "inventory imported"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stocksync_core::Upc;
    use stocksync_infra::InMemoryInventoryCache;

    use super::*;

    fn tenant(name: &str) -> TenantName {
        TenantName::new(name).unwrap()
    }

    fn upc(raw: &str) -> Upc {
        Upc::parse(raw).unwrap()
    }

    #[test]
    fn single_row_becomes_one_record() {
        let cache = Arc::new(InMemoryInventoryCache::new());
        let importer = InventoryImporter::new(cache.clone());
        let acme = tenant("Acme");

        let summary = importer
            .import(&acme, "UPC,QUANTITY,DATE\n123456789012,5,01/01/2024,\n")
            .unwrap();

        assert_eq!(summary.records_written, 1);
        assert_eq!(cache.count(&acme).unwrap(), 1);
        let item = cache.get_item(&acme, upc("123456789012")).unwrap().unwrap();
        assert_eq!(item.get("UPC").map(String::as_str), Some("123456789012"));
        assert_eq!(item.get("QUANTITY").map(String::as_str), Some("5"));
    }

    #[test]
    fn only_valid_upcs_are_cached() {
        let cache = Arc::new(InMemoryInventoryCache::new());
        let importer = InventoryImporter::new(cache.clone());
        let acme = tenant("Acme");

        let mut text = String::from("UPC,QUANTITY,DATE,\n");
        for i in 0..7u64 {
            text.push_str(&format!("{},{i},01/01/2024,\n", 400_000_000_000 + i));
        }
        for bad in ["1234", "1234567890123", "BARCODE", ""] {
            text.push_str(&format!("{bad},1,01/01/2024,\n"));
        }

        let summary = importer.import(&acme, &text).unwrap();
        assert_eq!(summary.records_written, 7);
        assert_eq!(summary.rows_rejected, 4);
        assert_eq!(cache.count(&acme).unwrap(), 7);
    }

    #[test]
    fn import_replaces_previous_cycle_wholesale() {
        let cache = Arc::new(InMemoryInventoryCache::new());
        let importer = InventoryImporter::new(cache.clone());
        let acme = tenant("Acme");

        importer
            .import(&acme, "UPC,QUANTITY,\n123456789012,5,\n210987654321,3,\n")
            .unwrap();
        importer.import(&acme, "UPC,QUANTITY,\n123456789012,1,\n").unwrap();

        assert_eq!(cache.count(&acme).unwrap(), 1);
        assert_eq!(cache.get_item(&acme, upc("210987654321")).unwrap(), None);
        assert_eq!(
            cache.get_item_value(&acme, upc("123456789012"), "QUANTITY").unwrap().as_deref(),
            Some("1")
        );
    }

    #[test]
    fn other_tenants_are_untouched() {
        let cache = Arc::new(InMemoryInventoryCache::new());
        let importer = InventoryImporter::new(cache.clone());

        importer.import(&tenant("Theia"), "UPC,QUANTITY,\n123456789012,5,\n").unwrap();
        importer.import(&tenant("Acme"), "UPC,QUANTITY,\n210987654321,1,\n").unwrap();

        assert_eq!(cache.count(&tenant("Theia")).unwrap(), 1);
        assert_eq!(cache.count(&tenant("Acme")).unwrap(), 1);
    }
}
