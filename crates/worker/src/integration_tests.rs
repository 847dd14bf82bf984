//! End-to-end tests of the sync pipeline against in-memory stores.
//!
//! Feed -> classify -> queue -> product + inventory import -> export, with
//! the job executor driving each tenant's cycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;

use stocksync_core::{TenantName, Upc};
use stocksync_feed::{FileStoreError, InMemoryFileStore};
use stocksync_infra::jobs::{InMemoryJobStore, JobExecutor, JobKind, JobStatus, JobStore, RetryPolicy};
use stocksync_infra::{
    InMemoryCursorStore, InMemoryInventoryCache, InMemoryLockStore, InMemorySkuMapStore, InventoryCache, JobLock,
    SkuMapStore,
};
use stocksync_reconcile::{InMemoryCommerceStore, Product, TenantContext, Variant};

use crate::cycle::CycleOutcome;
use crate::pipeline::{PipelineSettings, SYNC_TASK, SyncPipeline, SyncServices};
use crate::tenants::TenantDirectory;

const FOLDER: &str = "/e-commerce";
const LOCATION: u64 = 7;

const PRODUCTS: &str = "SEASON,STYLE NUMBER,NAME,COLOR,COLOR CODE,SIZE 1,UPC 1,SIZE 2,UPC 2,\n\
    SS24,100200,Gown,Navy,001,2,123456789012,4,123456789029,\n";

const INVENTORY: &str = "UPC,QUANTITY,DATE,\n\
    123456789012,5,01/15/2024,\n\
    123456789029,2,01/15/2024,\n\
    223456789012,9,01/15/2024,\n";

struct Harness {
    files: Arc<InMemoryFileStore>,
    cache: Arc<InMemoryInventoryCache>,
    sku_map: Arc<InMemorySkuMapStore>,
    locks: Arc<InMemoryLockStore>,
    acme_shop: Arc<InMemoryCommerceStore>,
    theia_shop: Arc<InMemoryCommerceStore>,
    jobs: Arc<InMemoryJobStore>,
    pipeline: Arc<SyncPipeline>,
}

fn acme() -> TenantName {
    TenantName::new("Acme").unwrap()
}

fn theia() -> TenantName {
    TenantName::new("Theia").unwrap()
}

fn variant(id: u64, barcode: Option<&str>, sku: Option<&str>) -> Variant {
    Variant {
        id,
        product_id: 1,
        sku: sku.map(str::to_string),
        barcode: barcode.map(str::to_string),
        inventory_item_id: 1000 + id,
        fulfillment_service: Some("stocksync".to_string()),
    }
}

impl Harness {
    /// Acme is fully configured; Theia has no inventory location.
    fn new() -> Self {
        let files = Arc::new(InMemoryFileStore::with_page_size(2));
        let cache = Arc::new(InMemoryInventoryCache::new());
        let sku_map = Arc::new(InMemorySkuMapStore::new());
        let locks = Arc::new(InMemoryLockStore::new());

        let acme_shop = Arc::new(InMemoryCommerceStore::new());
        acme_shop.add_product(Product {
            id: 1,
            product_type: String::new(),
            tags: String::new(),
        });
        // Barcode, SKU-map fallback, and a barcode the export does not carry.
        acme_shop.add_variant(variant(1, Some("123456789012"), None));
        acme_shop.add_variant(variant(2, None, Some("100200-001-4")));
        acme_shop.add_variant(variant(3, Some("not-a-barcode"), Some("999999-001-2")));
        let theia_shop = Arc::new(InMemoryCommerceStore::new());

        let mut tenants = TenantDirectory::new();
        tenants.insert(
            TenantContext::new(acme())
                .with_location(LOCATION)
                .with_fulfillment_handle("stocksync"),
            acme_shop.clone(),
        );
        tenants.insert(TenantContext::new(theia()), theia_shop.clone());

        let services = SyncServices {
            files: files.clone(),
            cursors: Arc::new(InMemoryCursorStore::new()),
            cache: cache.clone(),
            sku_map: sku_map.clone(),
            locks: locks.clone(),
        };
        let settings = PipelineSettings {
            page_size: 2,
            retry_policy: RetryPolicy::fixed(2, Duration::ZERO),
            ..PipelineSettings::default()
        };
        let pipeline = Arc::new(SyncPipeline::new(services, tenants, settings).unwrap());

        Self {
            files,
            cache,
            sku_map,
            locks,
            acme_shop,
            theia_shop,
            jobs: InMemoryJobStore::arc(),
            pipeline,
        }
    }

    fn put(&self, stamp: &str, export_type: &str, tenant: &str, content: &str, minute: u32) -> String {
        self.files.put_file(
            FOLDER,
            &format!("{stamp}.SHPFY_{export_type}Extract_{tenant}.csv"),
            Utc.with_ymd_and_hms(2024, 1, 15, 12, minute, 0).unwrap(),
            content,
        )
    }

    fn executor(&self) -> JobExecutor<Arc<InMemoryJobStore>> {
        let mut executor = JobExecutor::new(self.jobs.clone(), Duration::from_secs(30));
        let pipeline = self.pipeline.clone();
        executor.register_handler(JobKind::INVENTORY_SYNC, move |job| pipeline.handle(job));
        executor
    }

    fn sync(&self) -> usize {
        self.pipeline.discover(self.jobs.as_ref()).unwrap();
        self.executor().run_until_idle(Duration::from_millis(5)).unwrap()
    }

    fn jobs_for(&self, tenant: &TenantName) -> Vec<stocksync_infra::jobs::Job> {
        self.jobs.list_by_status(tenant, None, 100).unwrap()
    }
}

#[test]
fn full_cycle_imports_and_exports() {
    let h = Harness::new();
    h.put("20240115120000", "Product", "Acme", PRODUCTS, 0);
    h.put("20240115120100", "Inventory", "Acme", INVENTORY, 1);
    h.files.put_file(FOLDER, "readme.txt", Utc::now(), "not an export");

    assert_eq!(h.sync(), 1);

    // Variant 1 by barcode, variant 2 through the SKU map, variant 3 unresolved.
    assert_eq!(h.acme_shop.level(LOCATION, 1001), Some(5));
    assert_eq!(h.acme_shop.level(LOCATION, 1002), Some(2));
    assert_eq!(h.acme_shop.level(LOCATION, 1003), None);
    assert_eq!(h.acme_shop.writes().len(), 2);

    assert_eq!(h.cache.count(&acme()).unwrap(), 0);
    assert_eq!(
        h.sku_map.lookup(&acme(), "100200-001-2").unwrap(),
        Upc::parse("123456789012").ok()
    );

    let jobs = h.jobs_for(&acme());
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert!(jobs[0].log.iter().any(|l| l.message.contains("2 updated")));
}

#[test]
fn unchanged_export_writes_nothing() {
    let h = Harness::new();
    h.put("20240115120000", "Product", "Acme", PRODUCTS, 0);
    h.put("20240115120100", "Inventory", "Acme", INVENTORY, 1);
    h.sync();
    let writes = h.acme_shop.writes().len();

    // Same quantities in a newer export.
    h.put("20240115130000", "Inventory", "Acme", INVENTORY, 30);
    assert_eq!(h.sync(), 1);

    assert_eq!(h.acme_shop.writes().len(), writes);
    assert!(
        h.jobs_for(&acme())
            .iter()
            .all(|j| j.status == JobStatus::Completed)
    );
}

#[test]
fn lock_held_elsewhere_makes_cycle_a_no_op() {
    let h = Harness::new();
    h.put("20240115120100", "Inventory", "Acme", INVENTORY, 1);

    let other = JobLock::new(h.locks.clone());
    let lease = other.acquire(SYNC_TASK, &json!({ "tenant": acme() })).unwrap().unwrap();

    assert_eq!(h.sync(), 1);
    assert!(h.acme_shop.writes().is_empty());
    assert_eq!(h.cache.count(&acme()).unwrap(), 0);
    let jobs = h.jobs_for(&acme());
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert!(jobs[0].log.iter().any(|l| l.message.contains("holds the tenant lock")));

    other.release(lease).unwrap();
}

#[test]
fn cycle_reports_contention_directly() {
    let h = Harness::new();
    let other = JobLock::new(h.locks.clone());
    let _lease = other.acquire(SYNC_TASK, &json!({ "tenant": acme() })).unwrap().unwrap();

    let outcome = h.pipeline.run_cycle(&acme(), Vec::new()).unwrap();
    assert_eq!(outcome, CycleOutcome::AlreadyRunning);
}

#[test]
fn invalid_rows_are_dropped_and_valid_rows_cached() {
    let h = Harness::new();
    let text = "UPC,QUANTITY,DATE,\n\
        123456789012,5,01/15/2024,\n\
        12345,3,01/15/2024,\n\
        123456789029,lots,01/15/2024,\n\
        223456789012,9,not a date,\n";
    h.put("20240115120100", "Inventory", "Acme", text, 1);
    h.sync();

    let jobs = h.jobs_for(&acme());
    assert!(
        jobs[0]
            .log
            .iter()
            .any(|l| l.message.contains("inventory: 4 rows, 2 rejected, 2 records cached"))
    );
    assert_eq!(h.acme_shop.level(LOCATION, 1001), Some(5));
}

#[test]
fn missing_location_fails_only_that_tenant() {
    let h = Harness::new();
    h.put("20240115120100", "Inventory", "Acme", INVENTORY, 1);
    h.put("20240115120200", "Inventory", "Theia", INVENTORY, 2);

    assert_eq!(h.sync(), 2);

    let theia_jobs = h.jobs_for(&theia());
    assert!(matches!(theia_jobs[0].status, JobStatus::DeadLettered { attempts: 1, .. }));
    assert!(theia_jobs[0].log.iter().any(|l| l.message.contains("ERROR")));
    assert_eq!(h.jobs.list_dead_letters(&theia(), 10).unwrap().len(), 1);
    assert!(h.theia_shop.writes().is_empty());

    assert_eq!(h.jobs_for(&acme())[0].status, JobStatus::Completed);
    assert_eq!(h.acme_shop.level(LOCATION, 1001), Some(5));
}

#[test]
fn unknown_tenant_is_dead_lettered() {
    let h = Harness::new();
    h.put("20240115120100", "Inventory", "Globex", INVENTORY, 1);

    h.sync();

    let globex = TenantName::new("Globex").unwrap();
    let jobs = h.jobs_for(&globex);
    assert!(matches!(jobs[0].status, JobStatus::DeadLettered { .. }));
}

#[test]
fn only_newest_export_per_tenant_is_imported() {
    let h = Harness::new();
    h.put("20240115110000", "Inventory", "Acme", "UPC,QUANTITY,DATE,\n123456789012,1,,\n", 0);
    h.put("20240115120000", "Inventory", "Acme", "UPC,QUANTITY,DATE,\n123456789012,8,,\n", 10);

    let summary = h.pipeline.discover(h.jobs.as_ref()).unwrap();
    assert_eq!(summary.jobs_enqueued, 1);
    assert_eq!(summary.expired, 1);
    h.executor().run_until_idle(Duration::from_millis(5)).unwrap();

    assert_eq!(h.acme_shop.level(LOCATION, 1001), Some(8));
}

#[test]
fn transient_download_failure_is_retried() {
    let h = Harness::new();
    h.put("20240115120100", "Inventory", "Acme", INVENTORY, 1);
    h.pipeline.discover(h.jobs.as_ref()).unwrap();
    h.files.fail_next(FileStoreError::Transport("connection reset".to_string()));

    h.executor().run_until_idle(Duration::from_millis(5)).unwrap();

    let jobs = h.jobs_for(&acme());
    assert_eq!(jobs[0].status, JobStatus::Completed);
    assert_eq!(jobs[0].attempt, 2);
    assert_eq!(h.acme_shop.level(LOCATION, 1001), Some(5));
    // The failed attempt released its lock.
    assert!(
        JobLock::new(h.locks.clone())
            .acquire(SYNC_TASK, &json!({ "tenant": acme() }))
            .unwrap()
            .is_some()
    );
}

#[test]
fn nothing_new_queues_nothing() {
    let h = Harness::new();
    h.put("20240115120100", "Inventory", "Acme", INVENTORY, 1);
    assert!(h.pipeline.prime().unwrap());

    let summary = h.pipeline.discover(h.jobs.as_ref()).unwrap();
    assert_eq!(summary.jobs_enqueued, 0);
    assert_eq!(h.jobs.outstanding().unwrap(), 0);
}
