//! The sync pipeline: discover new exports, queue one job per tenant, and run
//! each tenant's import + export cycle under the job lock.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use stocksync_core::TenantName;
use stocksync_feed::{
    ChangeEntry, ChangeFeedPoller, Classifier, ExportType, FileStore, ImportFile, ImportStatus, PollError,
    select_latest,
};
use stocksync_importer::{InventoryImporter, ProductImporter};
use stocksync_infra::jobs::{Job, JobKind, JobResult, JobStore, JobStoreError, LogLevel, RetryPolicy};
use stocksync_infra::{CursorScope, CursorStore, InventoryCache, JobLock, LockStore, ReleaseOutcome, SkuMapStore};
use stocksync_reconcile::Reconciler;
use stocksync_reconcile::reconciler::DEFAULT_PAGE_SIZE;

use crate::cycle::{CycleError, CycleOutcome, CycleReport, CycleStatus, SyncPayload};
use crate::tenants::TenantDirectory;

/// Lock task name; the lock parameters are `{"tenant": <name>}`.
pub const SYNC_TASK: &str = JobKind::INVENTORY_SYNC;
pub const FEED_INTEGRATION: &str = "dropbox";

/// Shared stores and remote capabilities the pipeline runs against.
#[derive(Clone)]
pub struct SyncServices {
    pub files: Arc<dyn FileStore>,
    pub cursors: Arc<dyn CursorStore>,
    pub cache: Arc<dyn InventoryCache>,
    pub sku_map: Arc<dyn SkuMapStore>,
    pub locks: Arc<dyn LockStore>,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub account: String,
    pub export_folder: String,
    pub file_prefix: String,
    pub page_size: u32,
    pub retry_policy: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            account: crate::config::DEFAULT_ACCOUNT.to_string(),
            export_folder: crate::config::DEFAULT_EXPORT_FOLDER.to_string(),
            file_prefix: stocksync_feed::classify::DEFAULT_PREFIX.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            retry_policy: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("change feed poll failed: {0}")]
    Poll(#[from] PollError),

    #[error("job queue: {0}")]
    Jobs(#[from] JobStoreError),

    #[error("job payload could not be encoded: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverSummary {
    pub changes: usize,
    pub unclassified: usize,
    pub expired: usize,
    /// One job per tenant with something to import.
    pub jobs_enqueued: usize,
}

pub struct SyncPipeline {
    poller: ChangeFeedPoller<Arc<dyn FileStore>, Arc<dyn CursorStore>>,
    classifier: Classifier,
    lock: JobLock<Arc<dyn LockStore>>,
    products: ProductImporter<Arc<dyn SkuMapStore>>,
    inventory: InventoryImporter<Arc<dyn InventoryCache>>,
    reconciler: Reconciler<Arc<dyn InventoryCache>, Arc<dyn SkuMapStore>>,
    tenants: TenantDirectory,
    retry_policy: RetryPolicy,
}

impl SyncPipeline {
    pub fn new(
        services: SyncServices,
        tenants: TenantDirectory,
        settings: PipelineSettings,
    ) -> Result<Self, regex::Error> {
        let scope = CursorScope::new(FEED_INTEGRATION, settings.account);
        Ok(Self {
            poller: ChangeFeedPoller::new(services.files, services.cursors, scope, settings.export_folder),
            classifier: Classifier::new(&settings.file_prefix)?,
            lock: JobLock::new(services.locks),
            products: ProductImporter::new(services.sku_map.clone()),
            inventory: InventoryImporter::new(services.cache.clone()),
            reconciler: Reconciler::new(services.cache, services.sku_map).with_page_size(settings.page_size),
            tenants,
            retry_policy: settings.retry_policy,
        })
    }

    pub fn tenants(&self) -> &TenantDirectory {
        &self.tenants
    }

    /// Take a baseline listing when no cursor is stored yet.
    pub fn prime(&self) -> Result<bool, PollError> {
        self.poller.prime()
    }

    pub fn reset_cursor(&self) -> Result<(), PollError> {
        self.poller.reset()
    }

    /// Poll the feed, keep the newest export per (tenant, type) and queue one
    /// sync job per tenant.
    #[instrument(skip_all)]
    pub fn discover<J: JobStore + ?Sized>(&self, jobs: &J) -> Result<DiscoverSummary, DiscoverError> {
        let entries = self.poller.poll()?;
        let mut summary = DiscoverSummary {
            changes: entries.len(),
            ..DiscoverSummary::default()
        };

        let mut candidates = Vec::new();
        for entry in entries {
            let ChangeEntry::Added(meta) = entry else { continue };
            match self.classifier.classify(&meta.name) {
                Ok(classification) => candidates.push(ImportFile::new(meta, classification)),
                Err(e) => {
                    debug!(error = %e, "skipping unclassified file");
                    summary.unclassified += 1;
                }
            }
        }

        let selection = select_latest(candidates);
        for file in &selection.expired {
            info!(tenant = %file.tenant, file = %file.filename, "superseded by a newer export");
        }
        summary.expired = selection.expired.len();

        let mut by_tenant: BTreeMap<TenantName, Vec<ImportFile>> = BTreeMap::new();
        for file in selection.selected {
            by_tenant.entry(file.tenant.clone()).or_default().push(file);
        }

        for (tenant, files) in by_tenant {
            let names: Vec<&str> = files.iter().map(|f| f.filename.as_str()).collect();
            info!(tenant = %tenant, files = ?names, "queueing sync");
            let payload = serde_json::to_value(SyncPayload { files })?;
            let job = Job::new(tenant, JobKind::InventorySync, payload).with_retry_policy(self.retry_policy.clone());
            jobs.enqueue(job)?;
            summary.jobs_enqueued += 1;
        }

        info!(
            changes = summary.changes,
            unclassified = summary.unclassified,
            expired = summary.expired,
            jobs = summary.jobs_enqueued,
            "discovery complete"
        );
        Ok(summary)
    }

    /// Run one tenant's cycle. Lock contention is a no-op, not an error.
    #[instrument(skip(self, files), fields(tenant = %tenant))]
    pub fn run_cycle(&self, tenant: &TenantName, files: Vec<ImportFile>) -> Result<CycleOutcome, CycleError> {
        let params = json!({ "tenant": tenant });
        let Some(lease) = self.lock.acquire(SYNC_TASK, &params)? else {
            info!("sync already running for tenant, skipping");
            return Ok(CycleOutcome::AlreadyRunning);
        };

        let result = self.run_locked(tenant, files);

        match self.lock.release(lease) {
            Ok(ReleaseOutcome::Released) => debug!("sync lock released"),
            Ok(outcome) => warn!(outcome = ?outcome, "sync lock was not released"),
            Err(e) => warn!(error = %e, "sync lock release failed, it will expire on its own"),
        }
        result.map(CycleOutcome::Finished)
    }

    fn run_locked(&self, tenant: &TenantName, mut files: Vec<ImportFile>) -> Result<CycleReport, CycleError> {
        let entry = self
            .tenants
            .get(tenant)
            .ok_or_else(|| CycleError::UnknownTenant(tenant.clone()))?;

        let mut report = CycleReport::new(tenant.clone());
        report.status = CycleStatus::InProgress;

        // SKU map first: the export falls back to it for variants without a barcode.
        files.sort_by_key(|f| match f.export_type {
            ExportType::Product => 0,
            ExportType::Inventory => 1,
            ExportType::Other(_) => 2,
        });

        for mut file in files {
            if file.tenant != *tenant {
                warn!(file = %file.filename, owner = %file.tenant, "file belongs to another tenant, skipping");
                continue;
            }
            if let ExportType::Other(kind) = &file.export_type {
                warn!(file = %file.filename, export_type = %kind, "no importer for export type, skipping");
                continue;
            }

            file.advance(ImportStatus::InProgress)?;
            let text = self.poller.files().download(&file.remote_id)?;
            match file.export_type {
                ExportType::Product => report.products = Some(self.products.import(tenant, &text)?),
                ExportType::Inventory => report.inventory = Some(self.inventory.import(tenant, &text)?),
                ExportType::Other(_) => {}
            }
            file.advance(ImportStatus::Imported)?;
            info!(file = %file.filename, export_type = %file.export_type, "file imported");
            report.files.push(file);
        }

        report.export = Some(self.reconciler.export(&entry.context, entry.shop.as_ref())?);
        report.status = CycleStatus::Imported;
        Ok(report)
    }

    /// Job handler for `inventory.sync`. Outcomes are written to the job log.
    pub fn handle(&self, job: &mut Job) -> JobResult {
        let payload: SyncPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(e) => {
                let err = CycleError::Payload(e.to_string());
                job.append_log(LogLevel::Error, err.to_string());
                return JobResult::Fatal(err.to_string());
            }
        };

        let tenant = job.tenant.clone();
        job.append_log(
            LogLevel::Info,
            format!("attempt {}: syncing {} file(s)", job.attempt, payload.files.len()),
        );

        match self.run_cycle(&tenant, payload.files) {
            Ok(CycleOutcome::AlreadyRunning) => {
                job.append_log(LogLevel::Warn, "another sync holds the tenant lock, nothing done");
                JobResult::Success
            }
            Ok(CycleOutcome::Finished(report)) => {
                for file in &report.files {
                    job.append_log(
                        LogLevel::Info,
                        format!("{}: {:?}", file.filename, file.status()),
                    );
                }
                if let Some(products) = report.products {
                    job.append_log(
                        LogLevel::Info,
                        format!(
                            "products: {} rows, {} rejected, {} skus mapped",
                            products.rows_read, products.rows_rejected, products.skus_mapped
                        ),
                    );
                }
                if let Some(inventory) = report.inventory {
                    job.append_log(
                        LogLevel::Info,
                        format!(
                            "inventory: {} rows, {} rejected, {} records cached",
                            inventory.rows_read, inventory.rows_rejected, inventory.records_written
                        ),
                    );
                }
                if let Some(export) = report.export {
                    let level = if export.failed_writes > 0 { LogLevel::Warn } else { LogLevel::Info };
                    job.append_log(
                        level,
                        format!(
                            "export: {} updated, {} unchanged, {} unresolved, {} failed writes",
                            export.updated_count, export.unchanged, export.unresolved, export.failed_writes
                        ),
                    );
                }
                job.append_log(LogLevel::Info, format!("cycle {}", report.status));
                JobResult::Success
            }
            Err(e) => {
                error!(tenant = %tenant, error = %e, transient = e.is_transient(), "sync cycle failed");
                job.append_log(LogLevel::Error, format!("cycle {}: {e}", CycleStatus::Error));
                if e.is_transient() {
                    JobResult::Failure(e.to_string())
                } else {
                    JobResult::Fatal(e.to_string())
                }
            }
        }
    }
}
