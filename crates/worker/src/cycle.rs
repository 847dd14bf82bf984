//! One tenant's sync cycle: its payload, state and outcome.

use serde::{Deserialize, Serialize};

use stocksync_core::{DomainError, TenantName};
use stocksync_feed::{FileStoreError, ImportFile};
use stocksync_importer::{ImportError, InventorySummary, ProductSummary};
use stocksync_infra::LockError;
use stocksync_reconcile::{ExportSummary, ReconcileError};

/// Job payload of an `inventory.sync` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPayload {
    pub files: Vec<ImportFile>,
}

/// Per-tenant cycle state. `InProgress` is only reachable with the lock held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    NotImported,
    InProgress,
    Imported,
    Error,
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CycleStatus::NotImported => "NOT_IMPORTED",
            CycleStatus::InProgress => "IN_PROGRESS",
            CycleStatus::Imported => "IMPORTED",
            CycleStatus::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub tenant: TenantName,
    pub status: CycleStatus,
    pub products: Option<ProductSummary>,
    pub inventory: Option<InventorySummary>,
    pub export: Option<ExportSummary>,
    /// Files that finished importing, with their final status.
    pub files: Vec<ImportFile>,
}

impl CycleReport {
    pub fn new(tenant: TenantName) -> Self {
        Self {
            tenant,
            status: CycleStatus::NotImported,
            products: None,
            inventory: None,
            export: None,
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Another run for the same tenant holds the lock; nothing was done.
    AlreadyRunning,
    Finished(CycleReport),
}

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("tenant {0} is not in the tenant directory")]
    UnknownTenant(TenantName),

    #[error("invalid job payload: {0}")]
    Payload(String),

    #[error("download failed: {0}")]
    Download(#[from] FileStoreError),

    #[error("import failed: {0}")]
    Import(#[from] ImportError),

    #[error("export failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("job lock: {0}")]
    Lock(#[from] LockError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CycleError {
    /// Transient failures are retried; everything else ends the cycle in ERROR.
    pub fn is_transient(&self) -> bool {
        match self {
            CycleError::Download(e) => e.is_transient(),
            CycleError::Import(e) => e.is_transient(),
            CycleError::Reconcile(e) => e.is_transient(),
            CycleError::Lock(e) => e.is_transient(),
            CycleError::UnknownTenant(_) | CycleError::Payload(_) | CycleError::Domain(_) => false,
        }
    }
}
