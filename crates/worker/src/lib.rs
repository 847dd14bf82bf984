//! Inventory sync worker: configuration, tenant directory and the per-tenant
//! import/export pipeline run by the job executor.

pub mod config;
pub mod cycle;
pub mod pipeline;
pub mod tenants;

pub use config::{ConfigError, SyncConfig};
pub use cycle::{CycleError, CycleOutcome, CycleReport, CycleStatus, SyncPayload};
pub use pipeline::{DiscoverError, DiscoverSummary, PipelineSettings, SyncPipeline, SyncServices};
pub use tenants::{TenantConfig, TenantDirectory, TenantEntry};

#[cfg(test)]
mod integration_tests;
