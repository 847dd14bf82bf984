//! Process configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use stocksync_core::TenantName;
use stocksync_feed::classify::DEFAULT_PREFIX;
use stocksync_infra::jobs::RetryPolicy;

use crate::pipeline::PipelineSettings;

pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_EXPORT_FOLDER: &str = "/e-commerce";
pub const DEFAULT_ACCOUNT: &str = "default";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("cannot read tenant directory {path}: {source}")]
    TenantsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot decode tenant directory {path}: {source}")]
    TenantsDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("tenant {tenant}: {reason}")]
    Tenant { tenant: TenantName, reason: String },
}

/// Everything the worker needs to start.
#[derive(Clone)]
pub struct SyncConfig {
    pub redis_url: String,
    pub dropbox_token: String,
    pub dropbox_account: String,
    pub export_folder: String,
    pub file_prefix: String,
    pub tenants_file: PathBuf,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub workers: usize,
    pub page_size: u32,
    pub run_once: bool,
    pub reset_cursor_on_exit: bool,
}

impl std::fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncConfig")
            .field("dropbox_account", &self.dropbox_account)
            .field("export_folder", &self.export_folder)
            .field("file_prefix", &self.file_prefix)
            .field("tenants_file", &self.tenants_file)
            .field("poll_interval", &self.poll_interval)
            .field("job_timeout", &self.job_timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_delay", &self.retry_delay)
            .field("workers", &self.workers)
            .field("page_size", &self.page_size)
            .field("run_once", &self.run_once)
            .field("reset_cursor_on_exit", &self.reset_cursor_on_exit)
            .finish_non_exhaustive()
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing(var));

        Ok(Self {
            redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            dropbox_token: required("DROPBOX_TOKEN")?,
            dropbox_account: get("DROPBOX_ACCOUNT").unwrap_or_else(|| DEFAULT_ACCOUNT.to_string()),
            export_folder: get("DROPBOX_EXPORT_FOLDER").unwrap_or_else(|| DEFAULT_EXPORT_FOLDER.to_string()),
            file_prefix: get("STOCKSYNC_FILE_PREFIX").unwrap_or_else(|| DEFAULT_PREFIX.to_string()),
            tenants_file: required("STOCKSYNC_TENANTS_FILE")?.into(),
            poll_interval: Duration::from_secs(parse_or(&get, "STOCKSYNC_POLL_INTERVAL_SECS", 300)?),
            job_timeout: Duration::from_secs(parse_or(&get, "STOCKSYNC_JOB_TIMEOUT_SECS", 540)?),
            max_retries: parse_or(&get, "STOCKSYNC_MAX_RETRIES", 3)?,
            retry_delay: Duration::from_secs(parse_or(&get, "STOCKSYNC_RETRY_DELAY_SECS", 60)?),
            workers: parse_or(&get, "STOCKSYNC_WORKERS", 2)?,
            page_size: parse_or(&get, "STOCKSYNC_PAGE_SIZE", 250)?,
            run_once: flag(&get, "STOCKSYNC_RUN_ONCE")?,
            reset_cursor_on_exit: flag(&get, "STOCKSYNC_RESET_CURSOR_ON_EXIT")?,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries.saturating_add(1), self.retry_delay)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            account: self.dropbox_account.clone(),
            export_folder: self.export_folder.clone(),
            file_prefix: self.file_prefix.clone(),
            page_size: self.page_size,
            retry_policy: self.retry_policy(),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn flag(get: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<bool, ConfigError> {
    match get(var).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0" | "false" | "no" | "off") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some(other) => Err(ConfigError::Invalid {
            var,
            value: other.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}
