//! Background job system with retry, timeout and dead-letter handling.
//!
//! - Jobs are tenant-scoped and typed
//! - Fixed-delay retry for transient failures; fatal failures dead-letter at once
//! - Each attempt has a hard wall-clock limit; a timed-out attempt counts as transient
//! - Every job keeps its attempt history and an append-only log

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecuteError, ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use store::{DEFAULT_RETAINED_JOBS, InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    DeadLetterEntry, Job, JobId, JobKind, JobLogEntry, JobResult, JobStatus, LogLevel, RetryPolicy,
};
