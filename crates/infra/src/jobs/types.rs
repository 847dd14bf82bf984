//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stocksync_core::TenantName;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job kind, used to route to a handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Import the selected exports of one tenant and reconcile the remote store.
    InventorySync,
}

impl JobKind {
    pub const INVENTORY_SYNC: &'static str = "inventory.sync";

    pub fn type_name(&self) -> &str {
        match self {
            JobKind::InventorySync => Self::INVENTORY_SYNC,
        }
    }
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Currently being executed
    Running,
    Completed,
    /// Failed, will be retried
    Failed { error: String, attempt: u32 },
    /// Out of retries or failed fatally
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::DeadLettered { .. })
    }
}

/// Retry policy: a fixed delay between attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(60))
    }
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    /// Delay before the attempt following `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 { Duration::ZERO } else { self.delay }
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of a job's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant: TenantName,
    pub kind: JobKind,
    pub payload: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest time the next attempt may start
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
    pub log: Vec<JobLogEntry>,
}

/// Record of a job execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Job {
    pub fn new(tenant: TenantName, kind: JobKind, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tenant,
            kind,
            payload,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn is_ready(&self) -> bool {
        match self.scheduled_at {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    pub fn append_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.log.push(JobLogEntry {
            at: Utc::now(),
            level,
            message: message.into(),
        });
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.status = JobStatus::Completed;
        self.updated_at = now;
        self.record_attempt(started_at, now, None);
    }

    /// Transient failure: schedule a retry or dead-letter when out of attempts.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        let delay = self.retry_policy.delay_for_attempt(self.attempt);
        let now = Utc::now();
        self.updated_at = now;
        self.record_attempt(started_at, now, Some(error.clone()));

        if self.retry_policy.should_retry(self.attempt) {
            self.scheduled_at = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }

    /// Non-transient failure: no retry.
    pub fn mark_fatal(&mut self, error: String, started_at: DateTime<Utc>) {
        let now = Utc::now();
        self.updated_at = now;
        self.record_attempt(started_at, now, Some(error.clone()));
        self.status = JobStatus::DeadLettered {
            error,
            attempts: self.attempt,
        };
    }

    fn record_attempt(&mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>, error: Option<String>) {
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at,
            success: error.is_none(),
            error,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        });
    }
}

/// Outcome a handler reports for one attempt.
#[derive(Debug)]
pub enum JobResult {
    Success,
    /// Transient failure, retried per the job's policy
    Failure(String),
    /// Non-transient failure, dead-lettered without retry
    Fatal(String),
}

/// Entry in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantName {
        TenantName::new("Acme").unwrap()
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(500));

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
    }

    #[test]
    fn should_retry_respects_max_attempts() {
        let policy = RetryPolicy::fixed(3, Duration::ZERO);

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
        assert!(!RetryPolicy::fixed(1, Duration::ZERO).should_retry(1));
    }

    #[test]
    fn inventory_sync_kind_name() {
        assert_eq!(JobKind::InventorySync.type_name(), "inventory.sync");
    }

    #[test]
    fn job_lifecycle() {
        let mut job = Job::new(tenant(), JobKind::InventorySync, serde_json::json!({"files": []}));

        assert!(matches!(job.status, JobStatus::Pending));
        assert_eq!(job.attempt, 0);

        job.mark_running();
        assert!(matches!(job.status, JobStatus::Running));
        assert_eq!(job.attempt, 1);

        job.mark_completed(Utc::now());
        assert!(matches!(job.status, JobStatus::Completed));
        assert_eq!(job.history.len(), 1);
        assert!(job.history[0].success);
    }

    #[test]
    fn job_failure_and_retry() {
        let mut job = Job::new(tenant(), JobKind::InventorySync, serde_json::json!({}))
            .with_retry_policy(RetryPolicy::fixed(2, Duration::from_secs(60)));

        job.mark_running();
        job.mark_failed("timeout".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::Failed { attempt: 1, .. }));
        assert!(!job.is_ready());

        job.mark_running();
        job.mark_failed("timeout".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 2, .. }));
        assert_eq!(job.history.len(), 2);
    }

    #[test]
    fn fatal_failure_skips_retries() {
        let mut job = Job::new(tenant(), JobKind::InventorySync, serde_json::json!({}))
            .with_retry_policy(RetryPolicy::fixed(5, Duration::ZERO));

        job.mark_running();
        job.mark_fatal("missing location".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 1, .. }));
    }

    #[test]
    fn log_is_append_only_in_order() {
        let mut job = Job::new(tenant(), JobKind::InventorySync, serde_json::json!({}));
        job.append_log(LogLevel::Info, "import started");
        job.append_log(LogLevel::Warn, "row rejected");
        job.append_log(LogLevel::Info, "import finished");

        let messages: Vec<_> = job.log.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, ["import started", "row rejected", "import finished"]);
        assert_eq!(job.log[1].level, LogLevel::Warn);
    }
}
