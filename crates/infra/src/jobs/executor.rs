//! Job executor with retry, timeout and dead-letter handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobKind, JobResult, JobStatus, LogLevel};

/// Job handler function type. The handler may append to the job's log.
pub type JobHandler = Arc<dyn Fn(&mut Job) -> JobResult + Send + Sync>;

/// Why an attempt did not complete.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    /// The handler failed; the job was settled as retrying or dead-lettered.
    #[error("job failed: {0}")]
    Job(String),

    /// The outcome could not be recorded; the job may still be marked running.
    #[error(transparent)]
    Store(#[from] JobStoreError),
}

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often idle workers poll for new jobs
    pub poll_interval: Duration,
    /// Number of worker threads
    pub workers: usize,
    /// Name for logging and thread names
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            workers: 2,
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Handle to control running executor threads.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: Arc<AtomicBool>,
    joins: Vec<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Stop claiming new jobs, wait for in-flight ones to settle and return the final stats.
    pub fn shutdown(self) -> ExecutorStats {
        self.shutdown.store(true, Ordering::SeqCst);
        for join in self.joins {
            let _ = join.join();
        }
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub jobs_timed_out: u64,
    pub current_running: usize,
}

/// Background job executor.
///
/// Claims jobs from a store, runs each attempt on its own thread under a
/// hard wall-clock limit, and applies the retry policy to the outcome.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
    job_timeout: Duration,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S, job_timeout: Duration) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
            job_timeout,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a handler for a job kind (`"inventory.sync"`, `"inventory.*"` or `"*"`).
    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&mut Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Arc::new(handler));
    }

    fn get_handler(&self, kind: &JobKind) -> Option<JobHandler> {
        let type_name = kind.type_name();
        if let Some(h) = self.handlers.get(type_name) {
            return Some(h.clone());
        }

        for (pattern, handler) in &self.handlers {
            if let Some(prefix) = pattern.strip_suffix(".*") {
                if type_name.starts_with(prefix) {
                    return Some(handler.clone());
                }
            }
        }

        self.handlers.get("*").cloned()
    }

    /// Spawn `config.workers` executor threads.
    pub fn spawn(self, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let executor = Arc::new(self);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));

        let mut joins = Vec::with_capacity(config.workers);
        for index in 0..config.workers.max(1) {
            let executor = executor.clone();
            let thread_shutdown = shutdown.clone();
            let stats = stats.clone();
            let config = config.clone();
            let name = format!("{}-{}", config.name, index);
            let join = thread::Builder::new()
                .name(name.clone())
                .spawn(move || executor_loop(&executor, &name, &config, &thread_shutdown, &stats));
            match join {
                Ok(join) => joins.push(join),
                Err(e) => {
                    shutdown.store(true, Ordering::SeqCst);
                    for join in joins {
                        let _ = join.join();
                    }
                    return Err(e);
                }
            }
        }

        Ok(JobExecutorHandle {
            shutdown,
            joins,
            stats,
        })
    }

    /// Execute a job already claimed via [`JobStore::claim_next`].
    pub fn execute_one(&self, job: &mut Job) -> Result<(), ExecuteError> {
        let Some(handler) = self.get_handler(&job.kind) else {
            let error = format!("no handler for job kind: {}", job.kind.type_name());
            warn!(job_id = %job.id, error = %error, "no handler for job");
            return self.settle(job, Utc::now(), JobResult::Fatal(error));
        };

        let started = Utc::now();
        let result = run_with_timeout(handler, job, self.job_timeout);
        self.settle(job, started, result)
    }

    /// Run claimable jobs on the calling thread until none are outstanding.
    ///
    /// Stops at the first store failure, since a job whose outcome was not
    /// recorded would otherwise stay outstanding forever.
    pub fn run_until_idle(&self, poll_interval: Duration) -> Result<usize, JobStoreError> {
        let mut processed = 0;
        loop {
            match self.store.claim_next(None)? {
                Some(mut job) => {
                    match self.execute_one(&mut job) {
                        Ok(()) | Err(ExecuteError::Job(_)) => {}
                        Err(ExecuteError::Store(e)) => {
                            error!(job_id = %job.id, error = %e, "failed to record job outcome");
                            return Err(e);
                        }
                    }
                    processed += 1;
                }
                None if self.store.outstanding()? > 0 => thread::sleep(poll_interval),
                None => return Ok(processed),
            }
        }
    }

    fn settle(&self, job: &mut Job, started: DateTime<Utc>, result: JobResult) -> Result<(), ExecuteError> {
        let error = match result {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job)?;
                debug!(job_id = %job.id, tenant = %job.tenant, "job completed");
                return Ok(());
            }
            JobResult::Failure(error) => {
                job.append_log(LogLevel::Error, format!("attempt {} failed: {error}", job.attempt));
                job.mark_failed(error.clone(), started);
                error
            }
            JobResult::Fatal(error) => {
                job.append_log(LogLevel::Error, format!("attempt {} failed fatally: {error}", job.attempt));
                job.mark_fatal(error.clone(), started);
                error
            }
        };

        self.store.update(job)?;
        if matches!(job.status, JobStatus::DeadLettered { .. }) {
            warn!(job_id = %job.id, tenant = %job.tenant, error = %error, "job dead-lettered");
            self.store.dead_letter(job.clone(), error.clone())?;
        } else {
            info!(
                job_id = %job.id,
                tenant = %job.tenant,
                attempt = job.attempt,
                error = %error,
                "job failed, retry scheduled"
            );
        }
        Err(ExecuteError::Job(error))
    }
}

/// Run one attempt on its own thread. A timed-out attempt is abandoned; its
/// thread is left to finish in the background.
fn run_with_timeout(handler: JobHandler, job: &mut Job, timeout: Duration) -> JobResult {
    let (tx, rx) = mpsc::channel();
    let mut attempt = job.clone();
    let spawned = thread::Builder::new()
        .name(format!("job-{}", job.id))
        .spawn(move || {
            let result = handler(&mut attempt);
            let _ = tx.send((attempt.log, result));
        });
    if let Err(e) = spawned {
        return JobResult::Failure(format!("failed to spawn job thread: {e}"));
    }

    match rx.recv_timeout(timeout) {
        Ok((log, result)) => {
            job.log = log;
            result
        }
        Err(mpsc::RecvTimeoutError::Timeout) => {
            JobResult::Failure(format!("job timed out after {}s", timeout.as_secs()))
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => JobResult::Failure("job handler panicked".to_string()),
    }
}

fn update_stats(stats: &Mutex<ExecutorStats>, f: impl FnOnce(&mut ExecutorStats)) {
    if let Ok(mut s) = stats.lock() {
        f(&mut s);
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: &JobExecutor<S>,
    name: &str,
    config: &JobExecutorConfig,
    shutdown: &AtomicBool,
    stats: &Mutex<ExecutorStats>,
) {
    info!(executor = %name, "job executor started");

    while !shutdown.load(Ordering::SeqCst) {
        match executor.store.claim_next(None) {
            Ok(Some(mut job)) => {
                debug!(executor = %name, job_id = %job.id, kind = job.kind.type_name(), "claimed job");
                update_stats(stats, |s| s.current_running += 1);

                let started = Instant::now();
                let result = executor.execute_one(&mut job);
                let timed_out = started.elapsed() >= executor.job_timeout;

                update_stats(stats, |s| {
                    s.current_running = s.current_running.saturating_sub(1);
                    s.jobs_processed += 1;
                    if timed_out {
                        s.jobs_timed_out += 1;
                    }
                    match &result {
                        Ok(()) => s.jobs_succeeded += 1,
                        Err(_) => {
                            s.jobs_failed += 1;
                            if matches!(job.status, JobStatus::DeadLettered { .. }) {
                                s.jobs_dead_lettered += 1;
                            }
                        }
                    }
                });

                match result {
                    Ok(()) => {}
                    Err(ExecuteError::Job(e)) => {
                        debug!(executor = %name, job_id = %job.id, error = %e, status = ?job.status, "job execution failed");
                    }
                    Err(ExecuteError::Store(e)) => {
                        error!(executor = %name, job_id = %job.id, error = %e, "failed to record job outcome");
                    }
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(executor = %name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(executor = %name, "job executor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::{InMemoryJobStore, JobStats};
    use crate::jobs::types::{DeadLetterEntry, JobId, RetryPolicy};
    use std::sync::atomic::AtomicUsize;
    use stocksync_core::TenantName;

    fn tenant() -> TenantName {
        TenantName::new("Acme").unwrap()
    }

    fn executor(store: &Arc<InMemoryJobStore>) -> JobExecutor<Arc<InMemoryJobStore>> {
        JobExecutor::new(store.clone(), Duration::from_secs(5))
    }

    #[test]
    fn execute_successful_job_keeps_handler_log() {
        let store = InMemoryJobStore::arc();
        let mut executor = executor(&store);
        executor.register_handler("inventory.sync", |job| {
            job.append_log(LogLevel::Info, "imported 3 rows");
            JobResult::Success
        });

        store
            .enqueue(Job::new(tenant(), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();
        let mut claimed = store.claim_next(None).unwrap().unwrap();

        assert!(executor.execute_one(&mut claimed).is_ok());
        assert!(matches!(claimed.status, JobStatus::Completed));

        let stored = store.get(&tenant(), claimed.id).unwrap().unwrap();
        assert_eq!(stored.log.len(), 1);
        assert_eq!(stored.log[0].message, "imported 3 rows");
    }

    #[test]
    fn transient_failure_retries_then_dead_letters() {
        let store = InMemoryJobStore::arc();
        let mut executor = executor(&store);
        executor.register_handler("inventory.sync", |_job| JobResult::Failure("redis down".to_string()));

        store
            .enqueue(
                Job::new(tenant(), JobKind::InventorySync, serde_json::json!({}))
                    .with_retry_policy(RetryPolicy::fixed(2, Duration::ZERO)),
            )
            .unwrap();

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_err());
        assert!(matches!(claimed.status, JobStatus::Failed { .. }));

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { .. }));
        assert_eq!(store.list_dead_letters(&tenant(), 10).unwrap().len(), 1);
    }

    #[test]
    fn fatal_failure_is_not_retried() {
        let store = InMemoryJobStore::arc();
        let mut executor = executor(&store);
        executor.register_handler("inventory.sync", |_job| JobResult::Fatal("no location".to_string()));

        store
            .enqueue(
                Job::new(tenant(), JobKind::InventorySync, serde_json::json!({}))
                    .with_retry_policy(RetryPolicy::fixed(5, Duration::ZERO)),
            )
            .unwrap();

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { attempts: 1, .. }));
        assert!(store.claim_next(None).unwrap().is_none());
    }

    #[test]
    fn timed_out_attempt_is_retried() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone(), Duration::from_millis(30));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        executor.register_handler("inventory.sync", move |_job| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                thread::sleep(Duration::from_millis(200));
            }
            JobResult::Success
        });

        store
            .enqueue(
                Job::new(tenant(), JobKind::InventorySync, serde_json::json!({}))
                    .with_retry_policy(RetryPolicy::fixed(3, Duration::ZERO)),
            )
            .unwrap();

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        let err = executor.execute_one(&mut claimed).unwrap_err();
        assert!(matches!(err, ExecuteError::Job(ref msg) if msg.contains("timed out")));
        assert!(matches!(claimed.status, JobStatus::Failed { .. }));

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_ok());
        assert_eq!(claimed.attempt, 2);
    }

    #[test]
    fn panicking_handler_counts_as_failure() {
        let store = InMemoryJobStore::arc();
        let mut executor = executor(&store);
        executor.register_handler("*", |_job| panic!("boom"));

        store
            .enqueue(
                Job::new(tenant(), JobKind::InventorySync, serde_json::json!({}))
                    .with_retry_policy(RetryPolicy::fixed(1, Duration::ZERO)),
            )
            .unwrap();

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        let err = executor.execute_one(&mut claimed).unwrap_err();
        assert!(matches!(err, ExecuteError::Job(ref msg) if msg.contains("panicked")));
        assert!(matches!(claimed.status, JobStatus::DeadLettered { attempts: 1, .. }));
    }

    #[test]
    fn category_and_missing_handlers() {
        let store = InMemoryJobStore::arc();
        let mut executor = executor(&store);
        executor.register_handler("inventory.*", |_job| JobResult::Success);

        store
            .enqueue(Job::new(tenant(), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();
        let mut claimed = store.claim_next(None).unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_ok());

        let unrouted = JobExecutor::new(store.clone(), Duration::from_secs(5));
        store
            .enqueue(Job::new(tenant(), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();
        let mut claimed = store.claim_next(None).unwrap().unwrap();
        assert!(unrouted.execute_one(&mut claimed).is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { .. }));
    }

    #[test]
    fn spawned_workers_drain_the_queue() {
        let store = InMemoryJobStore::arc();
        let mut executor = executor(&store);
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        executor.register_handler("inventory.sync", move |_job| {
            counter.fetch_add(1, Ordering::SeqCst);
            JobResult::Success
        });

        for _ in 0..5 {
            store
                .enqueue(Job::new(tenant(), JobKind::InventorySync, serde_json::json!({})))
                .unwrap();
        }

        let handle = executor
            .spawn(
                JobExecutorConfig::default()
                    .with_workers(3)
                    .with_poll_interval(Duration::from_millis(5)),
            )
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while store.outstanding().unwrap() > 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        let stats = handle.shutdown();

        assert_eq!(done.load(Ordering::SeqCst), 5);
        assert_eq!(stats.jobs_succeeded, 5);
    }

    #[test]
    fn run_until_idle_waits_for_retries() {
        let store = InMemoryJobStore::arc();
        let mut executor = executor(&store);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        executor.register_handler("inventory.sync", move |_job| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                JobResult::Failure("dropbox unavailable".to_string())
            } else {
                JobResult::Success
            }
        });

        store
            .enqueue(
                Job::new(tenant(), JobKind::InventorySync, serde_json::json!({}))
                    .with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(20))),
            )
            .unwrap();

        let processed = executor.run_until_idle(Duration::from_millis(5)).unwrap();
        assert_eq!(processed, 2);
        assert_eq!(store.outstanding().unwrap(), 0);
    }

    /// Claims work, but every outcome write is refused.
    struct RejectingUpdates(InMemoryJobStore);

    impl JobStore for RejectingUpdates {
        fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
            self.0.enqueue(job)
        }

        fn get(&self, tenant: &TenantName, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
            self.0.get(tenant, job_id)
        }

        fn update(&self, _job: &Job) -> Result<(), JobStoreError> {
            Err(JobStoreError::Storage("disk full".to_string()))
        }

        fn claim_next(&self, tenant: Option<&TenantName>) -> Result<Option<Job>, JobStoreError> {
            self.0.claim_next(tenant)
        }

        fn list_by_status(
            &self,
            tenant: &TenantName,
            status: Option<JobStatus>,
            limit: usize,
        ) -> Result<Vec<Job>, JobStoreError> {
            self.0.list_by_status(tenant, status, limit)
        }

        fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
            self.0.dead_letter(job, reason)
        }

        fn list_dead_letters(&self, tenant: &TenantName, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
            self.0.list_dead_letters(tenant, limit)
        }

        fn stats(&self, tenant: &TenantName) -> Result<JobStats, JobStoreError> {
            self.0.stats(tenant)
        }

        fn outstanding(&self) -> Result<usize, JobStoreError> {
            self.0.outstanding()
        }
    }

    #[test]
    fn run_until_idle_stops_when_an_outcome_cannot_be_recorded() {
        let store = Arc::new(RejectingUpdates(InMemoryJobStore::new()));
        let mut executor = JobExecutor::new(store.clone(), Duration::from_secs(5));
        executor.register_handler("inventory.sync", |_job| JobResult::Success);

        store
            .enqueue(Job::new(tenant(), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();

        let started = Instant::now();
        let result = executor.run_until_idle(Duration::from_millis(5));

        assert!(matches!(result, Err(JobStoreError::Storage(ref msg)) if msg == "disk full"));
        assert!(started.elapsed() < Duration::from_secs(5));
        // The claimed job is still marked running in the backing store.
        assert_eq!(store.outstanding().unwrap(), 1);
    }
}
