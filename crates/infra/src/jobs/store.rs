//! Job storage.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use stocksync_core::TenantName;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, tenant: &TenantName, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest pending or retriable job that is ready to run and mark it running.
    fn claim_next(&self, tenant: Option<&TenantName>) -> Result<Option<Job>, JobStoreError>;

    fn list_by_status(
        &self,
        tenant: &TenantName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, tenant: &TenantName, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Counts over the jobs the store still holds.
    fn stats(&self, tenant: &TenantName) -> Result<JobStats, JobStoreError>;

    /// Jobs across all tenants that are not yet terminal.
    fn outstanding(&self) -> Result<usize, JobStoreError>;
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant: &TenantName, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, tenant: Option<&TenantName>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(tenant)
    }

    fn list_by_status(
        &self,
        tenant: &TenantName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(tenant, status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, tenant: &TenantName, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(tenant, limit)
    }

    fn stats(&self, tenant: &TenantName) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant)
    }

    fn outstanding(&self) -> Result<usize, JobStoreError> {
        (**self).outstanding()
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// Finished jobs (and dead letters) kept by default before the oldest are evicted.
pub const DEFAULT_RETAINED_JOBS: usize = 256;

/// In-memory job store.
///
/// Pending and running jobs are always kept. Once a job is completed or
/// dead-lettered it joins a bounded history, so a long-running worker does not
/// grow the store without limit.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    finished: Mutex<VecDeque<JobId>>,
    dead_letters: RwLock<VecDeque<DeadLetterEntry>>,
    retained: usize,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_RETAINED_JOBS)
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Keep at most `retained` finished jobs and `retained` dead letters.
    pub fn with_retention(retained: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            finished: Mutex::new(VecDeque::new()),
            dead_letters: RwLock::new(VecDeque::new()),
            retained,
        }
    }

    /// Jobs currently held, finished history included.
    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, tenant: &TenantName, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        match jobs.get(&job_id) {
            Some(job) if &job.tenant == tenant => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;
        let was_terminal = match jobs.get(&job.id) {
            Some(previous) => previous.status.is_terminal(),
            None => return Err(JobStoreError::NotFound(job.id)),
        };
        jobs.insert(job.id, job.clone());

        if job.status.is_terminal() && !was_terminal {
            let mut finished = self.finished.lock().map_err(|_| poisoned())?;
            finished.push_back(job.id);
            while finished.len() > self.retained {
                if let Some(evicted) = finished.pop_front() {
                    jobs.remove(&evicted);
                }
            }
        }
        Ok(())
    }

    fn claim_next(&self, tenant: Option<&TenantName>) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(|_| poisoned())?;

        let next = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. })
                    && j.is_ready()
                    && tenant.is_none_or(|t| &j.tenant == t)
            })
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn list_by_status(
        &self,
        tenant: &TenantName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| {
                &j.tenant == tenant
                    && status
                        .as_ref()
                        .is_none_or(|s| std::mem::discriminant(&j.status) == std::mem::discriminant(s))
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut dead_letters = self.dead_letters.write().map_err(|_| poisoned())?;
        dead_letters.retain(|e| e.job.id != job.id);
        dead_letters.push_back(DeadLetterEntry::new(job, reason));
        while dead_letters.len() > self.retained {
            dead_letters.pop_front();
        }
        Ok(())
    }

    fn list_dead_letters(&self, tenant: &TenantName, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dead_letters = self.dead_letters.read().map_err(|_| poisoned())?;
        let mut result: Vec<_> = dead_letters
            .iter()
            .filter(|e| &e.job.tenant == tenant)
            .cloned()
            .collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn stats(&self, tenant: &TenantName) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| &j.tenant == tenant) {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        Ok(stats)
    }

    fn outstanding(&self) -> Result<usize, JobStoreError> {
        let jobs = self.jobs.read().map_err(|_| poisoned())?;
        Ok(jobs.values().filter(|j| !j.status.is_terminal()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::{JobKind, RetryPolicy};
    use chrono::Utc;
    use std::time::Duration;

    fn tenant(name: &str) -> TenantName {
        TenantName::new(name).unwrap()
    }

    #[test]
    fn enqueue_and_claim_fifo() {
        let store = InMemoryJobStore::new();
        let first = Job::new(tenant("Acme"), JobKind::InventorySync, serde_json::json!({"n": 1}));
        let mut second = Job::new(tenant("Acme"), JobKind::InventorySync, serde_json::json!({"n": 2}));
        second.created_at = first.created_at + chrono::Duration::milliseconds(1);
        let first_id = store.enqueue(first).unwrap();
        store.enqueue(second).unwrap();

        let claimed = store.claim_next(None).unwrap().unwrap();
        assert_eq!(claimed.id, first_id);
        assert!(matches!(claimed.status, JobStatus::Running));
        assert_eq!(claimed.attempt, 1);

        // Running jobs are not handed out twice.
        let next = store.claim_next(None).unwrap().unwrap();
        assert_ne!(next.id, first_id);
        assert!(store.claim_next(None).unwrap().is_none());
    }

    #[test]
    fn tenant_isolation() {
        let store = InMemoryJobStore::new();
        let id = store
            .enqueue(Job::new(tenant("Acme"), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();

        assert!(store.get(&tenant("Acme"), id).unwrap().is_some());
        assert!(matches!(
            store.get(&tenant("Theia"), id),
            Err(JobStoreError::TenantIsolation)
        ));
        assert!(store.claim_next(Some(&tenant("Theia"))).unwrap().is_none());
    }

    #[test]
    fn delayed_retry_is_not_claimable_yet() {
        let store = InMemoryJobStore::new();
        let job = Job::new(tenant("Acme"), JobKind::InventorySync, serde_json::json!({}))
            .with_retry_policy(RetryPolicy::fixed(3, Duration::from_secs(60)));
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        claimed.mark_failed("redis down".to_string(), Utc::now());
        store.update(&claimed).unwrap();

        assert!(store.claim_next(None).unwrap().is_none());
        assert_eq!(store.outstanding().unwrap(), 1);
    }

    #[test]
    fn dead_letter_and_stats() {
        let store = InMemoryJobStore::new();
        let acme = tenant("Acme");
        store
            .enqueue(Job::new(acme.clone(), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();
        store
            .enqueue(Job::new(acme.clone(), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();

        let mut claimed = store.claim_next(Some(&acme)).unwrap().unwrap();
        claimed.mark_fatal("bad config".to_string(), Utc::now());
        store.update(&claimed).unwrap();
        store.dead_letter(claimed.clone(), "bad config".to_string()).unwrap();

        let stats = store.stats(&acme).unwrap();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.dead_lettered, 1);

        let dead = store.list_dead_letters(&acme, 10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job.id, claimed.id);
        assert_eq!(dead[0].reason, "bad config");
        assert!(store.list_dead_letters(&tenant("Theia"), 10).unwrap().is_empty());
    }

    #[test]
    fn list_by_status_filters_variant() {
        let store = InMemoryJobStore::new();
        let acme = tenant("Acme");
        store
            .enqueue(Job::new(acme.clone(), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();
        store.claim_next(None).unwrap();
        store
            .enqueue(Job::new(acme.clone(), JobKind::InventorySync, serde_json::json!({})))
            .unwrap();

        assert_eq!(store.list_by_status(&acme, Some(JobStatus::Running), 10).unwrap().len(), 1);
        assert_eq!(store.list_by_status(&acme, Some(JobStatus::Pending), 10).unwrap().len(), 1);
        assert_eq!(store.list_by_status(&acme, None, 1).unwrap().len(), 1);
    }

    #[test]
    fn finished_jobs_are_evicted_beyond_retention() {
        let store = InMemoryJobStore::with_retention(3);
        let acme = tenant("Acme");

        for n in 0..20 {
            store
                .enqueue(Job::new(acme.clone(), JobKind::InventorySync, serde_json::json!({"n": n})))
                .unwrap();
            let mut claimed = store.claim_next(None).unwrap().unwrap();
            if n % 2 == 0 {
                claimed.mark_completed(Utc::now());
                store.update(&claimed).unwrap();
            } else {
                claimed.mark_fatal("bad file".to_string(), Utc::now());
                store.update(&claimed).unwrap();
                store.dead_letter(claimed, "bad file".to_string()).unwrap();
            }
        }

        assert_eq!(store.len(), 3);
        assert_eq!(store.list_dead_letters(&acme, 100).unwrap().len(), 3);

        // The newest finished job is the one kept.
        let kept = store.list_by_status(&acme, None, 100).unwrap();
        assert!(kept.iter().any(|j| j.payload["n"] == 19));
        assert!(kept.iter().all(|j| j.payload["n"].as_i64().unwrap() >= 17));
    }

    #[test]
    fn unfinished_jobs_are_never_evicted() {
        let store = InMemoryJobStore::with_retention(1);
        let acme = tenant("Acme");
        for _ in 0..5 {
            store
                .enqueue(Job::new(acme.clone(), JobKind::InventorySync, serde_json::json!({})))
                .unwrap();
        }

        let mut claimed = store.claim_next(None).unwrap().unwrap();
        claimed.mark_completed(Utc::now());
        store.update(&claimed).unwrap();
        let mut claimed = store.claim_next(None).unwrap().unwrap();
        claimed.mark_completed(Utc::now());
        store.update(&claimed).unwrap();

        assert_eq!(store.len(), 4);
        assert_eq!(store.outstanding().unwrap(), 3);
    }

    #[test]
    fn updating_an_unknown_job_fails() {
        let store = InMemoryJobStore::new();
        let job = Job::new(tenant("Acme"), JobKind::InventorySync, serde_json::json!({}));
        assert!(matches!(store.update(&job), Err(JobStoreError::NotFound(_))));
        assert!(store.is_empty());
    }
}
