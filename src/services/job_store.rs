//! In-memory job state machine.
//!
//! Items move `pending -> processing -> {completed, failed}` and never back.
//! Job progress and status are recomputed under the same write lock as the
//! item transition, so a reader always sees a consistent snapshot.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::job::{ItemResult, Job, JobStatus};
use crate::models::redact::RedactStorageRequest;

#[derive(Debug, Clone)]
pub struct JobStoreConfig {
    /// Jobs older than this are dropped on the next creation.
    pub ttl: Duration,
    /// Upper bound on retained jobs, oldest dropped first.
    pub max_jobs: usize,
}

impl Default for JobStoreConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 60 * 60),
            max_jobs: 1000,
        }
    }
}

/// Process-lifetime job registry. Created at startup and shared through
/// `AppState`; state does not survive a restart.
pub struct JobStore {
    config: JobStoreConfig,
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl JobStore {
    pub fn new(config: JobStoreConfig) -> Self {
        Self {
            config,
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Create a pending job with one item per request.
    pub fn create_job(
        &self,
        requests: Vec<RedactStorageRequest>,
        webhook_url: Option<String>,
    ) -> Job {
        self.create_job_at(requests, webhook_url, Utc::now())
    }

    fn create_job_at(
        &self,
        requests: Vec<RedactStorageRequest>,
        webhook_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Job {
        let job = Job::new(requests, webhook_url, now);

        let mut jobs = self.write();
        let evicted = self.evict(&mut jobs, now);
        if evicted > 0 {
            tracing::info!(evicted, remaining = jobs.len(), "Evicted expired jobs");
        }
        jobs.insert(job.id, job.clone());
        job
    }

    /// Consistent snapshot of a job.
    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.read().get(&job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// `pending -> processing`.
    pub fn start_item(&self, job_id: Uuid, index: usize) -> Result<JobStatus, JobStoreError> {
        self.transition(job_id, index, JobStatus::Processing, |item, now| {
            item.started_at = Some(now);
        })
    }

    /// `processing -> completed`.
    pub fn complete_item(
        &self,
        job_id: Uuid,
        index: usize,
        result: ItemResult,
    ) -> Result<JobStatus, JobStoreError> {
        self.transition(job_id, index, JobStatus::Completed, move |item, now| {
            item.result = Some(result);
            item.completed_at = Some(now);
        })
    }

    /// `processing -> failed`.
    pub fn fail_item(
        &self,
        job_id: Uuid,
        index: usize,
        error: impl Into<String>,
    ) -> Result<JobStatus, JobStoreError> {
        let error = error.into();
        self.transition(job_id, index, JobStatus::Failed, move |item, now| {
            item.error = Some(error);
            item.completed_at = Some(now);
        })
    }

    fn transition(
        &self,
        job_id: Uuid,
        index: usize,
        to: JobStatus,
        update: impl FnOnce(&mut crate::models::job::JobItem, DateTime<Utc>),
    ) -> Result<JobStatus, JobStoreError> {
        let now = Utc::now();
        let mut jobs = self.write();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(JobStoreError::JobNotFound(job_id))?;
        let item = job
            .items
            .get_mut(index)
            .ok_or(JobStoreError::ItemNotFound { job_id, index })?;

        let allowed = matches!(
            (item.status, to),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        );
        if !allowed {
            return Err(JobStoreError::InvalidTransition {
                index,
                from: item.status,
                to,
            });
        }

        item.status = to;
        update(item, now);
        job.refresh(now);
        Ok(job.status)
    }

    /// Drop expired jobs, then the oldest until a new job fits.
    fn evict(&self, jobs: &mut HashMap<Uuid, Job>, now: DateTime<Utc>) -> usize {
        let before = jobs.len();
        let ttl = chrono::Duration::from_std(self.config.ttl).unwrap_or(chrono::Duration::MAX);
        jobs.retain(|_, job| now.signed_duration_since(job.created_at) <= ttl);

        if jobs.len() >= self.config.max_jobs {
            let mut by_age: Vec<(DateTime<Utc>, Uuid)> =
                jobs.values().map(|job| (job.created_at, job.id)).collect();
            by_age.sort();
            let excess = jobs.len() + 1 - self.config.max_jobs.max(1);
            for (_, id) in by_age.into_iter().take(excess) {
                jobs.remove(&id);
            }
        }

        before - jobs.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Job {job_id} has no item {index}")]
    ItemNotFound { job_id: Uuid, index: usize },

    #[error("Item {index} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        index: usize,
        from: JobStatus,
        to: JobStatus,
    },
}
