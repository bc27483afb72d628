use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::redact::{RedactStorageRequest, StorageLocation};
use crate::models::region::OutputFormat;

/// Status shared by jobs and their items.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Outcome of a successfully processed item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemResult {
    pub output: StorageLocation,
    pub content_hash: String,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    pub size_bytes: u64,
    pub processing_time_ms: u64,
    /// True when an earlier identical run was found and nothing was redone.
    pub skipped: bool,
}

/// One entry of a batch.
#[derive(Debug, Clone, Serialize)]
pub struct JobItem {
    pub id: Uuid,
    pub index: usize,
    pub request: RedactStorageRequest,
    pub status: JobStatus,
    pub result: Option<ItemResult>,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct JobProgress {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobProgress {
    pub fn pending(&self) -> usize {
        self.total - self.completed - self.failed
    }
}

/// A batch submission and its per-item state.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub items: Vec<JobItem>,
    pub webhook_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: JobProgress,
}

impl Job {
    pub fn new(
        requests: Vec<RedactStorageRequest>,
        webhook_url: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let items: Vec<JobItem> = requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| JobItem {
                id: Uuid::new_v4(),
                index,
                request,
                status: JobStatus::Pending,
                result: None,
                error: None,
                started_at: None,
                completed_at: None,
            })
            .collect();

        Self {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            progress: JobProgress {
                total: items.len(),
                ..Default::default()
            },
            items,
            webhook_url,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// Recompute progress and job status from item states.
    pub(crate) fn refresh(&mut self, now: DateTime<Utc>) {
        let completed = self
            .items
            .iter()
            .filter(|i| i.status == JobStatus::Completed)
            .count();
        let failed = self
            .items
            .iter()
            .filter(|i| i.status == JobStatus::Failed)
            .count();
        let any_started = self.items.iter().any(|i| i.status != JobStatus::Pending);

        self.progress = JobProgress {
            total: self.items.len(),
            completed,
            failed,
        };

        self.status = if completed + failed == self.items.len() {
            if failed > 0 {
                JobStatus::Failed
            } else {
                JobStatus::Completed
            }
        } else if any_started {
            JobStatus::Processing
        } else {
            JobStatus::Pending
        };

        if any_started && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if self.status.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
    }

    /// Status view returned to pollers and webhook receivers.
    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id,
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            progress: ProgressView {
                total: self.progress.total,
                completed: self.progress.completed,
                failed: self.progress.failed,
                pending: self.progress.pending(),
            },
            items: self
                .items
                .iter()
                .map(|item| ItemView {
                    index: item.index,
                    status: item.status,
                    input: item.request.input.clone(),
                    output: item.result.as_ref().map(|r| r.output.clone()),
                    processing_time_ms: item.result.as_ref().map(|r| r.processing_time_ms),
                    content_hash: item.result.as_ref().map(|r| r.content_hash.clone()),
                    error: item.error.clone(),
                    started_at: item.started_at,
                    completed_at: item.completed_at,
                })
                .collect(),
            webhook_url: self.webhook_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressView {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub pending: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemView {
    pub index: usize,
    pub status: JobStatus,
    pub input: StorageLocation,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub output: Option<StorageLocation>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub processing_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Job status as seen from outside the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<DateTime<Utc>>,
    pub progress: ProgressView,
    pub items: Vec<ItemView>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub webhook_url: Option<String>,
}
