//! Storage-backed redaction and batch job execution.
//!
//! Items of one job run strictly one after another in submission order.
//! Separate jobs run in separate tasks and may overlap.

use std::sync::Arc;

use bytes::Bytes;
use garde::Validate;
use sha2::{Digest, Sha256};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{RedactError, RedactResult};
use crate::models::job::{ItemResult, JobStatus};
use crate::models::redact::RedactStorageRequest;
use crate::services::job_store::{JobStore, JobStoreError};
use crate::services::pipeline::{ProcessedImage, RedactionInput, RedactionPipeline};
use crate::services::storage::{ObjectMetadata, ObjectStore};
use crate::services::webhook::{JobCompletedEvent, WebhookNotifier};

const META_CONTENT_HASH: &str = "content-hash";
const META_DURATION: &str = "processing-duration-ms";
const META_JOB_ID: &str = "job-id";
const META_ITEM_ID: &str = "item-id";
const META_IDEMPOTENCY_KEY: &str = "idempotency-key";
const META_WIDTH: &str = "width";
const META_HEIGHT: &str = "height";

/// Identifies the batch item a storage redaction belongs to, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemContext {
    pub job_id: Option<Uuid>,
    pub item_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    storage: Arc<dyn ObjectStore>,
    jobs: Arc<JobStore>,
    pipeline: RedactionPipeline,
    notifier: Arc<WebhookNotifier>,
    default_webhook_url: Option<String>,
}

impl BatchOrchestrator {
    pub fn new(
        storage: Arc<dyn ObjectStore>,
        jobs: Arc<JobStore>,
        pipeline: RedactionPipeline,
        notifier: Arc<WebhookNotifier>,
        default_webhook_url: Option<String>,
    ) -> Self {
        Self {
            storage,
            jobs,
            pipeline,
            notifier,
            default_webhook_url,
        }
    }

    /// Run a created job in the background. Returns without waiting.
    pub fn submit(&self, job_id: Uuid) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move { orchestrator.run_job(job_id).await })
    }

    /// Drive every item of the job to a terminal state, then notify.
    pub async fn run_job(&self, job_id: Uuid) {
        let Some(job) = self.jobs.get(job_id) else {
            tracing::warn!(%job_id, "Job vanished before processing started");
            return;
        };

        tracing::info!(%job_id, items = job.items.len(), "Processing batch job");

        for item in &job.items {
            match self.jobs.start_item(job_id, item.index) {
                Ok(_) => {}
                Err(JobStoreError::JobNotFound(_)) => {
                    tracing::warn!(%job_id, "Job evicted while processing, stopping");
                    return;
                }
                Err(e) => {
                    tracing::error!(%job_id, item_index = item.index, error = %e, "Cannot start item");
                    continue;
                }
            }

            let context = ItemContext {
                job_id: Some(job_id),
                item_id: Some(item.id),
            };

            let transition = match self.process_single(&item.request, context).await {
                Ok(result) => {
                    tracing::info!(
                        %job_id,
                        item_index = item.index,
                        content_hash = %result.content_hash,
                        processing_time_ms = result.processing_time_ms,
                        skipped = result.skipped,
                        "Item completed"
                    );
                    metrics::counter!("batch_items_completed").increment(1);
                    self.jobs.complete_item(job_id, item.index, result)
                }
                Err(e) => {
                    tracing::warn!(
                        %job_id,
                        item_index = item.index,
                        code = e.code(),
                        error = %e,
                        "Item failed"
                    );
                    metrics::counter!("batch_items_failed").increment(1);
                    self.jobs.fail_item(job_id, item.index, e.to_string())
                }
            };

            if let Err(e) = transition {
                tracing::error!(%job_id, item_index = item.index, error = %e, "Cannot record item outcome");
            }
        }

        let Some(job) = self.jobs.get(job_id) else {
            return;
        };

        tracing::info!(
            %job_id,
            status = ?job.status,
            completed = job.progress.completed,
            failed = job.progress.failed,
            "Batch job finished"
        );
        let outcome = if job.status == JobStatus::Completed {
            "completed"
        } else {
            "failed"
        };
        metrics::counter!("batch_jobs_finished_total", "status" => outcome).increment(1);

        let url = job.webhook_url.clone().or_else(|| self.default_webhook_url.clone());
        if let Some(url) = url {
            let view = job.view();
            match serde_json::to_value(JobCompletedEvent::new(&view)) {
                Ok(payload) => {
                    self.notifier.deliver(&url, &payload).await;
                }
                Err(e) => {
                    tracing::error!(%job_id, error = %e, "Cannot serialize webhook payload");
                }
            }
        }
    }

    /// Fetch, redact and store one image. Shared by the batch loop and the
    /// synchronous storage route.
    pub async fn process_single(
        &self,
        request: &RedactStorageRequest,
        context: ItemContext,
    ) -> RedactResult<ItemResult> {
        request.validate()?;
        self.pipeline.check_regions(&request.regions)?;

        let derived_key = derive_idempotency_key(request)?;
        if let Some(result) = self.find_previous_run(request, &derived_key).await? {
            tracing::info!(output = %request.output, "Output already present, skipping");
            return Ok(result);
        }

        let source = self
            .storage
            .get(&request.input.bucket, &request.input.key)
            .await?;
        let declared_type = content_type_for_key(&request.input.key);

        let processed = self.run_pipeline(source, declared_type, request).await?;

        let idempotency_key = request.idempotency_key.clone().unwrap_or(derived_key);
        let mut metadata = ObjectMetadata::new();
        metadata.insert(META_CONTENT_HASH.into(), processed.content_hash.clone());
        metadata.insert(META_DURATION.into(), processed.processing_duration_ms.to_string());
        metadata.insert(META_IDEMPOTENCY_KEY.into(), idempotency_key);
        metadata.insert(META_WIDTH.into(), processed.width.to_string());
        metadata.insert(META_HEIGHT.into(), processed.height.to_string());
        if let Some(job_id) = context.job_id {
            metadata.insert(META_JOB_ID.into(), job_id.to_string());
        }
        if let Some(item_id) = context.item_id {
            metadata.insert(META_ITEM_ID.into(), item_id.to_string());
        }

        let size_bytes = processed.buffer.len() as u64;
        self.storage
            .put(
                &request.output.bucket,
                &request.output.key,
                Bytes::from(processed.buffer),
                processed.format.content_type(),
                &metadata,
            )
            .await?;

        Ok(ItemResult {
            output: request.output.clone(),
            content_hash: processed.content_hash,
            width: processed.width,
            height: processed.height,
            format: processed.format,
            size_bytes,
            processing_time_ms: processed.processing_duration_ms,
            skipped: false,
        })
    }

    /// An explicit key skips whenever the output exists. A derived key only
    /// skips when the existing output was written under that same key.
    async fn find_previous_run(
        &self,
        request: &RedactStorageRequest,
        derived_key: &str,
    ) -> RedactResult<Option<ItemResult>> {
        let Some(head) = self
            .storage
            .head(&request.output.bucket, &request.output.key)
            .await?
        else {
            return Ok(None);
        };

        let stored_key = head.metadata.get(META_IDEMPOTENCY_KEY).map(String::as_str);
        let matches = match request.idempotency_key.as_deref() {
            Some(_) => true,
            None => stored_key == Some(derived_key),
        };
        if !matches {
            return Ok(None);
        }

        let number = |name: &str| {
            head.metadata
                .get(name)
                .and_then(|v| v.parse::<u32>().ok())
                .unwrap_or(0)
        };

        Ok(Some(ItemResult {
            output: request.output.clone(),
            content_hash: head
                .metadata
                .get(META_CONTENT_HASH)
                .cloned()
                .unwrap_or_default(),
            width: number(META_WIDTH),
            height: number(META_HEIGHT),
            format: request
                .format
                .unwrap_or(self.pipeline.limits().default_format),
            size_bytes: head.content_length.unwrap_or(0),
            processing_time_ms: 0,
            skipped: true,
        }))
    }

    async fn run_pipeline(
        &self,
        source: Bytes,
        declared_type: Option<&'static str>,
        request: &RedactStorageRequest,
    ) -> RedactResult<ProcessedImage> {
        let pipeline = self.pipeline.clone();
        let regions = request.regions.clone();
        let format = request.format;
        let quality = request.quality;

        tokio::task::spawn_blocking(move || {
            pipeline.run(&RedactionInput {
                source: &source,
                declared_type,
                regions: &regions,
                format,
                quality,
            })
        })
        .await
        .map_err(|e| RedactError::internal(format!("pipeline task failed: {e}")))?
    }
}

/// SHA-256 over the canonical JSON of the fields that determine the output.
/// `serde_json::Value` objects keep keys sorted, so field order in the
/// request does not matter.
pub fn derive_idempotency_key(request: &RedactStorageRequest) -> RedactResult<String> {
    let canonical = serde_json::json!({
        "input": request.input,
        "output": request.output,
        "regions": request.regions,
        "format": request.format,
        "quality": request.quality,
    });
    let encoded = serde_json::to_vec(&canonical)
        .map_err(|e| RedactError::internal(format!("cannot encode idempotency key: {e}")))?;
    Ok(hex::encode(Sha256::digest(encoded)))
}

/// Content type implied by an object key's extension, used to cross-check
/// the sniffed format.
fn content_type_for_key(key: &str) -> Option<&'static str> {
    let extension = key.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
