//! Shared setup for the API and batch tests

#![allow(dead_code)]

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use image::{ImageFormat, Rgba, RgbaImage};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use region_redact::app_state::AppState;
use region_redact::models::job::{JobStatus, JobStatusView};
use region_redact::routes;
use region_redact::services::{
    job_store::{JobStore, JobStoreConfig},
    pipeline::{PipelineLimits, RedactionPipeline},
    storage::MemoryObjectStore,
    webhook::{HttpTransport, WebhookNotifier},
};

pub const INPUT_BUCKET: &str = "uploads";
pub const OUTPUT_BUCKET: &str = "redacted";

/// Everything a test needs to drive the service in-process.
pub struct TestApp {
    pub state: AppState,
    pub storage: Arc<MemoryObjectStore>,
    pub shutdown: CancellationToken,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_retry_delays(vec![Duration::from_millis(10); 3])
    }

    pub fn with_retry_delays(delays: Vec<Duration>) -> Self {
        Self::build(delays, None, PipelineLimits::default())
    }

    /// App whose jobs fall back to `url` when submitted without a webhook.
    pub fn with_default_webhook(url: String) -> Self {
        Self::build(vec![Duration::from_millis(10); 3], Some(url), PipelineLimits::default())
    }

    /// App with a small image payload cap, for body limit tests.
    pub fn with_payload_limit(max_payload_bytes: usize) -> Self {
        let limits = PipelineLimits {
            max_payload_bytes,
            ..Default::default()
        };
        Self::build(vec![Duration::from_millis(10); 3], None, limits)
    }

    fn build(
        delays: Vec<Duration>,
        default_webhook_url: Option<String>,
        limits: PipelineLimits,
    ) -> Self {
        let storage = Arc::new(MemoryObjectStore::new());
        storage.create_bucket(INPUT_BUCKET);
        storage.create_bucket(OUTPUT_BUCKET);

        let shutdown = CancellationToken::new();
        let transport =
            HttpTransport::new(Duration::from_secs(2)).expect("webhook client should build");
        let notifier = WebhookNotifier::new(Arc::new(transport), shutdown.clone())
            .with_retry_delays(delays);

        let state = AppState::new(
            RedactionPipeline::new(limits),
            storage.clone(),
            JobStore::new(JobStoreConfig::default()),
            notifier,
            default_webhook_url,
        )
        .with_batch_limits(5, 500);

        Self {
            state,
            storage,
            shutdown,
        }
    }

    pub fn router(&self) -> Router {
        routes::api_router(self.state.clone())
    }

    pub fn seed_png(&self, key: &str, width: u32, height: u32) {
        self.storage
            .insert(INPUT_BUCKET, key, png_bytes(width, height), "image/png");
    }

    /// Poll until the job reaches a terminal status.
    pub async fn wait_for_job(&self, job_id: Uuid) -> JobStatusView {
        for _ in 0..200 {
            if let Some(job) = self.state.jobs.get(job_id) {
                if job.status.is_terminal() {
                    return job.view();
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("job {job_id} did not finish in time");
    }
}

/// Opaque white image with a red square in the top-left quadrant.
pub fn sample_image(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if x < width / 2 && y < height / 2 {
            Rgba([220, 30, 30, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    sample_image(width, height)
        .write_to(&mut out, ImageFormat::Png)
        .expect("png encoding should succeed");
    out.into_inner()
}

/// Storage item JSON with a single opaque black fill.
pub fn storage_item(input_key: &str, output_key: &str) -> serde_json::Value {
    serde_json::json!({
        "input": { "bucket": INPUT_BUCKET, "key": input_key },
        "output": { "bucket": OUTPUT_BUCKET, "key": output_key },
        "regions": [fill_region(0, 0, 8, 8)]
    })
}

pub fn fill_region(x: u32, y: u32, width: u32, height: u32) -> serde_json::Value {
    serde_json::json!({
        "coordinates": { "type": "pixel", "x": x, "y": y, "width": width, "height": height },
        "operation": { "type": "fill", "color": "#000000" }
    })
}

pub fn assert_terminal(view: &JobStatusView, status: JobStatus) {
    assert_eq!(view.status, status, "unexpected job status: {view:?}");
}
