pub mod health;
pub mod jobs;
pub mod metrics;
pub mod redact;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::app_state::AppState;

/// Room for multipart boundaries and the `regions` part on top of the image.
const ENVELOPE_BYTES: usize = 1024 * 1024;

/// Health and API routes. `/metrics` is mounted separately in `main`
/// because it carries its own state.
pub fn api_router(state: AppState) -> Router {
    let body_limit = state.pipeline.limits().max_payload_bytes + ENVELOPE_BYTES;

    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/redact", post(redact::redact_inline))
        .route("/api/v1/redact/storage", post(redact::redact_storage))
        .route("/api/v1/batch", post(jobs::submit_batch))
        .route("/api/v1/jobs/{job_id}", get(jobs::get_job_status))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
