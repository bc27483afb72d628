use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{RedactError, RedactResult};
use crate::models::job::JobStatusView;
use crate::models::redact::{BatchRequest, BatchSubmitResponse};

/// POST /api/v1/batch: queue storage redactions as one background job.
pub async fn submit_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> RedactResult<(StatusCode, Json<BatchSubmitResponse>)> {
    let Json(request) = payload?;
    if request.items.len() > state.max_batch_items {
        return Err(RedactError::limit(format!(
            "batch has {} items, limit is {}",
            request.items.len(),
            state.max_batch_items
        )));
    }
    request.validate()?;
    for item in &request.items {
        state.pipeline.check_regions(&item.regions)?;
    }

    let items_count = request.items.len();
    let job = state.jobs.create_job(request.items, request.webhook_url);
    state.orchestrator.submit(job.id);

    metrics::counter!("batch_jobs_submitted_total").increment(1);
    tracing::info!(job_id = %job.id, items_count, "Batch job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(BatchSubmitResponse {
            job_id: job.id,
            items_count,
            estimated_completion_ms: items_count as u64 * state.estimated_item_ms,
        }),
    ))
}

/// GET /api/v1/jobs/{job_id}: current snapshot of a batch job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> RedactResult<Json<JobStatusView>> {
    let job = state
        .jobs
        .get(job_id)
        .ok_or(RedactError::JobNotFound(job_id))?;
    Ok(Json(job.view()))
}
