use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub job_store: JobStoreHealth,
}

#[derive(Serialize)]
pub struct JobStoreHealth {
    pub status: String,
    pub jobs: usize,
}

/// GET /health: liveness plus job store occupancy.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            job_store: JobStoreHealth {
                status: "ok".to_string(),
                jobs: state.jobs.len(),
            },
        },
    };

    (StatusCode::OK, Json(response))
}
