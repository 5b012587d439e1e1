//! Live job listing and cancellation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use clipper_media::JobSnapshot;
use clipper_models::JobId;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct JobsResponse {
    pub jobs: Vec<JobSnapshot>,
    pub running: usize,
    pub capacity: usize,
    pub available: usize,
}

/// `GET /jobs`
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    let orchestrator = &state.orchestrator;
    Json(JobsResponse {
        jobs: orchestrator.registry().snapshot(),
        running: orchestrator.registry().running(),
        capacity: orchestrator.limiter().capacity(),
        available: orchestrator.limiter().available(),
    })
}

/// `DELETE /jobs/{job_id}`
pub async fn cancel_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<StatusCode> {
    let job_id = JobId::from_string(job_id);
    if state.orchestrator.cancel(&job_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(format!("no live job {}", job_id)))
    }
}
