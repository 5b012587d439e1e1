//! Clip extraction handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::Response;
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use clipper_media::ClipJob;
use clipper_models::{validate, RawClipRequest};

use crate::delivery::deliver;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `POST /clip`: validate, admit, transcode and stream the result.
///
/// The job runs on its own task. If the caller disconnects this future is
/// dropped, the guard cancels the job and the orchestrator tears down the
/// transcoder and scratch space.
pub async fn create_clip(
    State(state): State<AppState>,
    payload: Result<Json<RawClipRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let production = state.config.is_production();
    run_clip(state, payload)
        .await
        .map_err(|e| e.redacted(production))
}

async fn run_clip(state: AppState, payload: Result<Json<RawClipRequest>, JsonRejection>) -> ApiResult<Response> {
    let Json(raw) = payload?;
    let request = validate(&raw, &state.config.limits)?;

    let job = ClipJob::new(request);
    let job_id = job.id().clone();
    debug!(job_id = %job_id, "Clip request validated");

    let admission = state
        .orchestrator
        .admit(&job)
        .await
        .map_err(|failure| ApiError::job(failure, &job_id))?;

    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let orchestrator = state.orchestrator.clone();
    let result = tokio::spawn(async move { orchestrator.execute(job, admission, cancel).await })
        .await
        .map_err(|e| ApiError::internal(format!("clip job task failed: {}", e)))?;

    deliver(result, &job_id).await
}
