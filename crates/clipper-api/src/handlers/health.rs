//! Health check handlers.

use std::time::Instant;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use clipper_media::resolve_transcoder;
use clipper_models::JobId;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
    pub capacity: CapacitySnapshot,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub transcoder: CheckStatus,
    pub scratch: CheckStatus,
}

#[derive(Serialize)]
pub struct CapacitySnapshot {
    pub max_concurrent_jobs: usize,
    pub available: usize,
    pub running: usize,
    pub live_jobs: usize,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl CheckStatus {
    fn ok(latency_ms: u64) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            latency_ms: Some(latency_ms),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            latency_ms: None,
        }
    }

    fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Readiness check endpoint (readiness).
/// Checks that the transcoder resolves and the scratch root is writable.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let orchestrator = &state.orchestrator;

    let transcoder_check = {
        let start = Instant::now();
        match resolve_transcoder(orchestrator.transcoder()) {
            Ok(_) => CheckStatus::ok(start.elapsed().as_millis() as u64),
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    // Allocate and release a real scratch area
    let scratch_check = {
        let start = Instant::now();
        match orchestrator.scratch().allocate(&JobId::from_string("ready-check")).await {
            Ok(area) => match area.release().await {
                Ok(()) => CheckStatus::ok(start.elapsed().as_millis() as u64),
                Err(e) => CheckStatus::error(e.to_string()),
            },
            Err(e) => CheckStatus::error(e.to_string()),
        }
    };

    let all_ok = transcoder_check.is_ok() && scratch_check.is_ok();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks {
            transcoder: transcoder_check,
            scratch: scratch_check,
        },
        capacity: CapacitySnapshot {
            max_concurrent_jobs: orchestrator.limiter().capacity(),
            available: orchestrator.limiter().available(),
            running: orchestrator.registry().running(),
            live_jobs: orchestrator.registry().len(),
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
