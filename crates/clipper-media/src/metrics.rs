//! Metrics emitted by the orchestration core.
//!
//! Recording goes through the `metrics` facade; without an installed
//! recorder every call is a no-op.

use metrics::{counter, gauge, histogram};

use clipper_models::JobState;

/// Metric names as constants for consistency.
pub mod names {
    // Job lifecycle
    pub const JOBS_TOTAL: &str = "clipper_jobs_total";
    pub const JOBS_RUNNING: &str = "clipper_jobs_running";
    pub const TRANSCODE_DURATION_SECONDS: &str = "clipper_transcode_duration_seconds";
    pub const ABANDONED_JOBS_TOTAL: &str = "clipper_abandoned_jobs_total";

    // Admission
    pub const ADMISSION_REJECTED_TOTAL: &str = "clipper_admission_rejected_total";
    pub const ADMISSION_WAIT_SECONDS: &str = "clipper_admission_wait_seconds";

    // Scratch space
    pub const SCRATCH_AREAS: &str = "clipper_scratch_areas";
    pub const ORPHAN_SCRATCH_REMOVED_TOTAL: &str = "clipper_orphan_scratch_removed_total";
}

/// Record a job reaching a terminal state.
pub fn record_job_finished(state: JobState, format: &str) {
    let labels = [("state", state.as_str().to_string()), ("format", format.to_string())];
    counter!(names::JOBS_TOTAL, &labels).increment(1);
}

/// Record transcoder wall time.
pub fn record_transcode_duration(state: JobState, duration_secs: f64) {
    let labels = [("state", state.as_str().to_string())];
    histogram!(names::TRANSCODE_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn set_jobs_running(count: usize) {
    gauge!(names::JOBS_RUNNING).set(count as f64);
}

pub fn record_abandoned_job() {
    counter!(names::ABANDONED_JOBS_TOTAL).increment(1);
}

/// Record a request turned away for lack of capacity.
pub fn record_admission_rejected() {
    counter!(names::ADMISSION_REJECTED_TOTAL).increment(1);
}

pub fn record_admission_wait(wait_secs: f64) {
    histogram!(names::ADMISSION_WAIT_SECONDS).record(wait_secs);
}

pub fn set_scratch_areas(count: usize) {
    gauge!(names::SCRATCH_AREAS).set(count as f64);
}

pub fn record_orphan_scratch_removed(count: usize) {
    counter!(names::ORPHAN_SCRATCH_REMOVED_TOTAL).increment(count as u64);
}
