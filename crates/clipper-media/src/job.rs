//! A clip job and its state machine.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use clipper_models::{ClipRequest, InvalidTransition, JobId, JobState};

/// One clip request's journey from admission to a terminal state.
#[derive(Debug, Clone)]
pub struct ClipJob {
    id: JobId,
    request: ClipRequest,
    state: JobState,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    /// Wall-clock limit on the transcoder, set at launch
    deadline: Option<Instant>,
    /// Scratch area owned by this job, once allocated
    scratch_path: Option<PathBuf>,
}

impl ClipJob {
    pub fn new(request: ClipRequest) -> Self {
        Self::with_id(JobId::new(), request)
    }

    pub fn with_id(id: JobId, request: ClipRequest) -> Self {
        Self {
            id,
            request,
            state: JobState::Pending,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            deadline: None,
            scratch_path: None,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn request(&self) -> &ClipRequest {
        &self.request
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Start the deadline clock: the transcoder must finish within `budget`.
    pub fn arm_deadline(&mut self, budget: Duration) -> Instant {
        let deadline = Instant::now() + budget;
        self.deadline = Some(deadline);
        deadline
    }

    pub fn scratch_path(&self) -> Option<&Path> {
        self.scratch_path.as_deref()
    }

    /// Record the scratch area allocated to this job.
    pub fn attach_scratch(&mut self, path: impl Into<PathBuf>) {
        self.scratch_path = Some(path.into());
    }

    /// Move to `next`, returning the previous state.
    ///
    /// Only forward transitions are accepted; a terminal job never changes
    /// state again.
    pub fn transition(&mut self, next: JobState) -> Result<JobState, InvalidTransition> {
        let from = self.state;
        if !from.can_transition_to(next) {
            return Err(InvalidTransition { from, to: next });
        }

        let now = Utc::now();
        if next == JobState::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        self.state = next;
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipper_models::{validate, RawClipRequest, ValidationLimits};

    fn job() -> ClipJob {
        let request = validate(&RawClipRequest::new("valid.mp4", 0.0, 3.0, "mp4"), &ValidationLimits::default()).unwrap();
        ClipJob::new(request)
    }

    #[test]
    fn test_lifecycle_timestamps() {
        let mut job = job();
        assert_eq!(job.state(), JobState::Pending);
        assert!(job.started_at().is_none());

        assert_eq!(job.transition(JobState::Running).unwrap(), JobState::Pending);
        assert!(job.started_at().is_some());

        job.transition(JobState::Completed).unwrap();
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn test_terminal_state_is_final() {
        let mut job = job();
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::TimedOut).unwrap();

        let err = job.transition(JobState::Completed).unwrap_err();
        assert_eq!(err.from, JobState::TimedOut);
        assert_eq!(job.state(), JobState::TimedOut);
    }

    #[tokio::test]
    async fn test_deadline_and_scratch_are_recorded() {
        let mut job = job();
        assert!(job.deadline().is_none());
        assert!(job.scratch_path().is_none());

        job.attach_scratch("/tmp/clipper/clip-x");
        let before = Instant::now();
        let deadline = job.arm_deadline(Duration::from_secs(33));

        assert_eq!(job.deadline(), Some(deadline));
        assert!(deadline >= before + Duration::from_secs(33));
        assert_eq!(job.scratch_path(), Some(Path::new("/tmp/clipper/clip-x")));
    }

    #[test]
    fn test_pending_can_fail_without_running() {
        let mut job = job();
        job.transition(JobState::Failed).unwrap();
        assert!(job.started_at().is_none());
    }
}
