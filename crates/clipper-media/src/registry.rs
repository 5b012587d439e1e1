//! Registry of in-flight jobs.
//!
//! Holds each live job's state and cancellation token so jobs can be
//! listed, canceled by id, canceled in bulk on shutdown, and force-canceled
//! by the abandonment sweep once they outlive their long-stop deadline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use clipper_models::{ClipSource, JobId, JobState, OutputFormat};

use crate::job::ClipJob;
use crate::metrics;

/// Point-in-time view of a live job.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub source: String,
    pub format: OutputFormat,
    pub state: JobState,
    pub admitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the transcoder will be killed for overrunning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scratch_path: Option<PathBuf>,
    pub elapsed_ms: u64,
    pub abandoned: bool,
}

#[derive(Debug)]
struct JobEntry {
    source: String,
    format: OutputFormat,
    state: JobState,
    admitted_at: DateTime<Utc>,
    admitted_instant: Instant,
    started_at: Option<DateTime<Utc>>,
    deadline_at: Option<DateTime<Utc>>,
    scratch_path: Option<PathBuf>,
    long_stop: Instant,
    cancel: CancellationToken,
    abandoned: bool,
}

#[derive(Debug)]
struct RegistryInner {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    abandon_after: Duration,
}

/// Shared, cloneable handle to the job table.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl JobRegistry {
    pub fn new(abandon_after: Duration) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                jobs: RwLock::new(HashMap::new()),
                running: AtomicUsize::new(0),
                peak_running: AtomicUsize::new(0),
                abandon_after,
            }),
        }
    }

    /// Add a job. It stays listed until the returned guard is dropped.
    pub fn register(&self, job: &ClipJob, cancel: CancellationToken) -> Registration {
        let now = Instant::now();
        let entry = JobEntry {
            source: display_source(job.request().source()),
            format: job.request().format(),
            state: job.state(),
            admitted_at: Utc::now(),
            admitted_instant: now,
            started_at: job.started_at(),
            deadline_at: job.deadline().map(wall_clock),
            scratch_path: job.scratch_path().map(PathBuf::from),
            long_stop: now + self.inner.abandon_after,
            cancel,
            abandoned: false,
        };
        self.write_jobs().insert(job.id().clone(), entry);

        Registration {
            registry: self.clone(),
            job_id: job.id().clone(),
        }
    }

    /// Mirror a job's current state, deadline and scratch area.
    pub fn record_job(&self, job: &ClipJob) {
        let mut jobs = self.write_jobs();
        let Some(entry) = jobs.get_mut(job.id()) else {
            return;
        };
        let from = entry.state;
        let to = job.state();
        entry.state = to;
        entry.started_at = job.started_at();
        entry.deadline_at = job.deadline().map(wall_clock);
        entry.scratch_path = job.scratch_path().map(PathBuf::from);

        if to == JobState::Running && from != JobState::Running {
            let running = self.inner.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.inner.peak_running.fetch_max(running, Ordering::SeqCst);
            metrics::set_jobs_running(running);
        } else if from == JobState::Running && to != JobState::Running {
            let running = self.inner.running.fetch_sub(1, Ordering::SeqCst) - 1;
            metrics::set_jobs_running(running);
        }
    }

    /// Cancel a live job. Returns `false` if no such job is registered.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match self.read_jobs().get(job_id) {
            Some(entry) => {
                entry.cancel.cancel();
                debug!(job_id = %job_id, "Job cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every live job. Returns how many were signaled.
    pub fn cancel_all(&self) -> usize {
        let jobs = self.read_jobs();
        for entry in jobs.values() {
            entry.cancel.cancel();
        }
        jobs.len()
    }

    /// Cancel jobs still alive past their long-stop deadline.
    pub fn cancel_overdue(&self, now: Instant) -> Vec<JobId> {
        let mut overdue = Vec::new();
        let mut jobs = self.write_jobs();
        for (job_id, entry) in jobs.iter_mut() {
            if entry.abandoned || entry.state.is_terminal() || entry.long_stop > now {
                continue;
            }
            entry.abandoned = true;
            entry.cancel.cancel();
            metrics::record_abandoned_job();
            warn!(
                job_id = %job_id,
                state = %entry.state,
                age_secs = now.duration_since(entry.admitted_instant).as_secs(),
                "Force-canceling abandoned job"
            );
            overdue.push(job_id.clone());
        }
        overdue
    }

    /// Whether the sweep canceled this job.
    pub fn was_abandoned(&self, job_id: &JobId) -> bool {
        self.read_jobs().get(job_id).is_some_and(|e| e.abandoned)
    }

    pub fn state(&self, job_id: &JobId) -> Option<JobState> {
        self.read_jobs().get(job_id).map(|e| e.state)
    }

    /// Snapshot of all live jobs, oldest first.
    pub fn snapshot(&self) -> Vec<JobSnapshot> {
        let now = Instant::now();
        let mut jobs: Vec<JobSnapshot> = self
            .read_jobs()
            .iter()
            .map(|(job_id, entry)| JobSnapshot {
                job_id: job_id.clone(),
                source: entry.source.clone(),
                format: entry.format,
                state: entry.state,
                admitted_at: entry.admitted_at,
                started_at: entry.started_at,
                deadline_at: entry.deadline_at,
                scratch_path: entry.scratch_path.clone(),
                elapsed_ms: now.duration_since(entry.admitted_instant).as_millis() as u64,
                abandoned: entry.abandoned,
            })
            .collect();
        jobs.sort_by_key(|j| j.admitted_at);
        jobs
    }

    /// Jobs whose transcoder is currently alive.
    pub fn running(&self) -> usize {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Highest value `running()` has reached.
    pub fn peak_running(&self) -> usize {
        self.inner.peak_running.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.read_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, job_id: &JobId) {
        let removed = self.write_jobs().remove(job_id);
        if let Some(entry) = removed {
            if entry.state == JobState::Running {
                let running = self.inner.running.fetch_sub(1, Ordering::SeqCst) - 1;
                metrics::set_jobs_running(running);
            }
        }
    }

    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.inner.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.inner.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn wall_clock(deadline: Instant) -> DateTime<Utc> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    Utc::now() + chrono::Duration::from_std(remaining).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Query strings may carry credentials; keep them out of listings.
fn display_source(source: &ClipSource) -> String {
    match source {
        ClipSource::Local(path) => path.display().to_string(),
        ClipSource::Remote(url) => {
            let mut url = url.clone();
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        }
    }
}

/// Keeps a job listed in the registry; removes it on drop.
#[derive(Debug)]
pub struct Registration {
    registry: JobRegistry,
    job_id: JobId,
}

impl Registration {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.remove(&self.job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipper_models::{validate, RawClipRequest, ValidationLimits};

    fn job(source: &str) -> ClipJob {
        let request = validate(&RawClipRequest::new(source, 0.0, 3.0, "mp4"), &ValidationLimits::default()).unwrap();
        ClipJob::new(request)
    }

    #[test]
    fn test_register_and_drop() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let job = job("valid.mp4");
        let registration = registry.register(&job, CancellationToken::new());

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.state(job.id()), Some(JobState::Pending));
        drop(registration);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_running_count_and_peak() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let mut a = job("a.mp4");
        let mut b = job("b.mp4");
        let _ra = registry.register(&a, CancellationToken::new());
        let rb = registry.register(&b, CancellationToken::new());

        a.transition(JobState::Running).unwrap();
        registry.record_job(&a);
        b.transition(JobState::Running).unwrap();
        registry.record_job(&b);
        assert_eq!(registry.running(), 2);

        a.transition(JobState::Completed).unwrap();
        registry.record_job(&a);
        assert_eq!(registry.running(), 1);

        // Dropping a registration mid-run still releases the count
        drop(rb);
        assert_eq!(registry.running(), 0);
        assert_eq!(registry.peak_running(), 2);
    }

    #[tokio::test]
    async fn test_snapshot_reports_deadline_and_scratch() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let mut job = job("valid.mp4");
        let _registration = registry.register(&job, CancellationToken::new());
        assert!(registry.snapshot()[0].deadline_at.is_none());

        job.attach_scratch("/tmp/clipper/clip-abc");
        job.arm_deadline(Duration::from_secs(90));
        job.transition(JobState::Running).unwrap();
        registry.record_job(&job);

        let snapshot = &registry.snapshot()[0];
        assert_eq!(snapshot.state, JobState::Running);
        assert_eq!(snapshot.scratch_path.as_deref(), Some(std::path::Path::new("/tmp/clipper/clip-abc")));
        let deadline_at = snapshot.deadline_at.unwrap();
        assert!(deadline_at > Utc::now() + chrono::Duration::seconds(80));
        assert!(snapshot.started_at.is_some());
    }

    #[test]
    fn test_cancel_by_id() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let job = job("valid.mp4");
        let token = CancellationToken::new();
        let _registration = registry.register(&job, token.clone());

        assert!(registry.cancel(job.id()));
        assert!(token.is_cancelled());
        assert!(!registry.cancel(&JobId::from_string("missing")));
    }

    #[tokio::test]
    async fn test_cancel_overdue_marks_abandoned() {
        let registry = JobRegistry::new(Duration::from_millis(10));
        let job = job("valid.mp4");
        let token = CancellationToken::new();
        let _registration = registry.register(&job, token.clone());

        assert!(registry.cancel_overdue(Instant::now()).is_empty());
        tokio::time::sleep(Duration::from_millis(20)).await;

        let overdue = registry.cancel_overdue(Instant::now());
        assert_eq!(overdue, vec![job.id().clone()]);
        assert!(token.is_cancelled());
        assert!(registry.was_abandoned(job.id()));

        // Already handled
        assert!(registry.cancel_overdue(Instant::now()).is_empty());
    }

    #[test]
    fn test_snapshot_hides_query() {
        let registry = JobRegistry::new(Duration::from_secs(60));
        let job = job("https://cdn.example.com/v.mp4?token=secret");
        let _registration = registry.register(&job, CancellationToken::new());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].source, "https://cdn.example.com/v.mp4");
    }
}
