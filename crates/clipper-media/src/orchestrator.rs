//! Clip job orchestration.
//!
//! [`ClipOrchestrator::execute`] drives one admitted job through scratch
//! allocation, source checks, the transcoder run and output verification.
//! Every path out of it leaves the job in a terminal state with its
//! subprocess reaped; scratch space survives only inside a successful
//! [`ClipOutput`] and is removed when that output is dropped.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use clipper_models::{ClipSource, ErrorKind, JobFailure, JobId, JobState, OutputFormat};

use crate::command::{resolve_transcoder, TranscodeCommand};
use crate::config::ClipConfig;
use crate::error::MediaResult;
use crate::job::ClipJob;
use crate::limiter::{Admission, ConcurrencyLimiter};
use crate::logging::JobLogger;
use crate::metrics;
use crate::process::{race_terminal, Signal, TranscodeProcess, TranscoderProcess};
use crate::registry::JobRegistry;
use crate::scratch::{ScratchArea, ScratchManager};
use crate::stderr::{sanitize_excerpt, OutputTail};

/// Encoded clip waiting in its scratch area.
#[derive(Debug)]
pub struct ClipOutput {
    job_id: JobId,
    format: OutputFormat,
    path: PathBuf,
    len: u64,
    scratch: ScratchArea,
}

impl ClipOutput {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the finished file in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Split into the file path, its size and the scratch guard that owns it.
    pub fn into_parts(self) -> (PathBuf, u64, ScratchArea) {
        (self.path, self.len, self.scratch)
    }
}

/// Terminal outcome of a job.
#[derive(Debug)]
pub enum JobResult {
    Completed(ClipOutput),
    Failed(JobFailure),
}

impl JobResult {
    pub fn state(&self) -> JobState {
        match self {
            JobResult::Completed(_) => JobState::Completed,
            JobResult::Failed(failure) => failure.kind.terminal_state(),
        }
    }

    pub fn failure(&self) -> Option<&JobFailure> {
        match self {
            JobResult::Completed(_) => None,
            JobResult::Failed(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<ClipOutput, JobFailure> {
        match self {
            JobResult::Completed(output) => Ok(output),
            JobResult::Failed(failure) => Err(failure),
        }
    }
}

/// Runs clip jobs under the concurrency limit.
#[derive(Debug, Clone)]
pub struct ClipOrchestrator {
    config: Arc<ClipConfig>,
    transcoder: PathBuf,
    limiter: ConcurrencyLimiter,
    scratch: ScratchManager,
    registry: JobRegistry,
}

impl ClipOrchestrator {
    /// Build an orchestrator. Fails if the transcoder cannot be found.
    pub fn new(config: ClipConfig) -> MediaResult<Self> {
        let transcoder = resolve_transcoder(&config.transcoder_path)?;
        Ok(Self {
            transcoder,
            limiter: ConcurrencyLimiter::new(config.max_concurrent_jobs, config.admission_timeout),
            scratch: ScratchManager::new(&config.scratch_dir),
            registry: JobRegistry::new(config.abandon_after),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClipConfig {
        &self.config
    }

    pub fn transcoder(&self) -> &Path {
        &self.transcoder
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn scratch(&self) -> &ScratchManager {
        &self.scratch
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Wait for a free slot, or fail with `ResourceExhausted`.
    pub async fn admit(&self, job: &ClipJob) -> Result<Admission, JobFailure> {
        self.limiter.admit(job.id()).await.map_err(|rejected| {
            JobFailure::resource_exhausted(format!(
                "all {} transcode slots are busy; retry later",
                rejected.capacity
            ))
        })
    }

    /// Run an admitted job to a terminal state.
    ///
    /// The admission slot is held until this returns. Canceling `cancel`
    /// at any point terminates the transcoder and yields `Canceled`.
    pub async fn execute(&self, mut job: ClipJob, admission: Admission, cancel: CancellationToken) -> JobResult {
        let _admission = admission;
        let _registration = self.registry.register(&job, cancel.clone());
        let logger = JobLogger::new(job.id(), "clip");

        let origin = if job.request().source().is_local() { "local" } else { "remote" };
        logger.log_start(&format!(
            "{} source [{:.3}s, {:.3}s) as {}",
            origin,
            job.request().start().as_secs_f64(),
            job.request().end().as_secs_f64(),
            job.request().format(),
        ));

        let result = self
            .drive(&mut job, &cancel, &logger)
            .instrument(logger.create_span())
            .await;

        let state = result.state();
        metrics::record_job_finished(state, job.request().format().as_str());
        match &result {
            JobResult::Completed(output) => {
                logger.log_completion(&format!("{} bytes of {}", output.len(), output.format()))
            }
            JobResult::Failed(failure) if failure.kind == ErrorKind::Internal => {
                logger.log_error(&failure.to_string())
            }
            JobResult::Failed(failure) => logger.log_warning(&failure.to_string()),
        }

        result
    }

    async fn drive(&self, job: &mut ClipJob, cancel: &CancellationToken, logger: &JobLogger) -> JobResult {
        let scratch = match self.scratch.allocate(job.id()).await {
            Ok(scratch) => scratch,
            Err(e) => {
                logger.log_error(&e.to_string());
                return self.finish_failed(
                    job,
                    JobFailure::source_unavailable("could not allocate scratch space"),
                    logger,
                );
            }
        };

        job.attach_scratch(scratch.path());
        self.registry.record_job(job);

        if let Err(failure) = check_source(job.request().source()).await {
            self.release(scratch, logger).await;
            return self.finish_failed(job, failure, logger);
        }

        if cancel.is_cancelled() {
            self.release(scratch, logger).await;
            let failure = self.cancel_failure(job.id());
            return self.finish_failed(job, failure, logger);
        }

        self.run(job, scratch, cancel, logger).await
    }

    /// Launch the transcoder and race it against deadline and cancellation.
    async fn run(
        &self,
        job: &mut ClipJob,
        scratch: ScratchArea,
        cancel: &CancellationToken,
        logger: &JobLogger,
    ) -> JobResult {
        let format = job.request().format();
        let output_path = scratch.file(&format!("output.{}", format.extension()));
        let command = TranscodeCommand::for_request(
            &self.transcoder,
            &self.config.transcoder_global_args,
            job.request(),
            &output_path,
        );

        let mut process = match TranscoderProcess::spawn(&command, self.config.stderr_excerpt_bytes) {
            Ok(process) => process,
            Err(e) => {
                logger.log_error(&e.to_string());
                self.release(scratch, logger).await;
                return self.finish_failed(job, JobFailure::internal("failed to launch transcoder"), logger);
            }
        };

        let budget = self.config.job_deadline(job.request().duration());
        let started = Instant::now();
        let deadline = job.arm_deadline(budget);
        self.advance(job, JobState::Running, logger);
        logger.log_progress(&format!("transcoder running (pid {:?})", process.id()));

        let signal = race_terminal(&mut process, deadline, cancel).await;

        let exit = match signal {
            Signal::Exited(Ok(exit)) => Ok(exit),
            Signal::Exited(Err(e)) => Err(JobFailure::internal(format!("failed to wait for transcoder: {}", e))),
            Signal::Canceled => Err(self.cancel_failure(job.id())),
            Signal::DeadlineElapsed => Err(JobFailure::timed_out(format!(
                "transcode exceeded its {}s deadline",
                budget.as_secs()
            ))),
        };

        if exit.is_err() {
            if let Err(e) = process.terminate(self.config.kill_grace).await {
                logger.log_warning(&format!("transcoder termination: {}", e));
            }
        }
        let captured = process.collect_output(self.config.kill_grace).await;
        drop(process);
        let elapsed = started.elapsed();

        let produced = match exit {
            Ok(exit) if exit.success => match output_len(&output_path).await {
                Ok(len) if len > 0 => Ok(len),
                _ => Err(JobFailure::transcode_failure(
                    "transcoder exited successfully but produced no output",
                    exit.code,
                    self.excerpt(&captured.stderr, &scratch, job),
                )),
            },
            Ok(exit) => Err(JobFailure::transcode_failure(
                match exit.code {
                    Some(code) => format!("transcoder exited with status {}", code),
                    None => "transcoder was killed by a signal".to_string(),
                },
                exit.code,
                self.excerpt(&captured.stderr, &scratch, job),
            )),
            Err(failure) => Err(failure),
        };

        match produced {
            Ok(len) => {
                self.advance(job, JobState::Completed, logger);
                metrics::record_transcode_duration(JobState::Completed, elapsed.as_secs_f64());
                JobResult::Completed(ClipOutput {
                    job_id: job.id().clone(),
                    format,
                    path: output_path,
                    len,
                    scratch,
                })
            }
            Err(failure) => {
                self.release(scratch, logger).await;
                metrics::record_transcode_duration(failure.kind.terminal_state(), elapsed.as_secs_f64());
                self.finish_failed(job, failure, logger)
            }
        }
    }

    /// Cancel every live job.
    pub fn cancel_all(&self) -> usize {
        self.registry.cancel_all()
    }

    /// Cancel a live job by id.
    pub fn cancel(&self, job_id: &JobId) -> bool {
        self.registry.cancel(job_id)
    }

    /// Force-cancel jobs that outlived the long-stop deadline.
    pub fn cancel_abandoned(&self) -> Vec<JobId> {
        self.registry.cancel_overdue(Instant::now())
    }

    /// Remove scratch directories left behind by a previous process.
    pub async fn remove_orphaned_scratch(&self) -> MediaResult<usize> {
        self.scratch.sweep_orphans(self.config.abandon_after).await
    }

    fn cancel_failure(&self, job_id: &JobId) -> JobFailure {
        if self.registry.was_abandoned(job_id) {
            JobFailure::canceled("job exceeded its long-stop deadline and was abandoned")
        } else {
            JobFailure::canceled("job was canceled")
        }
    }

    fn finish_failed(&self, job: &mut ClipJob, failure: JobFailure, logger: &JobLogger) -> JobResult {
        self.advance(job, failure.kind.terminal_state(), logger);
        JobResult::Failed(failure)
    }

    fn advance(&self, job: &mut ClipJob, next: JobState, logger: &JobLogger) {
        match job.transition(next) {
            Ok(from) => {
                self.registry.record_job(job);
                logger.log_transition(from, next);
            }
            Err(e) => logger.log_error(&e.to_string()),
        }
    }

    async fn release(&self, scratch: ScratchArea, logger: &JobLogger) {
        if let Err(e) = scratch.release().await {
            logger.log_warning(&e.to_string());
        }
    }

    fn excerpt(&self, stderr: &OutputTail, scratch: &ScratchArea, job: &ClipJob) -> Option<String> {
        let scratch_path = scratch.path().to_string_lossy().to_string();
        let scratch_root = self.scratch.root().to_string_lossy().to_string();
        let source = job.request().source().locator();
        sanitize_excerpt(
            &stderr.to_bytes(),
            &[&scratch_path, &scratch_root, &source],
            self.config.stderr_excerpt_bytes,
        )
    }
}

/// Local sources must exist and be regular files before a transcoder is
/// launched. Remote sources are left to the transcoder.
async fn check_source(source: &ClipSource) -> Result<(), JobFailure> {
    let ClipSource::Local(path) = source else {
        return Ok(());
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(JobFailure::source_unavailable("source is not a regular file")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(JobFailure::source_unavailable("source not found")),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            Err(JobFailure::source_unavailable("source is not readable"))
        }
        Err(_) => Err(JobFailure::source_unavailable("source could not be accessed")),
    }
}

async fn output_len(path: &Path) -> io::Result<u64> {
    Ok(tokio::fs::metadata(path).await?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_result_state() {
        let failed = JobResult::Failed(JobFailure::timed_out("slow"));
        assert_eq!(failed.state(), JobState::TimedOut);
        assert!(failed.failure().is_some());

        let failed = JobResult::Failed(JobFailure::source_unavailable("gone"));
        assert_eq!(failed.state(), JobState::Failed);
        assert_eq!(failed.into_result().unwrap_err().kind, ErrorKind::SourceUnavailable);
    }

    #[test]
    fn test_missing_transcoder_fails_construction() {
        let config = ClipConfig {
            transcoder_path: PathBuf::from("/nonexistent/transcoder"),
            ..Default::default()
        };
        assert!(ClipOrchestrator::new(config).is_err());
    }

    #[tokio::test]
    async fn test_check_source() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("in.mp4");
        std::fs::write(&file, b"x").unwrap();

        assert!(check_source(&ClipSource::Local(file)).await.is_ok());
        let err = check_source(&ClipSource::Local(dir.path().join("missing.mp4")))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SourceUnavailable);
        assert!(check_source(&ClipSource::Local(dir.path().to_path_buf())).await.is_err());
    }
}
