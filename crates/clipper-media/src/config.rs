//! Orchestration configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Settings for admission, deadlines, scratch space and the transcoder.
#[derive(Debug, Clone)]
pub struct ClipConfig {
    /// Maximum jobs admitted at once
    pub max_concurrent_jobs: usize,
    /// How long a request may wait for capacity
    pub admission_timeout: Duration,
    /// Added to the clip duration to form the job deadline
    pub job_timeout_overhead: Duration,
    /// Long-stop after admission; the sweep cancels jobs still alive past it
    pub abandon_after: Duration,
    /// Whether the background sweep runs at all
    pub sweep_enabled: bool,
    /// How often the background sweep runs
    pub sweep_interval: Duration,
    /// Bound on waiting for a killed subprocess to be reaped
    pub kill_grace: Duration,
    /// Transcoder executable (bare names resolve through PATH)
    pub transcoder_path: PathBuf,
    /// Arguments placed before the derived ones
    pub transcoder_global_args: Vec<String>,
    /// Root of per-job scratch areas
    pub scratch_dir: PathBuf,
    /// Bytes of stderr tail kept for diagnostics
    pub stderr_excerpt_bytes: usize,
}

impl Default for ClipConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            admission_timeout: Duration::from_secs(10),
            job_timeout_overhead: Duration::from_secs(30),
            abandon_after: Duration::from_secs(900), // 15 minutes
            sweep_enabled: true,
            sweep_interval: Duration::from_secs(30),
            kill_grace: Duration::from_millis(2000),
            transcoder_path: PathBuf::from("ffmpeg"),
            transcoder_global_args: Vec::new(),
            scratch_dir: std::env::temp_dir().join("clipper"),
            stderr_excerpt_bytes: 2048,
        }
    }
}

impl ClipConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("MAX_CONCURRENT_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            admission_timeout: Duration::from_secs(
                std::env::var("ADMISSION_TIMEOUT_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            job_timeout_overhead: Duration::from_secs(
                std::env::var("JOB_TIMEOUT_OVERHEAD_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            abandon_after: Duration::from_secs(
                std::env::var("JOB_ABANDON_AFTER_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(900),
            ),
            sweep_enabled: parse_flag(
                std::env::var("ENABLE_ABANDONED_SWEEP").ok().as_deref(),
                defaults.sweep_enabled,
            ),
            sweep_interval: Duration::from_secs(
                std::env::var("SWEEP_INTERVAL_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n: &u64| *n > 0)
                    .unwrap_or(30),
            ),
            kill_grace: Duration::from_millis(
                std::env::var("KILL_GRACE_MILLIS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2000),
            ),
            transcoder_path: std::env::var("TRANSCODER_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.transcoder_path),
            transcoder_global_args: std::env::var("TRANSCODER_GLOBAL_ARGS")
                .map(|s| s.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            scratch_dir: std::env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            stderr_excerpt_bytes: std::env::var("STDERR_EXCERPT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.stderr_excerpt_bytes),
        }
    }

    /// Deadline budget for a clip of the given length.
    pub fn job_deadline(&self, clip_duration: Duration) -> Duration {
        clip_duration + self.job_timeout_overhead
    }
}

/// `true`/`1`/`yes` and `false`/`0`/`no`; anything else keeps the default.
fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
        Some("true" | "1" | "yes") => true,
        Some("false" | "0" | "no") => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("TRUE"), false));
        assert!(!parse_flag(Some("0"), true));
        assert!(!parse_flag(Some(" no "), true));
        assert!(parse_flag(Some("maybe"), true));
        assert!(!parse_flag(None, false));
    }

    #[test]
    fn test_job_deadline_adds_overhead() {
        let config = ClipConfig {
            job_timeout_overhead: Duration::from_secs(30),
            ..Default::default()
        };
        assert_eq!(config.job_deadline(Duration::from_secs(3)), Duration::from_secs(33));
    }

    #[test]
    fn test_defaults_are_bounded() {
        let config = ClipConfig::default();
        assert!(config.max_concurrent_jobs > 0);
        assert!(config.abandon_after > config.job_timeout_overhead);
    }
}
