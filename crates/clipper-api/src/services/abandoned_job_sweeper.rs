//! Background service for reclaiming abandoned jobs and scratch space.
//!
//! Each tick it:
//! - force-cancels jobs that outlived the long-stop deadline
//! - removes scratch directories that no live job owns

use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use clipper_media::ClipOrchestrator;

/// Abandoned job sweeper service.
pub struct AbandonedJobSweeper {
    orchestrator: ClipOrchestrator,
    interval: Duration,
    enabled: bool,
}

impl AbandonedJobSweeper {
    pub fn new(orchestrator: ClipOrchestrator) -> Self {
        let enabled = orchestrator.config().sweep_enabled;
        let interval = orchestrator.config().sweep_interval;

        Self {
            orchestrator,
            interval,
            enabled,
        }
    }

    /// Start the background sweep loop.
    ///
    /// Runs until the task is dropped; spawn it.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Abandoned job sweep is disabled");
            return;
        }

        info!("Starting abandoned job sweeper (interval: {:?})", self.interval);

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(e) = self.check_once().await {
                error!("Abandoned job sweep error: {}", e);
            }
        }
    }

    /// Run a single sweep. Returns `(abandoned jobs, orphaned scratch dirs)`.
    pub async fn check_once(&self) -> anyhow::Result<(usize, usize)> {
        let abandoned = self.orchestrator.cancel_abandoned();
        for job_id in &abandoned {
            warn!(job_id = %job_id, "Force-canceled job past its long-stop deadline");
        }

        let removed = self.orchestrator.remove_orphaned_scratch().await?;
        if removed > 0 {
            info!("Removed {} orphaned scratch directories", removed);
        }

        Ok((abandoned.len(), removed))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use clipper_media::ClipConfig;

    fn orchestrator(scratch: &std::path::Path, configure: impl FnOnce(&mut ClipConfig)) -> ClipOrchestrator {
        let mut config = ClipConfig {
            transcoder_path: "/bin/sh".into(),
            scratch_dir: scratch.to_path_buf(),
            ..Default::default()
        };
        configure(&mut config);
        ClipOrchestrator::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_sweeper_returns_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let sweeper = AbandonedJobSweeper::new(orchestrator(dir.path(), |c| c.sweep_enabled = false));

        tokio::time::timeout(Duration::from_secs(1), sweeper.run())
            .await
            .expect("disabled sweeper kept running");
    }

    #[tokio::test]
    async fn test_check_once_removes_orphaned_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let orphan = dir.path().join("clip-gone-123");
        std::fs::create_dir(&orphan).unwrap();

        let sweeper = AbandonedJobSweeper::new(orchestrator(dir.path(), |c| c.abandon_after = Duration::ZERO));
        let (abandoned, removed) = sweeper.check_once().await.unwrap();

        assert_eq!(abandoned, 0);
        assert_eq!(removed, 1);
        assert!(!orphan.exists());
    }
}
