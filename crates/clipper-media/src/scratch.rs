//! Per-job scratch directories.
//!
//! Each job gets its own directory under the scratch root, named
//! `clip-<job id>-<random>`. The name is claimed with an exclusive
//! `mkdir`, so two jobs can never share one. A [`ScratchArea`] removes its
//! directory exactly once: on [`ScratchArea::release`] or, failing that,
//! when dropped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tracing::{debug, info, warn};

use clipper_models::JobId;

use crate::error::{MediaError, MediaResult};
use crate::metrics;

/// Directory name prefix for scratch areas.
pub const SCRATCH_PREFIX: &str = "clip-";

type LiveSet = Arc<Mutex<HashSet<PathBuf>>>;

/// Allocates scratch areas under a root directory and sweeps leftovers.
#[derive(Debug, Clone)]
pub struct ScratchManager {
    root: PathBuf,
    live: LiveSet,
}

impl ScratchManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            live: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of areas currently allocated and not yet released.
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Allocate a fresh, empty scratch area for a job.
    pub async fn allocate(&self, job_id: &JobId) -> MediaResult<ScratchArea> {
        let root = self.root.clone();
        let prefix = format!("{}{}-", SCRATCH_PREFIX, job_id);

        let dir = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&root)?;
            tempfile::Builder::new().prefix(&prefix).tempdir_in(&root)
        })
        .await
        .map_err(|e| MediaError::internal(format!("scratch allocation task failed: {}", e)))?
        .map_err(|e| MediaError::scratch_allocation(&self.root, e))?;

        let path = dir.path().to_path_buf();
        let count = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.insert(path.clone());
            live.len()
        };
        metrics::set_scratch_areas(count);
        debug!(path = %path.display(), "Allocated scratch area");

        Ok(ScratchArea {
            dir: Some(dir),
            path,
            live: Arc::clone(&self.live),
        })
    }

    /// Remove scratch directories that no live area owns and that have not
    /// been modified for `older_than`.
    ///
    /// These are left behind only if the process died mid-job. Returns how
    /// many were removed.
    pub async fn sweep_orphans(&self, older_than: Duration) -> MediaResult<usize> {
        let root = self.root.clone();
        let live = Arc::clone(&self.live);

        let removed = tokio::task::spawn_blocking(move || sweep_dir(&root, &live, older_than))
            .await
            .map_err(|e| MediaError::internal(format!("scratch sweep task failed: {}", e)))??;

        if removed > 0 {
            info!(removed, "Removed orphaned scratch areas");
            metrics::record_orphan_scratch_removed(removed);
        }
        Ok(removed)
    }
}

fn sweep_dir(root: &Path, live: &LiveSet, older_than: Duration) -> MediaResult<usize> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_scratch = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(SCRATCH_PREFIX));
        if !is_scratch || !entry.file_type().is_ok_and(|t| t.is_dir()) {
            continue;
        }
        if live.lock().unwrap_or_else(PoisonError::into_inner).contains(&path) {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < older_than {
            continue;
        }

        match std::fs::remove_dir_all(&path) {
            Ok(()) => removed += 1,
            Err(e) => warn!(path = %path.display(), "Failed to remove orphaned scratch area: {}", e),
        }
    }
    Ok(removed)
}

/// A job's private scratch directory.
#[derive(Debug)]
pub struct ScratchArea {
    dir: Option<TempDir>,
    path: PathBuf,
    live: LiveSet,
}

impl ScratchArea {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of a file inside the area.
    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Remove the directory and everything in it.
    pub async fn release(mut self) -> MediaResult<()> {
        let Some(dir) = self.dir.take() else {
            return Ok(());
        };
        let path = self.path.clone();

        let result = tokio::task::spawn_blocking(move || dir.close())
            .await
            .map_err(|e| MediaError::internal(format!("scratch release task failed: {}", e)))?;
        self.unregister();

        result.map_err(|source| MediaError::ScratchRelease { path, source })
    }

    fn unregister(&self) {
        let count = {
            let mut live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
            live.remove(&self.path);
            live.len()
        };
        metrics::set_scratch_areas(count);
        debug!(path = %self.path.display(), "Released scratch area");
    }
}

impl Drop for ScratchArea {
    fn drop(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        self.unregister();

        let path = self.path.clone();
        let remove = move || {
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), "Failed to remove scratch area: {}", e);
            }
        };
        // Keep recursive deletion off the async workers
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_allocate_and_release() {
        let root = tempfile::tempdir().unwrap();
        let manager = ScratchManager::new(root.path().join("scratch"));
        let job_id = JobId::from_string("job-1");

        let area = manager.allocate(&job_id).await.unwrap();
        let path = area.path().to_path_buf();
        assert!(path.is_dir());
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("clip-job-1-"));
        assert_eq!(manager.live_count(), 1);

        std::fs::write(area.file("out.mp4"), b"data").unwrap();
        area.release().await.unwrap();
        assert!(!path.exists());
        assert_eq!(manager.live_count(), 0);
    }

    #[tokio::test]
    async fn test_same_job_id_gets_distinct_areas() {
        let root = tempfile::tempdir().unwrap();
        let manager = ScratchManager::new(root.path());
        let job_id = JobId::from_string("dup");

        let a = manager.allocate(&job_id).await.unwrap();
        let b = manager.allocate(&job_id).await.unwrap();
        assert_ne!(a.path(), b.path());
    }

    #[tokio::test]
    async fn test_drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let manager = ScratchManager::new(root.path());

        let area = manager.allocate(&JobId::new()).await.unwrap();
        let path = area.path().to_path_buf();
        drop(area);

        assert_eq!(manager.live_count(), 0);
        for _ in 0..200 {
            if !path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_outside_runtime_removes_inline() {
        let root = tempfile::tempdir().unwrap();
        let manager = ScratchManager::new(root.path());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let area = runtime.block_on(manager.allocate(&JobId::new())).unwrap();
        drop(runtime);

        let path = area.path().to_path_buf();
        drop(area);
        assert!(!path.exists());
        assert_eq!(manager.live_count(), 0);
    }

    #[tokio::test]
    async fn test_allocation_failure_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let blocker = root.path().join("not-a-dir");
        std::fs::write(&blocker, b"").unwrap();

        let manager = ScratchManager::new(&blocker);
        let err = manager.allocate(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, MediaError::ScratchAllocation { .. }));
    }

    #[tokio::test]
    async fn test_sweep_skips_live_and_foreign_dirs() {
        let root = tempfile::tempdir().unwrap();
        let manager = ScratchManager::new(root.path());

        let live = manager.allocate(&JobId::new()).await.unwrap();
        let orphan = root.path().join("clip-orphan-xyz");
        let foreign = root.path().join("unrelated");
        std::fs::create_dir(&orphan).unwrap();
        std::fs::create_dir(&foreign).unwrap();

        let removed = manager.sweep_orphans(Duration::ZERO).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!orphan.exists());
        assert!(foreign.exists());
        assert!(live.path().exists());
    }
}
