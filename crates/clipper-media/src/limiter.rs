//! Bounded admission for concurrent transcodes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use clipper_models::JobId;

use crate::metrics;

/// Capacity did not free up within the admission timeout.
#[derive(Debug, Clone, Copy, Error)]
#[error("All {capacity} transcode slots busy; waited {}ms", .waited.as_millis())]
pub struct Rejected {
    pub capacity: usize,
    pub waited: Duration,
}

/// Proof of admission. The slot is returned when this is dropped.
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
    waited: Duration,
}

impl Admission {
    /// Time spent queued before a slot was granted.
    pub fn waited(&self) -> Duration {
        self.waited
    }
}

/// Gate that lets at most `capacity` jobs hold a slot at once.
///
/// Waiters are served by the semaphore's queue; a waiter that does not get
/// a slot within the admission timeout is rejected rather than queued
/// indefinitely.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    admission_timeout: Duration,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize, admission_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            admission_timeout,
        }
    }

    /// Wait up to the admission timeout for a free slot.
    pub async fn admit(&self, job_id: &JobId) -> Result<Admission, Rejected> {
        let started = Instant::now();
        let acquired = tokio::time::timeout(
            self.admission_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await;

        let waited = started.elapsed();
        match acquired {
            Ok(Ok(permit)) => {
                metrics::record_admission_wait(waited.as_secs_f64());
                debug!(job_id = %job_id, waited_ms = waited.as_millis() as u64, "Job admitted");
                Ok(Admission {
                    _permit: permit,
                    waited,
                })
            }
            // Timed out, or the semaphore was closed
            Ok(Err(_)) | Err(_) => {
                metrics::record_admission_rejected();
                warn!(
                    job_id = %job_id,
                    capacity = self.capacity,
                    waited_ms = waited.as_millis() as u64,
                    "Admission rejected: no capacity"
                );
                Err(Rejected {
                    capacity: self.capacity,
                    waited,
                })
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }
}
