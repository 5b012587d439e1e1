//! Error types for orchestration operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for orchestration operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while preparing or running a transcode.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Transcoder not found: {0}")]
    TranscoderNotFound(String),

    #[error("Failed to launch transcoder: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to allocate scratch space under {path}: {source}")]
    ScratchAllocation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to release scratch space {path}: {source}")]
    ScratchRelease {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn scratch_allocation(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ScratchAllocation {
            path: path.into(),
            source,
        }
    }
}
