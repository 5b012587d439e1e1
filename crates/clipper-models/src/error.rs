//! Error taxonomy shared by the orchestrator and the HTTP layer.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::job::JobState;

/// Stable, programmatic error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Validation failure; no subprocess was run
    InvalidRequest,
    /// No capacity within the admission timeout; retry later
    ResourceExhausted,
    /// Scratch allocation or source access failed
    SourceUnavailable,
    /// Transcoder exited nonzero or produced nothing
    TranscodeFailure,
    /// Deadline exceeded
    TimedOut,
    /// Canceled by the caller
    Canceled,
    /// Unexpected orchestrator failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::SourceUnavailable => "source_unavailable",
            ErrorKind::TranscodeFailure => "transcode_failure",
            ErrorKind::TimedOut => "timed_out",
            ErrorKind::Canceled => "canceled",
            ErrorKind::Internal => "internal",
        }
    }

    /// Terminal job state a failure of this kind leaves the job in.
    pub fn terminal_state(&self) -> JobState {
        match self {
            ErrorKind::TimedOut => JobState::TimedOut,
            ErrorKind::Canceled => JobState::Canceled,
            _ => JobState::Failed,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Structured failure of a clip job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Error)]
#[error("{kind}: {message}")]
pub struct JobFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Transcoder exit code, when it exited on its own
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Sanitized tail of the transcoder's stderr
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,
}

impl JobFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
            stderr_excerpt: None,
        }
    }

    pub fn resource_exhausted(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ResourceExhausted, message)
    }

    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SourceUnavailable, message)
    }

    pub fn transcode_failure(
        message: impl Into<String>,
        exit_code: Option<i32>,
        stderr_excerpt: Option<String>,
    ) -> Self {
        Self {
            kind: ErrorKind::TranscodeFailure,
            message: message.into(),
            exit_code,
            stderr_excerpt,
        }
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TimedOut, message)
    }

    pub fn canceled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Canceled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ResourceExhausted).unwrap();
        assert_eq!(json, "\"resource_exhausted\"");
    }

    #[test]
    fn test_terminal_state_mapping() {
        assert_eq!(ErrorKind::TimedOut.terminal_state(), JobState::TimedOut);
        assert_eq!(ErrorKind::Canceled.terminal_state(), JobState::Canceled);
        assert_eq!(ErrorKind::TranscodeFailure.terminal_state(), JobState::Failed);
        assert_eq!(ErrorKind::SourceUnavailable.terminal_state(), JobState::Failed);
    }

    #[test]
    fn test_failure_omits_empty_diagnostics() {
        let failure = JobFailure::canceled("client went away");
        let value = serde_json::to_value(&failure).unwrap();
        assert!(value.get("exit_code").is_none());
        assert_eq!(value["kind"], "canceled");
    }
}
