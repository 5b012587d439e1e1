//! Clip request types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::format::OutputFormat;

/// Request body as received, before any checks.
///
/// Fields are kept as loose JSON values so that a missing or mistyped
/// field is reported by the validator with a precise reason instead of a
/// generic deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawClipRequest {
    #[serde(default)]
    pub source: Option<Value>,
    #[serde(default)]
    pub start: Option<Value>,
    #[serde(default)]
    pub end: Option<Value>,
    #[serde(default)]
    pub format: Option<Value>,
}

impl RawClipRequest {
    /// Convenience constructor for well-typed input.
    pub fn new(source: &str, start: f64, end: f64, format: &str) -> Self {
        Self {
            source: Some(Value::from(source)),
            start: Some(Value::from(start)),
            end: Some(Value::from(end)),
            format: Some(Value::from(format)),
        }
    }
}

/// Where the media comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipSource {
    /// File on the local filesystem
    Local(PathBuf),
    /// Remote http(s) URI handed to the transcoder as-is
    Remote(Url),
}

impl ClipSource {
    /// Locator string passed to the transcoder.
    pub fn locator(&self) -> String {
        match self {
            ClipSource::Local(path) => path.to_string_lossy().to_string(),
            ClipSource::Remote(url) => url.to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, ClipSource::Local(_))
    }
}

impl fmt::Display for ClipSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.locator())
    }
}

/// A validated clip request. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipRequest {
    source: ClipSource,
    start: Duration,
    end: Duration,
    format: OutputFormat,
}

impl ClipRequest {
    /// Only the validator builds these; invariants are established there.
    pub(crate) fn new(source: ClipSource, start: Duration, end: Duration, format: OutputFormat) -> Self {
        debug_assert!(start < end);
        Self {
            source,
            start,
            end,
            format,
        }
    }

    pub fn source(&self) -> &ClipSource {
        &self.source
    }

    pub fn start(&self) -> Duration {
        self.start
    }

    pub fn end(&self) -> Duration {
        self.end
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Length of the requested segment.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}
