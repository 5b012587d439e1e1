//! Request validation.
//!
//! [`validate`] turns a [`RawClipRequest`] into a [`ClipRequest`] or the
//! first violation found. Checks run in a fixed order:
//!
//! 1. required fields present and correctly typed
//! 2. `start >= 0`
//! 3. `end > start`
//! 4. `end - start <= max_clip_duration`
//! 5. offsets within [`MAX_SOURCE_OFFSET_SECS`]
//! 6. `format` known and allowed
//! 7. `source` well-formed (non-empty, no traversal, supported scheme)
//!
//! The function has no side effects: it never touches the filesystem or
//! the network, so a syntactically valid local path may still turn out to
//! be missing when the job runs.

use std::collections::HashSet;
use std::path::{Component, PathBuf};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::format::OutputFormat;
use crate::request::{ClipRequest, ClipSource, RawClipRequest};

/// Maximum offset into a source (24 hours in seconds).
pub const MAX_SOURCE_OFFSET_SECS: f64 = 86400.0;

/// Maximum length of a source locator.
const MAX_SOURCE_LEN: usize = 4096;

/// Remote schemes handed to the transcoder unchanged.
const REMOTE_SCHEMES: &[&str] = &["http", "https"];

/// Static configuration the validator checks against.
#[derive(Debug, Clone)]
pub struct ValidationLimits {
    /// Longest clip that may be requested
    pub max_clip_duration: Duration,
    /// Formats accepted by this deployment
    pub allowed_formats: HashSet<OutputFormat>,
    /// When set, local sources must resolve inside this directory
    pub source_root: Option<PathBuf>,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_clip_duration: Duration::from_secs(600),
            allowed_formats: [OutputFormat::Mp4, OutputFormat::Webm, OutputFormat::Mp3]
                .into_iter()
                .collect(),
            source_root: None,
        }
    }
}

impl ValidationLimits {
    pub fn new(max_clip_duration: Duration, allowed_formats: HashSet<OutputFormat>) -> Self {
        Self {
            max_clip_duration,
            allowed_formats,
            source_root: None,
        }
    }

    pub fn with_source_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.source_root = Some(root.into());
        self
    }
}

/// Validation failure. Each variant has a stable reason code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Field '{field}' must be a {expected}")]
    InvalidType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("Start offset cannot be negative")]
    NegativeStart,

    #[error("End offset must be greater than start offset")]
    EndNotAfterStart,

    #[error("Requested clip of {requested:.3}s exceeds the maximum of {max:.3}s")]
    ClipTooLong { requested: f64, max: f64 },

    #[error("Offset '{0}' is out of range")]
    OffsetOutOfRange(&'static str),

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Source cannot be empty")]
    EmptySource,

    #[error("Invalid source: {0}")]
    InvalidSource(String),

    #[error("Source path must not contain parent directory references")]
    PathTraversal,

    #[error("Unsupported source scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Source path is outside the permitted source directory")]
    OutsideSourceRoot,
}

impl ValidationError {
    /// Stable reason code for programmatic handling.
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingField(_) => "missing_field",
            ValidationError::InvalidType { .. } => "invalid_type",
            ValidationError::NegativeStart => "negative_start",
            ValidationError::EndNotAfterStart => "end_not_after_start",
            ValidationError::ClipTooLong { .. } => "clip_too_long",
            ValidationError::OffsetOutOfRange(_) => "offset_out_of_range",
            ValidationError::UnsupportedFormat(_) => "unsupported_format",
            ValidationError::EmptySource => "empty_source",
            ValidationError::InvalidSource(_) => "invalid_source",
            ValidationError::PathTraversal => "path_traversal",
            ValidationError::UnsupportedScheme(_) => "unsupported_scheme",
            ValidationError::OutsideSourceRoot => "outside_source_root",
        }
    }
}

/// Validate a raw request against static limits.
pub fn validate(raw: &RawClipRequest, limits: &ValidationLimits) -> Result<ClipRequest, ValidationError> {
    let source = required_str(&raw.source, "source")?;
    let start = required_number(&raw.start, "start")?;
    let end = required_number(&raw.end, "end")?;
    let format = required_str(&raw.format, "format")?;

    if start < 0.0 {
        return Err(ValidationError::NegativeStart);
    }

    if end <= start {
        return Err(ValidationError::EndNotAfterStart);
    }

    let max = limits.max_clip_duration.as_secs_f64();
    if end - start > max {
        return Err(ValidationError::ClipTooLong {
            requested: end - start,
            max,
        });
    }

    if start > MAX_SOURCE_OFFSET_SECS {
        return Err(ValidationError::OffsetOutOfRange("start"));
    }
    if end > MAX_SOURCE_OFFSET_SECS {
        return Err(ValidationError::OffsetOutOfRange("end"));
    }
    let start = Duration::try_from_secs_f64(start).map_err(|_| ValidationError::OffsetOutOfRange("start"))?;
    let end = Duration::try_from_secs_f64(end).map_err(|_| ValidationError::OffsetOutOfRange("end"))?;
    if end <= start {
        // Sub-nanosecond spans collapse when converted
        return Err(ValidationError::EndNotAfterStart);
    }

    let format = format
        .parse::<OutputFormat>()
        .ok()
        .filter(|f| limits.allowed_formats.contains(f))
        .ok_or_else(|| ValidationError::UnsupportedFormat(format.to_string()))?;

    let source = parse_source(source, limits)?;

    Ok(ClipRequest::new(source, start, end, format))
}

fn required_str<'a>(value: &'a Option<Value>, field: &'static str) -> Result<&'a str, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ValidationError::InvalidType {
            field,
            expected: "string",
        }),
    }
}

fn required_number(value: &Option<Value>, field: &'static str) -> Result<f64, ValidationError> {
    match value {
        None | Some(Value::Null) => Err(ValidationError::MissingField(field)),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or(ValidationError::InvalidType {
                field,
                expected: "finite number",
            }),
        Some(_) => Err(ValidationError::InvalidType {
            field,
            expected: "number",
        }),
    }
}

fn parse_source(raw: &str, limits: &ValidationLimits) -> Result<ClipSource, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySource);
    }
    if trimmed.len() > MAX_SOURCE_LEN {
        return Err(ValidationError::InvalidSource(format!(
            "locator longer than {} bytes",
            MAX_SOURCE_LEN
        )));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(ValidationError::InvalidSource("contains control characters".to_string()));
    }

    if let Some((scheme, _)) = trimmed.split_once("://") {
        let scheme = scheme.to_ascii_lowercase();
        if REMOTE_SCHEMES.contains(&scheme.as_str()) {
            let url = Url::parse(trimmed).map_err(|e| ValidationError::InvalidSource(e.to_string()))?;
            if url.host_str().map_or(true, str::is_empty) {
                return Err(ValidationError::InvalidSource("URI has no host".to_string()));
            }
            return Ok(ClipSource::Remote(url));
        }
        if scheme == "file" {
            // Url::parse folds `..` away, so inspect the raw text first
            if has_traversal(trimmed) || trimmed.to_ascii_lowercase().contains("%2e%2e") {
                return Err(ValidationError::PathTraversal);
            }
            let url = Url::parse(trimmed).map_err(|e| ValidationError::InvalidSource(e.to_string()))?;
            let path = url
                .to_file_path()
                .map_err(|_| ValidationError::InvalidSource("not a local file URI".to_string()))?;
            return local_source(path, limits);
        }
        return Err(ValidationError::UnsupportedScheme(scheme));
    }

    if has_traversal(trimmed) {
        return Err(ValidationError::PathTraversal);
    }
    local_source(PathBuf::from(trimmed), limits)
}

fn has_traversal(s: &str) -> bool {
    s.split(['/', '\\']).any(|segment| segment == "..")
}

fn local_source(path: PathBuf, limits: &ValidationLimits) -> Result<ClipSource, ValidationError> {
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ValidationError::PathTraversal);
    }

    let Some(root) = limits.source_root.as_deref() else {
        return Ok(ClipSource::Local(path));
    };

    if path.is_relative() {
        return Ok(ClipSource::Local(root.join(path)));
    }
    if path.starts_with(root) {
        return Ok(ClipSource::Local(path));
    }
    Err(ValidationError::OutsideSourceRoot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits() -> ValidationLimits {
        ValidationLimits::default()
    }

    fn raw(value: serde_json::Value) -> RawClipRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_request() {
        let req = validate(&RawClipRequest::new("valid.mp4", 5.0, 8.0, "mp4"), &limits()).unwrap();
        assert_eq!(req.start(), Duration::from_secs(5));
        assert_eq!(req.end(), Duration::from_secs(8));
        assert_eq!(req.duration(), Duration::from_secs(3));
        assert_eq!(req.format(), OutputFormat::Mp4);
        assert_eq!(req.source(), &ClipSource::Local(PathBuf::from("valid.mp4")));
    }

    #[test]
    fn test_fractional_offsets() {
        let req = validate(&RawClipRequest::new("a.mp4", 1.25, 2.5, "webm"), &limits()).unwrap();
        assert_eq!(req.duration(), Duration::from_millis(1250));
    }

    #[test]
    fn test_missing_fields() {
        let err = validate(&raw(json!({"start": 1, "end": 2, "format": "mp4"})), &limits()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("source"));

        let err = validate(&raw(json!({"source": "a.mp4", "start": 1, "format": "mp4"})), &limits()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("end"));

        let err = validate(
            &raw(json!({"source": "a.mp4", "start": null, "end": 2, "format": "mp4"})),
            &limits(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "missing_field");
    }

    #[test]
    fn test_wrong_types() {
        let err = validate(
            &raw(json!({"source": "a.mp4", "start": "5", "end": 8, "format": "mp4"})),
            &limits(),
        )
        .unwrap_err();
        assert_eq!(err.reason(), "invalid_type");

        let err = validate(
            &raw(json!({"source": 42, "start": 5, "end": 8, "format": "mp4"})),
            &limits(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidType {
                field: "source",
                expected: "string"
            }
        );
    }

    #[test]
    fn test_negative_start() {
        let err = validate(&RawClipRequest::new("a.mp4", -1.0, 3.0, "mp4"), &limits()).unwrap_err();
        assert_eq!(err, ValidationError::NegativeStart);
    }

    #[test]
    fn test_end_not_after_start() {
        for (start, end) in [(5.0, 5.0), (8.0, 5.0), (0.0, 0.0), (3.0, -2.0)] {
            let err = validate(&RawClipRequest::new("a.mp4", start, end, "mp4"), &limits()).unwrap_err();
            assert_eq!(err, ValidationError::EndNotAfterStart, "start={start} end={end}");
        }
    }

    #[test]
    fn test_clip_too_long() {
        let limits = ValidationLimits::new(Duration::from_secs(10), limits().allowed_formats);
        let err = validate(&RawClipRequest::new("a.mp4", 0.0, 10.5, "mp4"), &limits).unwrap_err();
        assert_eq!(err.reason(), "clip_too_long");
        assert!(validate(&RawClipRequest::new("a.mp4", 0.0, 10.0, "mp4"), &limits).is_ok());
    }

    #[test]
    fn test_offset_out_of_range() {
        let err = validate(
            &RawClipRequest::new("a.mp4", MAX_SOURCE_OFFSET_SECS + 1.0, MAX_SOURCE_OFFSET_SECS + 2.0, "mp4"),
            &limits(),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::OffsetOutOfRange("start"));
    }

    #[test]
    fn test_unsupported_format() {
        let err = validate(&RawClipRequest::new("a.mp4", 0.0, 1.0, "unsupported"), &limits()).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFormat("unsupported".to_string()));

        // Known to the service but not enabled in this deployment
        let err = validate(&RawClipRequest::new("a.mp4", 0.0, 1.0, "gif"), &limits()).unwrap_err();
        assert_eq!(err.reason(), "unsupported_format");
    }

    #[test]
    fn test_checks_fail_fast_in_order() {
        // Both the range and the format are wrong; the range is reported
        let err = validate(&RawClipRequest::new("../x", 9.0, 3.0, "bogus"), &limits()).unwrap_err();
        assert_eq!(err, ValidationError::EndNotAfterStart);

        // Format is checked before the source
        let err = validate(&RawClipRequest::new("../x", 1.0, 3.0, "bogus"), &limits()).unwrap_err();
        assert_eq!(err.reason(), "unsupported_format");
    }

    #[test]
    fn test_source_syntax() {
        let err = validate(&RawClipRequest::new("   ", 0.0, 1.0, "mp4"), &limits()).unwrap_err();
        assert_eq!(err, ValidationError::EmptySource);

        for bad in ["../etc/passwd", "media/../../secret.mp4", "a\\..\\b.mp4", "file:///srv/../etc/passwd"] {
            let err = validate(&RawClipRequest::new(bad, 0.0, 1.0, "mp4"), &limits()).unwrap_err();
            assert_eq!(err, ValidationError::PathTraversal, "{bad}");
        }

        let err = validate(&RawClipRequest::new("ftp://host/a.mp4", 0.0, 1.0, "mp4"), &limits()).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedScheme("ftp".to_string()));

        let err = validate(&RawClipRequest::new("a\u{0}.mp4", 0.0, 1.0, "mp4"), &limits()).unwrap_err();
        assert_eq!(err.reason(), "invalid_source");
    }

    #[test]
    fn test_remote_source() {
        let req = validate(
            &RawClipRequest::new("https://cdn.example.com/v/a.mp4", 0.0, 1.0, "mp4"),
            &limits(),
        )
        .unwrap();
        assert!(!req.source().is_local());
        assert_eq!(req.source().locator(), "https://cdn.example.com/v/a.mp4");
    }

    #[test]
    fn test_source_root() {
        let limits = limits().with_source_root("/srv/media");

        let req = validate(&RawClipRequest::new("shows/ep1.mp4", 0.0, 1.0, "mp4"), &limits).unwrap();
        assert_eq!(req.source(), &ClipSource::Local(PathBuf::from("/srv/media/shows/ep1.mp4")));

        assert!(validate(&RawClipRequest::new("/srv/media/a.mp4", 0.0, 1.0, "mp4"), &limits).is_ok());

        let err = validate(&RawClipRequest::new("/etc/a.mp4", 0.0, 1.0, "mp4"), &limits).unwrap_err();
        assert_eq!(err, ValidationError::OutsideSourceRoot);
    }
}
