//! Shared data models for the clip service.
//!
//! This crate provides Serde-serializable types for:
//! - Inbound clip requests, raw and validated
//! - Output formats and their container/codec parameters
//! - Job identifiers and the job state machine
//! - The error taxonomy shared by the orchestrator and the HTTP layer

pub mod error;
pub mod format;
pub mod job;
pub mod request;
pub mod validation;

// Re-export common types
pub use error::{ErrorKind, JobFailure};
pub use format::{FormatParseError, OutputFormat};
pub use job::{InvalidTransition, JobId, JobState};
pub use request::{ClipRequest, ClipSource, RawClipRequest};
pub use validation::{validate, ValidationError, ValidationLimits, MAX_SOURCE_OFFSET_SECS};
