#![deny(unreachable_patterns)]
//! Orchestration core for clip jobs.
//!
//! This crate provides:
//! - Type-safe transcoder command building
//! - An owned subprocess handle with forceful termination
//! - A three-way race between exit, deadline and cancellation
//! - Per-job scratch areas with guaranteed release
//! - A bounded admission gate for concurrent transcodes
//! - A registry of live jobs for listing, cancellation and sweeping

pub mod command;
pub mod config;
pub mod error;
pub mod job;
pub mod limiter;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod process;
pub mod registry;
pub mod scratch;
pub mod stderr;

pub use command::{resolve_transcoder, TranscodeCommand};
pub use config::ClipConfig;
pub use error::{MediaError, MediaResult};
pub use job::ClipJob;
pub use limiter::{Admission, ConcurrencyLimiter, Rejected};
pub use logging::JobLogger;
pub use orchestrator::{ClipOrchestrator, ClipOutput, JobResult};
pub use process::{race_terminal, ExitOutcome, Signal, TranscodeProcess, TranscoderProcess};
pub use registry::{JobRegistry, JobSnapshot, Registration};
pub use scratch::{ScratchArea, ScratchManager, SCRATCH_PREFIX};
pub use stderr::{sanitize_excerpt, OutputTail};
