//! Transcoder command builder.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clipper_models::{ClipRequest, OutputFormat};

use crate::error::{MediaError, MediaResult};

/// Builder for one transcoder invocation.
///
/// The argument layout follows the ffmpeg CLI: global flags, input
/// options (`-ss`, `-t`) ahead of `-i` for fast seeking, then encoder
/// options, the muxer and the output path as the final argument.
#[derive(Debug, Clone)]
pub struct TranscodeCommand {
    /// Executable to launch
    program: PathBuf,
    /// Arguments placed before everything else
    global_args: Vec<String>,
    /// Input locator (path or URI)
    input: String,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
}

impl TranscodeCommand {
    /// Create a new command.
    pub fn new(program: impl AsRef<Path>, input: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            program: program.as_ref().to_path_buf(),
            global_args: Vec::new(),
            input: input.into(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// Build the invocation for a validated request writing to `output`.
    pub fn for_request(
        program: impl AsRef<Path>,
        global_args: &[String],
        request: &ClipRequest,
        output: impl AsRef<Path>,
    ) -> Self {
        Self::new(program, request.source().locator(), output)
            .global_args(global_args.iter().cloned())
            .seek(request.start())
            .duration(request.duration())
            .format(request.format())
    }

    /// Add arguments placed before all derived arguments.
    pub fn global_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.global_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, offset: Duration) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", offset.as_secs_f64()))
    }

    /// Set duration.
    pub fn duration(self, length: Duration) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", length.as_secs_f64()))
    }

    /// Encoder arguments and muxer for an output format.
    pub fn format(self, format: OutputFormat) -> Self {
        self.output_args(format.encoder_args().iter().copied())
            .output_arg("-f")
            .output_arg(format.muxer())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.global_args.clone();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-nostdin".to_string());
        args.push("-hide_banner".to_string());

        args.push("-v".to_string());
        args.push("error".to_string());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.clone());

        args.extend(self.output_args.clone());

        // Output file is always the last argument
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Resolve the configured transcoder to an executable path.
///
/// Bare names are looked up on `PATH`; anything with a directory part must
/// exist as given.
pub fn resolve_transcoder(path: &Path) -> MediaResult<PathBuf> {
    if path.components().count() > 1 {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(MediaError::TranscoderNotFound(path.display().to_string()));
    }
    which::which(path).map_err(|_| MediaError::TranscoderNotFound(path.display().to_string()))
}
