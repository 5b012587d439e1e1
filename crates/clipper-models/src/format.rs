//! Output container/codec definitions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Output formats the service knows how to ask the transcoder for.
///
/// Which of these are actually accepted is decided by configuration
/// (`ALLOWED_FORMATS`), see [`crate::ValidationLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// H.264 + AAC in MP4
    Mp4,
    /// VP9 + Opus in WebM
    Webm,
    /// H.264 + AAC in Matroska
    Mkv,
    /// H.264 + AAC in QuickTime
    Mov,
    /// Audio only, MP3
    Mp3,
    /// Audio only, AAC in MP4
    M4a,
    /// Audio only, PCM
    Wav,
    /// Animated GIF, no audio
    Gif,
}

impl OutputFormat {
    pub const ALL: &'static [OutputFormat] = &[
        OutputFormat::Mp4,
        OutputFormat::Webm,
        OutputFormat::Mkv,
        OutputFormat::Mov,
        OutputFormat::Mp3,
        OutputFormat::M4a,
        OutputFormat::Wav,
        OutputFormat::Gif,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mkv => "mkv",
            OutputFormat::Mov => "mov",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4a => "m4a",
            OutputFormat::Wav => "wav",
            OutputFormat::Gif => "gif",
        }
    }

    /// File extension used for the staged output file.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    /// MIME type served in `Content-Type`.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "video/mp4",
            OutputFormat::Webm => "video/webm",
            OutputFormat::Mkv => "video/x-matroska",
            OutputFormat::Mov => "video/quicktime",
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::M4a => "audio/mp4",
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Gif => "image/gif",
        }
    }

    /// Muxer name passed with `-f`.
    pub fn muxer(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "mp4",
            OutputFormat::Webm => "webm",
            OutputFormat::Mkv => "matroska",
            OutputFormat::Mov => "mov",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::M4a => "ipod",
            OutputFormat::Wav => "wav",
            OutputFormat::Gif => "gif",
        }
    }

    /// Encoder arguments placed after the input, before the muxer and output path.
    pub fn encoder_args(&self) -> &'static [&'static str] {
        match self {
            OutputFormat::Mp4 | OutputFormat::Mov => &[
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "23",
                "-c:a", "aac", "-b:a", "128k", "-movflags", "+faststart",
            ],
            OutputFormat::Mkv => &[
                "-c:v", "libx264", "-preset", "veryfast", "-crf", "23",
                "-c:a", "aac", "-b:a", "128k",
            ],
            OutputFormat::Webm => &[
                "-c:v", "libvpx-vp9", "-b:v", "0", "-crf", "33", "-deadline", "realtime",
                "-c:a", "libopus", "-b:a", "96k",
            ],
            OutputFormat::Mp3 => &["-vn", "-c:a", "libmp3lame", "-q:a", "4"],
            OutputFormat::M4a => &["-vn", "-c:a", "aac", "-b:a", "128k"],
            OutputFormat::Wav => &["-vn", "-c:a", "pcm_s16le"],
            OutputFormat::Gif => &["-an", "-vf", "fps=10,scale=480:-1:flags=lanczos"],
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_lowercase();
        if name == "matroska" {
            return Ok(OutputFormat::Mkv);
        }
        OutputFormat::ALL
            .iter()
            .copied()
            .find(|format| format.as_str() == name)
            .ok_or_else(|| FormatParseError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown output format: {0}")]
pub struct FormatParseError(pub String);
