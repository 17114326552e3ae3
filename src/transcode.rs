//! Raw capture → playable container.
//!
//! The camera writes a bare H.264 elementary stream which most mail clients
//! and players cannot open. The transcoder re-muxes it into MP4 without
//! re-encoding.

use std::path::Path;
use std::process::{Command, Stdio};

use crate::process::isolate_from_terminal;

pub const DEFAULT_FFMPEG_PROGRAM: &str = "ffmpeg";

/// Transcoder failure: the tool could not run, or exited unsuccessfully.
#[derive(Debug)]
pub struct TranscodeError {
    pub reason: String,
    pub stderr: String,
}

impl TranscodeError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            stderr: String::new(),
        }
    }
}

impl std::fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.stderr.trim().is_empty() {
            write!(f, "transcode failed: {}", self.reason)
        } else {
            write!(f, "transcode failed: {} ({})", self.reason, self.stderr.trim())
        }
    }
}

impl std::error::Error for TranscodeError {}

/// Converts a raw capture into the final container at `output`.
pub trait Transcoder: Send {
    fn name(&self) -> &'static str;

    fn transcode(&self, raw: &Path, output: &Path) -> Result<(), TranscodeError>;
}

/// Re-mux through the `ffmpeg` command-line tool.
#[derive(Clone, Debug)]
pub struct FfmpegTranscoder {
    program: String,
    framerate: u32,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, framerate: u32) -> Self {
        Self {
            program: program.into(),
            framerate,
        }
    }

    fn command(&self, raw: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        // raw H.264 carries no timing, so the input rate must be given
        cmd.args(["-y", "-loglevel", "error"])
            .arg("-r")
            .arg(self.framerate.to_string())
            .arg("-i")
            .arg(raw)
            .args(["-c", "copy"])
            .arg(output)
            .stdin(Stdio::null());
        isolate_from_terminal(&mut cmd);
        cmd
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG_PROGRAM, 30)
    }
}

impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn transcode(&self, raw: &Path, output: &Path) -> Result<(), TranscodeError> {
        let result = self.command(raw, output).output().map_err(|e| {
            TranscodeError::new(format!("failed to run '{}': {}", self.program, e))
        })?;
        if result.status.success() {
            return Ok(());
        }
        Err(TranscodeError {
            reason: format!("'{}' exited with {}", self.program, result.status),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        })
    }
}
