//! Fixed-length clip recording.
//!
//! A recording runs: start capture → sleep for the clip length → stop
//! capture → transcode → verify → drop the raw capture. The raw capture is
//! only removed once the final file is verified non-empty; on any failure it
//! is left on disk for inspection and the final path is left absent.

use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::Camera;
use crate::clock::SharedClock;
use crate::transcode::{TranscodeError, Transcoder};

pub const CLIP_EXTENSION: &str = "mp4";
pub const RAW_EXTENSION: &str = "h264";

/// Final and intermediate paths for one clip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClipPaths {
    pub clip: PathBuf,
    pub raw: PathBuf,
}

impl ClipPaths {
    /// `motion_<stamp>.mp4` and `motion_<stamp>.h264` under `dir`.
    pub fn for_stamp(dir: &Path, stamp: &str) -> Self {
        let clip = dir.join(format!("motion_{stamp}.{CLIP_EXTENSION}"));
        let raw = clip.with_extension(RAW_EXTENSION);
        Self { clip, raw }
    }
}

/// A verified, playable clip.
#[derive(Clone, Debug)]
pub struct ClipArtifact {
    pub path: PathBuf,
    pub duration_seconds: u32,
    pub created_at: DateTime<Local>,
    pub size_bytes: u64,
}

impl ClipArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug)]
pub enum RecordError {
    /// The camera could not start the capture; nothing was recorded.
    Start(anyhow::Error),
    /// The capture started but did not end cleanly.
    Camera(anyhow::Error),
    /// The transcoder failed.
    Transcode(TranscodeError),
    /// The transcoder reported success but the final file is missing or empty.
    EmptyOutput(PathBuf),
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Start(e) => write!(f, "camera did not start: {:#}", e),
            RecordError::Camera(e) => write!(f, "camera error: {:#}", e),
            RecordError::Transcode(e) => write!(f, "{}", e),
            RecordError::EmptyOutput(path) => {
                write!(f, "transcoded clip {} is missing or empty", path.display())
            }
        }
    }
}

impl std::error::Error for RecordError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RecordError::Transcode(e) => Some(e),
            _ => None,
        }
    }
}

pub struct ClipRecorder {
    clock: SharedClock,
    clip_seconds: u32,
    transcoder: Box<dyn Transcoder>,
}

impl ClipRecorder {
    pub fn new(clock: SharedClock, clip_seconds: u32, transcoder: Box<dyn Transcoder>) -> Self {
        Self {
            clock,
            clip_seconds,
            transcoder,
        }
    }

    pub fn clip_seconds(&self) -> u32 {
        self.clip_seconds
    }

    /// Record one clip. Blocks for the full clip length plus transcoding.
    pub fn record(
        &self,
        camera: &mut dyn Camera,
        paths: &ClipPaths,
    ) -> Result<ClipArtifact, RecordError> {
        let length = Duration::from_secs(u64::from(self.clip_seconds));
        camera
            .start_recording(&paths.raw, length)
            .map_err(RecordError::Start)?;
        self.clock.sleep(length);
        camera.stop_recording().map_err(RecordError::Camera)?;

        if let Err(e) = self.transcoder.transcode(&paths.raw, &paths.clip) {
            discard_partial(&paths.clip);
            return Err(RecordError::Transcode(e));
        }

        let size_bytes = match verified_size(&paths.clip) {
            Some(size) => size,
            None => {
                discard_partial(&paths.clip);
                return Err(RecordError::EmptyOutput(paths.clip.clone()));
            }
        };

        cleanup_intermediate(paths);

        Ok(ClipArtifact {
            path: paths.clip.clone(),
            duration_seconds: self.clip_seconds,
            created_at: self.clock.local_now(),
            size_bytes,
        })
    }
}

/// Size of `path` if it exists and is non-empty.
fn verified_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|meta| meta.is_file() && meta.len() > 0)
        .map(|meta| meta.len())
}

fn discard_partial(clip: &Path) {
    if clip.exists() {
        if let Err(e) = fs::remove_file(clip) {
            log::warn!("could not remove partial clip {}: {}", clip.display(), e);
        }
    }
}

/// Remove the raw capture if, and only if, the final clip is verified
/// non-empty. Returns whether the raw file was removed. Never fails.
pub fn cleanup_intermediate(paths: &ClipPaths) -> bool {
    if verified_size(&paths.clip).is_none() {
        return false;
    }
    match fs::remove_file(&paths.raw) {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("could not remove raw capture {}: {}", paths.raw.display(), e);
            false
        }
    }
}
