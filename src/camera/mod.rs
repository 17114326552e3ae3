//! Camera devices.
//!
//! The camera is an exclusive resource: exactly one raw capture may be open
//! at a time, and the orchestrator never starts a second one while the first
//! is running.
//!
//! Sources:
//! - `rpicam`: spawns the `rpicam-vid` capture tool (production)
//! - `stub://...`: writes a synthetic raw stream (dry runs, tests)

use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Duration;

use crate::clock::SharedClock;

pub mod command;
pub mod stub;

pub use command::{CommandCamera, CommandCameraConfig};
pub use stub::StubCamera;

/// Camera capturing a raw H.264 stream to a file.
pub trait Camera: Send {
    /// Camera identifier for logs.
    fn name(&self) -> String;

    /// Optional warm-up hook, run once before monitoring starts.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    /// Begin capturing `length` of video to `raw_path`. Fails if a capture
    /// is already running.
    fn start_recording(&mut self, raw_path: &Path, length: Duration) -> Result<()>;

    /// End the running capture once `length` is covered and flush the raw file.
    fn stop_recording(&mut self) -> Result<()>;

    /// Release the device. Best-effort and safe to call in any state.
    fn release(&mut self) -> Result<()>;
}

/// Settings shared by camera backends.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub bitrate: u32,
    pub warmup: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            framerate: 30,
            bitrate: 4_000_000,
            warmup: Duration::from_secs(2),
        }
    }
}

/// Build a camera from a source string.
pub fn open_camera(
    source: &str,
    settings: CameraSettings,
    clock: SharedClock,
) -> Result<Box<dyn Camera>> {
    if source.starts_with("stub://") {
        return Ok(Box::new(StubCamera::new(source)));
    }
    if source == "rpicam" || source.starts_with("rpicam:") {
        let program = source
            .strip_prefix("rpicam:")
            .filter(|p| !p.is_empty())
            .unwrap_or(command::DEFAULT_CAPTURE_PROGRAM);
        let config = CommandCameraConfig {
            program: program.to_string(),
            settings,
        };
        return Ok(Box::new(CommandCamera::new(config, clock)));
    }
    Err(anyhow!(
        "unsupported camera source '{}' (expected rpicam[:<program>] or stub://<name>)",
        source
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[test]
    fn open_camera_selects_backend() -> Result<()> {
        let clock: SharedClock = ManualClock::shared();
        let stub = open_camera("stub://front", CameraSettings::default(), clock.clone())?;
        assert_eq!(stub.name(), "stub://front");

        let rpicam = open_camera(
            "rpicam:/opt/bin/libcamera-vid",
            CameraSettings::default(),
            clock,
        )?;
        assert_eq!(rpicam.name(), "/opt/bin/libcamera-vid");
        Ok(())
    }

    #[test]
    fn open_camera_rejects_unknown_source() {
        let clock: SharedClock = ManualClock::shared();
        assert!(open_camera("v4l2:/dev/video0", CameraSettings::default(), clock).is_err());
    }
}
