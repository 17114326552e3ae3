use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::Camera;

/// Synthetic camera for `stub://` sources and tests.
///
/// Writes a fixed byte pattern to the raw path when the capture stops.
pub struct StubCamera {
    source: String,
    recording: Option<PathBuf>,
    captures: u64,
    released: bool,
}

impl StubCamera {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            recording: None,
            captures: 0,
            released: false,
        }
    }

    pub fn captures(&self) -> u64 {
        self.captures
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Camera for StubCamera {
    fn name(&self) -> String {
        self.source.clone()
    }

    fn start_recording(&mut self, raw_path: &Path, _length: Duration) -> Result<()> {
        if self.recording.is_some() {
            return Err(anyhow!("camera is already recording"));
        }
        self.released = false;
        self.recording = Some(raw_path.to_path_buf());
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        let path = self
            .recording
            .take()
            .ok_or_else(|| anyhow!("camera is not recording"))?;
        self.captures += 1;
        // Annex-B start code followed by filler
        let mut bytes: Vec<u8> = vec![0x00, 0x00, 0x00, 0x01];
        bytes.extend(std::iter::repeat(0xA5).take(1020));
        std::fs::write(&path, bytes)
            .with_context(|| format!("write synthetic capture {}", path.display()))?;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        if self.recording.is_some() {
            self.stop_recording()?;
        }
        self.released = true;
        Ok(())
    }
}
