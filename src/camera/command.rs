//! Capture through an external camera tool (`rpicam-vid` on Raspberry Pi OS).
//!
//! Each clip is one bounded run of the tool. It is told how many frames to
//! encode, so the time it spends bringing the sensor up is added to the run
//! instead of being cut from the clip. Stopping waits for the tool to finish
//! those frames; SIGINT (which makes it flush its encoder) is only sent once
//! the grace period runs out, or on release.
//!
//! Children run in their own process group: a terminal Ctrl-C must reach the
//! agent, which lets a started clip finish, and never the tool itself.

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::Duration;

use super::{Camera, CameraSettings};
use crate::clock::SharedClock;
use crate::process::isolate_from_terminal;

pub const DEFAULT_CAPTURE_PROGRAM: &str = "rpicam-vid";
/// Time allowed past the requested length for the tool to start and finish.
pub const STOP_GRACE: Duration = Duration::from_secs(10);
const EXIT_POLL: Duration = Duration::from_millis(50);

#[derive(Clone, Debug)]
pub struct CommandCameraConfig {
    pub program: String,
    pub settings: CameraSettings,
}

pub struct CommandCamera {
    config: CommandCameraConfig,
    clock: SharedClock,
    child: Option<Child>,
}

/// Frames covering `length` at `framerate`, never zero.
pub fn frames_for(length: Duration, framerate: u32) -> u64 {
    let frames = (length.as_secs_f64() * f64::from(framerate)).round() as u64;
    frames.max(1)
}

impl CommandCamera {
    pub fn new(config: CommandCameraConfig, clock: SharedClock) -> Self {
        Self {
            config,
            clock,
            child: None,
        }
    }

    fn base_command(&self) -> Command {
        let s = &self.config.settings;
        let mut cmd = Command::new(&self.config.program);
        cmd.arg("--nopreview")
            .arg("--width")
            .arg(s.width.to_string())
            .arg("--height")
            .arg(s.height.to_string())
            .arg("--framerate")
            .arg(s.framerate.to_string())
            .arg("--bitrate")
            .arg(s.bitrate.to_string())
            .args(["--codec", "h264"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        isolate_from_terminal(&mut cmd);
        cmd
    }

    fn capture_command(&self, raw_path: &Path, length: Duration) -> Command {
        let mut cmd = self.base_command();
        cmd.args(["-t", "0"])
            .arg("--frames")
            .arg(frames_for(length, self.config.settings.framerate).to_string())
            .arg("-o")
            .arg(raw_path);
        cmd
    }

    /// Short throwaway capture that brings the sensor up and settles exposure.
    fn warm_up_command(&self) -> Command {
        let millis = self.config.settings.warmup.as_millis().max(1);
        let mut cmd = self.base_command();
        cmd.arg("-t")
            .arg(millis.to_string())
            .args(["-o", "/dev/null"]);
        cmd
    }

    /// Wait up to `budget` for the child to exit, then interrupt it.
    /// Returns the exit status and whether an interrupt was needed.
    fn wait_for_exit(&self, mut child: Child, budget: Duration) -> Result<(ExitStatus, bool)> {
        let started = self.clock.now();
        loop {
            if let Some(status) = child.try_wait().context("poll capture process")? {
                return Ok((status, false));
            }
            if self.clock.now().duration_since(started) >= budget {
                log::warn!(
                    "CommandCamera: pid {} still running after {:?}; interrupting",
                    child.id(),
                    budget
                );
                interrupt(&mut child)?;
                let status = child.wait().context("wait for capture process")?;
                return Ok((status, true));
            }
            self.clock.sleep(EXIT_POLL);
        }
    }

    fn abort_child(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        interrupt(&mut child)?;
        let status = child.wait().context("wait for capture process")?;
        log::debug!("CommandCamera: capture aborted, exited with {}", status);
        Ok(())
    }
}

impl Camera for CommandCamera {
    fn name(&self) -> String {
        self.config.program.clone()
    }

    fn warm_up(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(anyhow!("camera is recording"));
        }
        let warmup = self.config.settings.warmup;
        log::info!(
            "CommandCamera: warming up {} for {:?}",
            self.config.program,
            warmup
        );
        let child = self
            .warm_up_command()
            .spawn()
            .with_context(|| format!("spawn capture program '{}'", self.config.program))?;
        let (status, _) = self.wait_for_exit(child, warmup + STOP_GRACE)?;
        if !status.success() {
            return Err(anyhow!(
                "warm-up capture with '{}' exited with {}",
                self.config.program,
                status
            ));
        }
        Ok(())
    }

    fn start_recording(&mut self, raw_path: &Path, length: Duration) -> Result<()> {
        if self.child.is_some() {
            return Err(anyhow!("camera is already recording"));
        }
        let child = self
            .capture_command(raw_path, length)
            .spawn()
            .with_context(|| format!("spawn capture program '{}'", self.config.program))?;
        log::debug!(
            "CommandCamera: pid {} capturing {:?} to {}",
            child.id(),
            length,
            raw_path.display()
        );
        self.child = Some(child);
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<()> {
        let child = self
            .child
            .take()
            .ok_or_else(|| anyhow!("camera is not recording"))?;
        let (status, interrupted) = self.wait_for_exit(child, STOP_GRACE)?;
        if !interrupted && !status.success() {
            return Err(anyhow!(
                "capture program '{}' exited with {}",
                self.config.program,
                status
            ));
        }
        log::debug!("CommandCamera: capture exited with {}", status);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.abort_child()
    }
}

impl Drop for CommandCamera {
    fn drop(&mut self) {
        if let Err(e) = self.abort_child() {
            log::warn!("CommandCamera: release on drop failed: {}", e);
        }
    }
}

#[cfg(target_os = "linux")]
fn interrupt(child: &mut Child) -> Result<()> {
    let pid = libc::pid_t::try_from(child.id()).context("capture pid out of range")?;
    // SAFETY: pid names a child we spawned and have not yet reaped.
    let rc = unsafe { libc::kill(pid, libc::SIGINT) };
    if rc != 0 {
        // already exited; wait() will reap it
        log::debug!("CommandCamera: SIGINT to pid {} failed", pid);
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn interrupt(child: &mut Child) -> Result<()> {
    child.kill().or_else(|e| {
        if e.kind() == std::io::ErrorKind::InvalidInput {
            Ok(())
        } else {
            Err(e)
        }
    })?;
    Ok(())
}
