//! Orchestrator: the sense → record → notify loop.
//!
//! State machine:
//!
//! ```text
//! WAITING ──trigger──▶ CONFIRMING ──cooldown──▶ COOLDOWN_BLOCKED ─┐
//!                          │  └──rejected──────────────────────────┤
//!                          ▼                                       │
//!                      RECORDING ──failed──────────────────────────┤
//!                          ▼                                       │
//!                      NOTIFYING ──sent / failed───────────────────┤
//!                                                                  ▼
//!                                              wait for motion end → WAITING
//! ```
//!
//! Everything runs on one thread. The raw sensor is not polled for new
//! triggers while recording or notifying, so motion in those states is not
//! queued. Shutdown requests are observed only while waiting on the sensor;
//! a recording that has started always runs to completion.

use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::camera::Camera;
use crate::clock::{stamp, SharedClock};
use crate::gate::{CooldownState, GateDecision, MotionEvent, MotionGate};
use crate::notify::Notifier;
use crate::recorder::{ClipPaths, ClipRecorder, RecordError};
use crate::sensor::MotionSensor;

/// Slice length for sensor waits between shutdown checks.
pub const ARM_POLL: Duration = Duration::from_millis(250);
/// Pause after a sensor read error before retrying.
pub const SENSOR_RETRY_BACKOFF: Duration = Duration::from_secs(1);
/// Consecutive sensor errors tolerated before giving up.
pub const MAX_SENSOR_FAILURES: u32 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentState {
    Waiting,
    Confirming,
    CooldownBlocked,
    Recording,
    Notifying,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentState::Waiting => "WAITING",
            AgentState::Confirming => "CONFIRMING",
            AgentState::CooldownBlocked => "COOLDOWN_BLOCKED",
            AgentState::Recording => "RECORDING",
            AgentState::Notifying => "NOTIFYING",
        };
        f.write_str(name)
    }
}

/// Result of one pass through the state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Shutdown was requested while waiting.
    Shutdown,
    /// The arm-wait slice elapsed with no trigger.
    Idle,
    CooldownBlocked,
    Rejected,
    RecordFailed,
    Notified(PathBuf),
    NotifyFailed(PathBuf),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub triggers: u64,
    pub suppressed: u64,
    pub rejected: u64,
    pub recorded: u64,
    pub record_failures: u64,
    pub notified: u64,
    pub notify_failures: u64,
}

pub struct Agent {
    clock: SharedClock,
    output_dir: PathBuf,
    sensor: Box<dyn MotionSensor>,
    camera: Box<dyn Camera>,
    gate: MotionGate,
    recorder: ClipRecorder,
    notifier: Notifier,
    cooldown: CooldownState,
    state: AgentState,
    stats: AgentStats,
    sensor_failures: u32,
}

/// Everything the agent drives, bundled for construction.
pub struct AgentParts {
    pub clock: SharedClock,
    pub output_dir: PathBuf,
    pub sensor: Box<dyn MotionSensor>,
    pub camera: Box<dyn Camera>,
    pub gate: MotionGate,
    pub recorder: ClipRecorder,
    pub notifier: Notifier,
}

impl Agent {
    pub fn new(parts: AgentParts) -> Result<Self> {
        std::fs::create_dir_all(&parts.output_dir).with_context(|| {
            format!("create output directory {}", parts.output_dir.display())
        })?;
        Ok(Self {
            clock: parts.clock,
            output_dir: parts.output_dir,
            sensor: parts.sensor,
            camera: parts.camera,
            gate: parts.gate,
            recorder: parts.recorder,
            notifier: parts.notifier,
            cooldown: CooldownState::new(),
            state: AgentState::Waiting,
            stats: AgentStats::default(),
            sensor_failures: 0,
        })
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn stats(&self) -> AgentStats {
        self.stats
    }

    pub fn cooldown(&self) -> &CooldownState {
        &self.cooldown
    }

    /// Warm the camera up before the first trigger.
    pub fn warm_up(&mut self) -> Result<()> {
        self.camera
            .warm_up()
            .with_context(|| format!("warm up camera {}", self.camera.name()))
    }

    /// Loop until `shutdown` is set or the sensor becomes unusable. The
    /// camera is released on every exit path.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<AgentStats> {
        log::info!(
            "monitoring {} with camera {}; clips go to {}",
            self.sensor.name(),
            self.camera.name(),
            self.output_dir.display()
        );
        let result = loop {
            match self.run_cycle(shutdown) {
                Ok(CycleOutcome::Shutdown) => break Ok(self.stats),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        self.release_camera();
        result
    }

    /// Process at most one trigger.
    pub fn run_cycle(&mut self, shutdown: &AtomicBool) -> Result<CycleOutcome> {
        self.set_state(AgentState::Waiting);
        if shutdown.load(Ordering::SeqCst) {
            return Ok(CycleOutcome::Shutdown);
        }
        let triggered = match self.sensor.wait_for_motion(ARM_POLL) {
            Ok(triggered) => {
                self.sensor_failures = 0;
                triggered
            }
            Err(e) => {
                self.sensor_fault(e)?;
                return Ok(CycleOutcome::Idle);
            }
        };
        if !triggered {
            return Ok(CycleOutcome::Idle);
        }

        self.stats.triggers += 1;
        self.set_state(AgentState::Confirming);
        let decision = match self.gate.evaluate(self.sensor.as_mut(), &self.cooldown) {
            Ok(decision) => decision,
            Err(e) => {
                self.sensor_fault(e)?;
                return Ok(CycleOutcome::Idle);
            }
        };

        let outcome = match decision {
            GateDecision::CooldownBlocked => {
                self.stats.suppressed += 1;
                self.set_state(AgentState::CooldownBlocked);
                log::info!(
                    "trigger within {:?} of the last alert; suppressed",
                    self.gate.settings().min_motion_gap
                );
                CycleOutcome::CooldownBlocked
            }
            GateDecision::Rejected => {
                self.stats.rejected += 1;
                log::info!(
                    "trigger not confirmed within {:?}; ignored",
                    self.gate.settings().confirm_window
                );
                CycleOutcome::Rejected
            }
            GateDecision::Confirmed(event) => self.handle_event(&event),
        };

        self.await_motion_end(shutdown)?;
        self.set_state(AgentState::Waiting);
        Ok(outcome)
    }

    fn handle_event(&mut self, event: &MotionEvent) -> CycleOutcome {
        let detected_stamp = stamp(&event.detected_at);
        let detected = detected_stamp.as_str();
        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            log::error!(
                "[{}] output directory {} unavailable: {}",
                detected,
                self.output_dir.display(),
                e
            );
            self.stats.record_failures += 1;
            return CycleOutcome::RecordFailed;
        }
        let paths = ClipPaths::for_stamp(&self.output_dir, detected);

        self.set_state(AgentState::Recording);
        log::info!(
            "[{}] motion detected. recording {}s -> {}",
            detected,
            self.recorder.clip_seconds(),
            paths.clip.display()
        );
        let recorded = self.recorder.record(self.camera.as_mut(), &paths);
        // a capture that never started leaves the cooldown untouched
        if !matches!(recorded, Err(RecordError::Start(_))) {
            self.cooldown.record_alert(event.detected_instant);
        }
        let clip = match recorded {
            Ok(clip) => clip,
            Err(e) => {
                self.stats.record_failures += 1;
                match &e {
                    RecordError::Transcode(_) | RecordError::EmptyOutput(_) => log::error!(
                        "[{}] {}; raw capture kept at {}",
                        detected,
                        e,
                        paths.raw.display()
                    ),
                    RecordError::Start(_) | RecordError::Camera(_) => {
                        log::error!("[{}] recording failed: {}", detected, e)
                    }
                }
                return CycleOutcome::RecordFailed;
            }
        };
        self.stats.recorded += 1;
        log::info!(
            "[{}] clip ready: {} ({} bytes)",
            detected,
            clip.file_name(),
            clip.size_bytes
        );

        self.set_state(AgentState::Notifying);
        let path = clip.path.clone();
        let job = self.notifier.job_for(clip, detected);
        match self.notifier.send(job) {
            Ok(()) => {
                self.stats.notified += 1;
                log::info!(
                    "[{}] email sent to {}",
                    detected,
                    self.notifier.recipients().join(", ")
                );
                CycleOutcome::Notified(path)
            }
            Err(e) => {
                self.stats.notify_failures += 1;
                log::error!("[{}] failed to send email: {:#}", detected, e);
                CycleOutcome::NotifyFailed(path)
            }
        }
    }

    /// Block until the raw signal drops, checking for shutdown between slices.
    fn await_motion_end(&mut self, shutdown: &AtomicBool) -> Result<()> {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }
            match self.sensor.wait_for_no_motion(ARM_POLL) {
                Ok(true) => {
                    self.sensor_failures = 0;
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => self.sensor_fault(e)?,
            }
        }
    }

    /// Count a sensor error; fatal once the sensor keeps failing.
    fn sensor_fault(&mut self, err: anyhow::Error) -> Result<()> {
        self.sensor_failures += 1;
        if self.sensor_failures >= MAX_SENSOR_FAILURES {
            return Err(anyhow!(
                "sensor {} failed {} times in a row, cannot re-arm: {:#}",
                self.sensor.name(),
                self.sensor_failures,
                err
            ));
        }
        log::warn!(
            "sensor {} error ({}/{}): {:#}",
            self.sensor.name(),
            self.sensor_failures,
            MAX_SENSOR_FAILURES,
            err
        );
        self.clock.sleep(SENSOR_RETRY_BACKOFF);
        Ok(())
    }

    fn set_state(&mut self, next: AgentState) {
        if self.state != next {
            log::info!("state {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn release_camera(&mut self) {
        if let Err(e) = self.camera.release() {
            log::warn!("camera {} release failed: {:#}", self.camera.name(), e);
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.release_camera();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::StubCamera;
    use crate::clock::ManualClock;
    use crate::gate::GateSettings;
    use crate::notify::{MailTransport, NotificationJob};
    use crate::sensor::TraceSensor;
    use crate::transcode::{TranscodeError, Transcoder};
    use std::path::Path;

    struct CopyTranscoder;

    impl Transcoder for CopyTranscoder {
        fn name(&self) -> &'static str {
            "copy"
        }

        fn transcode(&self, raw: &Path, output: &Path) -> Result<(), TranscodeError> {
            std::fs::copy(raw, output)
                .map(|_| ())
                .map_err(|e| TranscodeError::new(e.to_string()))
        }
    }

    struct NullMail;

    impl MailTransport for NullMail {
        fn name(&self) -> &'static str {
            "null"
        }

        fn deliver(&self, _from: &str, _job: &NotificationJob, _data: Vec<u8>) -> Result<()> {
            Ok(())
        }
    }

    struct FlakySensor {
        failures_left: u32,
    }

    impl MotionSensor for FlakySensor {
        fn name(&self) -> String {
            "flaky".into()
        }

        fn motion_detected(&mut self) -> Result<bool> {
            Ok(false)
        }

        fn wait_for_motion(&mut self, _timeout: Duration) -> Result<bool> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err(anyhow!("read error"));
            }
            Ok(false)
        }

        fn wait_for_no_motion(&mut self, _timeout: Duration) -> Result<bool> {
            Ok(true)
        }
    }

    fn agent(dir: &Path, clock: SharedClock, sensor: Box<dyn MotionSensor>) -> Agent {
        Agent::new(AgentParts {
            clock: clock.clone(),
            output_dir: dir.join("clips"),
            sensor,
            camera: Box::new(StubCamera::new("stub://cam")),
            gate: MotionGate::new(GateSettings::default(), clock.clone()),
            recorder: ClipRecorder::new(clock, 15, Box::new(CopyTranscoder)),
            notifier: Notifier::new(
                "cam@x.com",
                vec!["a@x.com".into()],
                1 << 20,
                Box::new(NullMail),
            )
            .expect("notifier"),
        })
        .expect("agent")
    }

    #[test]
    fn creates_output_directory() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let clock: SharedClock = ManualClock::shared();
        let _agent = agent(dir.path(), clock.clone(), Box::new(TraceSensor::new(clock)));
        assert!(dir.path().join("clips").is_dir());
        Ok(())
    }

    #[test]
    fn shutdown_is_honoured_while_waiting() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let clock: SharedClock = ManualClock::shared();
        let mut agent = agent(dir.path(), clock.clone(), Box::new(TraceSensor::new(clock)));
        let shutdown = AtomicBool::new(true);
        assert_eq!(agent.run_cycle(&shutdown)?, CycleOutcome::Shutdown);
        assert_eq!(agent.run(&shutdown)?, AgentStats::default());
        Ok(())
    }

    #[test]
    fn transient_sensor_errors_are_survived() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let clock: SharedClock = ManualClock::shared();
        let sensor = FlakySensor {
            failures_left: MAX_SENSOR_FAILURES - 1,
        };
        let mut agent = agent(dir.path(), clock, Box::new(sensor));
        let shutdown = AtomicBool::new(false);
        for _ in 0..MAX_SENSOR_FAILURES {
            assert_eq!(agent.run_cycle(&shutdown)?, CycleOutcome::Idle);
        }
        assert_eq!(agent.state(), AgentState::Waiting);
        Ok(())
    }

    #[test]
    fn persistent_sensor_errors_are_fatal() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let clock: SharedClock = ManualClock::shared();
        let sensor = FlakySensor {
            failures_left: u32::MAX,
        };
        let mut agent = agent(dir.path(), clock, Box::new(sensor));
        let err = agent.run(&AtomicBool::new(false)).unwrap_err();
        assert!(err.to_string().contains("cannot re-arm"));
        Ok(())
    }

    #[test]
    fn state_names_match_log_vocabulary() {
        assert_eq!(AgentState::CooldownBlocked.to_string(), "COOLDOWN_BLOCKED");
        assert_eq!(AgentState::Waiting.to_string(), "WAITING");
    }
}
