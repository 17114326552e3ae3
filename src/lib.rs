//! Motion Mailer
//!
//! A single-station monitoring agent: a PIR sensor gates a camera, each
//! confirmed motion event becomes one fixed-length clip, and the clip is
//! emailed to a recipient list.
//!
//! # Architecture
//!
//! The pipeline is strictly sequential and upholds these invariants:
//!
//! 1. **Exclusive camera**: at most one clip is being produced at any time.
//! 2. **One clip per event**: a confirmed trigger yields exactly one recording
//!    and at most one notification.
//! 3. **Cooldown spacing**: no two accepted events are closer than the
//!    minimum motion gap.
//! 4. **Re-arm on release**: after any trigger, accepted or not, the raw
//!    signal must go inactive before the next trigger is considered.
//! 5. **Best-effort delivery**: transcode and mail failures are logged and
//!    never stop monitoring.
//!
//! # Module Structure
//!
//! - `sensor`: raw PIR signal (sysfs GPIO, synthetic, scripted traces)
//! - `gate`: confirmation and cooldown filters
//! - `camera`, `transcode`, `recorder`: clip production
//! - `notify`: message composition and SMTP delivery
//! - `agent`: the orchestrating state machine
//! - `config`: startup configuration from file + environment

pub mod agent;
pub mod camera;
pub mod clock;
pub mod config;
pub mod gate;
pub mod notify;
mod process;
pub mod recorder;
pub mod sensor;
pub mod transcode;

pub use agent::{Agent, AgentParts, AgentState, AgentStats, CycleOutcome};
pub use camera::{open_camera, Camera, CameraSettings, CommandCamera, StubCamera};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{AgentConfig, MissingConfig};
pub use gate::{CooldownState, GateDecision, GateSettings, MotionEvent, MotionGate};
pub use notify::{parse_recipients, MailTransport, NotificationJob, Notifier, SmtpMailer};
pub use recorder::{cleanup_intermediate, ClipArtifact, ClipPaths, ClipRecorder, RecordError};
pub use sensor::{open_sensor, MotionSensor, SyntheticSensor, SysfsGpioSensor, TraceSensor};
pub use transcode::{FfmpegTranscoder, TranscodeError, Transcoder};

/// Wire an agent from a loaded configuration using the real backends.
pub fn build_agent(cfg: &AgentConfig, clock: SharedClock) -> anyhow::Result<Agent> {
    let sensor = open_sensor(&cfg.sensor, clock.clone())?;
    let camera = open_camera(&cfg.camera_source, cfg.camera.clone(), clock.clone())?;
    let transcoder = FfmpegTranscoder::new(cfg.ffmpeg.clone(), cfg.camera.framerate);
    let notifier = Notifier::new(
        cfg.email_from.clone(),
        cfg.email_to.clone(),
        cfg.max_attachment_bytes,
        Box::new(SmtpMailer::new(cfg.smtp.clone())),
    )?;
    Agent::new(AgentParts {
        clock: clock.clone(),
        output_dir: cfg.output_dir.clone(),
        sensor,
        camera,
        gate: MotionGate::new(cfg.gate, clock.clone()),
        recorder: ClipRecorder::new(clock, cfg.clip_seconds, Box::new(transcoder)),
        notifier,
    })
}
