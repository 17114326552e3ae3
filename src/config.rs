use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

use crate::camera::CameraSettings;
use crate::gate::GateSettings;
use crate::notify::{parse_recipients, SmtpSettings, DEFAULT_MAX_ATTACHMENT_BYTES};
use crate::transcode::DEFAULT_FFMPEG_PROGRAM;

const DEFAULT_SMTP_PORT: u16 = crate::notify::smtp::DEFAULT_SMTP_PORT;
const DEFAULT_CLIP_SECONDS: u32 = 15;
const DEFAULT_WARMUP_SECS: u64 = 2;
const DEFAULT_MIN_MOTION_GAP_SECS: f64 = 15.0;
const DEFAULT_CONFIRM_WINDOW_SECS: f64 = 1.0;
const DEFAULT_CONFIRM_SAMPLE_MS: u64 = 50;
const DEFAULT_CONFIRM_MISSES: u32 = 1;
const DEFAULT_OUTPUT_SUBDIR: &str = "motion_clips";
const DEFAULT_SENSOR: &str = "gpio:17";
const DEFAULT_CAMERA: &str = "rpicam";

/// Keys that must be present in the config file or the environment.
pub const REQUIRED_KEYS: [&str; 4] = ["SMTP_HOST", "SMTP_USER", "SMTP_PASS", "EMAIL_TO"];

/// Every key read from the environment.
pub const ENV_KEYS: [&str; 17] = [
    "MOTION_CONFIG",
    "SMTP_HOST",
    "SMTP_PORT",
    "SMTP_USER",
    "SMTP_PASS",
    "EMAIL_FROM",
    "EMAIL_TO",
    "MOTION_CLIP_SECONDS",
    "MOTION_WARMUP_SECS",
    "MIN_MOTION_GAP",
    "MOTION_CONFIRM_WINDOW",
    "MOTION_CONFIRM_MISSES",
    "MOTION_OUTPUT_DIR",
    "MOTION_SENSOR",
    "MOTION_CAMERA",
    "MOTION_FFMPEG",
    "MOTION_MAX_ATTACHMENT_BYTES",
];

#[derive(Debug, Deserialize, Default)]
struct AgentConfigFile {
    smtp: Option<SmtpConfigFile>,
    motion: Option<MotionConfigFile>,
    camera: Option<CameraConfigFile>,
    output_dir: Option<PathBuf>,
    sensor: Option<String>,
    ffmpeg: Option<String>,
    max_attachment_bytes: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SmtpConfigFile {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    from: Option<String>,
    to: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct MotionConfigFile {
    clip_seconds: Option<u32>,
    warmup_secs: Option<u64>,
    min_gap_secs: Option<f64>,
    confirm_window_secs: Option<f64>,
    sample_ms: Option<u64>,
    max_missed_samples: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    framerate: Option<u32>,
    bitrate: Option<u32>,
}

/// Startup abort listing every required key that was not supplied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingConfig {
    pub keys: Vec<&'static str>,
}

impl std::fmt::Display for MissingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "missing required environment variables: {}",
            self.keys.join(", ")
        )?;
        writeln!(f, "example:")?;
        writeln!(f, "  export SMTP_HOST='smtp.gmail.com'")?;
        writeln!(f, "  export SMTP_PORT='587'")?;
        writeln!(f, "  export SMTP_USER='your_email@gmail.com'")?;
        writeln!(f, "  export SMTP_PASS='your_app_password'")?;
        write!(f, "  export EMAIL_TO='destination@gmail.com'")
    }
}

impl std::error::Error for MissingConfig {}

/// Immutable agent configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub smtp: SmtpSettings,
    pub email_from: String,
    pub email_to: Vec<String>,
    pub clip_seconds: u32,
    pub gate: GateSettings,
    pub output_dir: PathBuf,
    pub sensor: String,
    pub camera_source: String,
    pub camera: CameraSettings,
    pub ffmpeg: String,
    pub max_attachment_bytes: u64,
}

impl AgentConfig {
    /// Load from `MOTION_CONFIG` (optional JSON file) plus the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var("MOTION_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        Self::load_from(path.as_deref(), |key| std::env::var(key).ok())
    }

    /// Load from an explicit file (if any) and an arbitrary key lookup.
    pub fn load_from<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => read_config_file(path)?,
            None => AgentConfigFile::default(),
        };
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let cfg = Self::resolve(file, &lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve(file: AgentConfigFile, env: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let smtp_file = file.smtp.unwrap_or_default();
        let motion = file.motion.unwrap_or_default();
        let camera_file = file.camera.unwrap_or_default();

        let host = env("SMTP_HOST").or(smtp_file.host);
        let username = env("SMTP_USER").or(smtp_file.username);
        let password = env("SMTP_PASS").or(smtp_file.password);
        let to = match env("EMAIL_TO") {
            Some(raw) => Some(raw),
            None => smtp_file.to.map(|list| list.join(",")),
        };

        let mut missing = Vec::new();
        for (key, value) in REQUIRED_KEYS
            .iter()
            .zip([&host, &username, &password, &to])
        {
            if value.as_deref().map_or(true, |v| v.trim().is_empty()) {
                missing.push(*key);
            }
        }
        let (Some(host), Some(username), Some(password), Some(to)) =
            (host, username, password, to)
        else {
            return Err(MissingConfig { keys: missing }.into());
        };
        if !missing.is_empty() {
            return Err(MissingConfig { keys: missing }.into());
        }

        let port = match env("SMTP_PORT") {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|_| anyhow!("SMTP_PORT must be a port number"))?,
            None => smtp_file.port.unwrap_or(DEFAULT_SMTP_PORT),
        };
        let email_from = env("EMAIL_FROM")
            .or(smtp_file.from)
            .unwrap_or_else(|| username.clone());
        let email_to = parse_recipients(&to)?;

        let clip_seconds = match env("MOTION_CLIP_SECONDS") {
            Some(v) => parse_number("MOTION_CLIP_SECONDS", &v)?,
            None => motion.clip_seconds.unwrap_or(DEFAULT_CLIP_SECONDS),
        };
        let warmup_secs = match env("MOTION_WARMUP_SECS") {
            Some(v) => parse_number("MOTION_WARMUP_SECS", &v)?,
            None => motion.warmup_secs.unwrap_or(DEFAULT_WARMUP_SECS),
        };
        let min_gap = match env("MIN_MOTION_GAP") {
            Some(v) => parse_number("MIN_MOTION_GAP", &v)?,
            None => motion.min_gap_secs.unwrap_or(DEFAULT_MIN_MOTION_GAP_SECS),
        };
        let confirm_window = match env("MOTION_CONFIRM_WINDOW") {
            Some(v) => parse_number("MOTION_CONFIRM_WINDOW", &v)?,
            None => motion
                .confirm_window_secs
                .unwrap_or(DEFAULT_CONFIRM_WINDOW_SECS),
        };
        let max_missed_samples = match env("MOTION_CONFIRM_MISSES") {
            Some(v) => parse_number("MOTION_CONFIRM_MISSES", &v)?,
            None => motion.max_missed_samples.unwrap_or(DEFAULT_CONFIRM_MISSES),
        };
        let gate = GateSettings {
            confirm_window: seconds("confirm window", confirm_window)?,
            sample_interval: Duration::from_millis(
                motion.sample_ms.unwrap_or(DEFAULT_CONFIRM_SAMPLE_MS),
            ),
            max_missed_samples,
            min_motion_gap: seconds("minimum motion gap", min_gap)?,
        };

        let defaults = CameraSettings::default();
        let camera = CameraSettings {
            width: camera_file.width.unwrap_or(defaults.width),
            height: camera_file.height.unwrap_or(defaults.height),
            framerate: camera_file.framerate.unwrap_or(defaults.framerate),
            bitrate: camera_file.bitrate.unwrap_or(defaults.bitrate),
            warmup: Duration::from_secs(warmup_secs),
        };

        let output_dir = env("MOTION_OUTPUT_DIR")
            .map(PathBuf::from)
            .or(file.output_dir)
            .unwrap_or_else(|| default_output_dir(env));
        let max_attachment_bytes = match env("MOTION_MAX_ATTACHMENT_BYTES") {
            Some(v) => parse_number("MOTION_MAX_ATTACHMENT_BYTES", &v)?,
            None => file
                .max_attachment_bytes
                .unwrap_or(DEFAULT_MAX_ATTACHMENT_BYTES),
        };

        Ok(Self {
            smtp: SmtpSettings {
                host,
                port,
                username,
                password: Zeroizing::new(password),
            },
            email_from,
            email_to,
            clip_seconds,
            gate,
            output_dir,
            sensor: env("MOTION_SENSOR")
                .or(file.sensor)
                .unwrap_or_else(|| DEFAULT_SENSOR.to_string()),
            camera_source: env("MOTION_CAMERA")
                .or(camera_file.source)
                .unwrap_or_else(|| DEFAULT_CAMERA.to_string()),
            camera,
            ffmpeg: env("MOTION_FFMPEG")
                .or(file.ffmpeg)
                .unwrap_or_else(|| DEFAULT_FFMPEG_PROGRAM.to_string()),
            max_attachment_bytes,
        })
    }

    fn validate(&self) -> Result<()> {
        if self.clip_seconds == 0 {
            return Err(anyhow!("clip length must be greater than zero"));
        }
        if self.gate.confirm_window.is_zero() {
            return Err(anyhow!("confirm window must be greater than zero"));
        }
        if self.gate.sample_interval.is_zero() {
            return Err(anyhow!("confirm sample interval must be greater than zero"));
        }
        if self.smtp.port == 0 {
            return Err(anyhow!("SMTP_PORT must be greater than zero"));
        }
        if self.camera.framerate == 0 {
            return Err(anyhow!("camera framerate must be greater than zero"));
        }
        Ok(())
    }
}

fn default_output_dir(env: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    match env("HOME") {
        Some(home) => PathBuf::from(home).join(DEFAULT_OUTPUT_SUBDIR),
        None => PathBuf::from(DEFAULT_OUTPUT_SUBDIR),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a number (got '{}')", key, value))
}

fn seconds(what: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| anyhow!("{} must be a non-negative number of seconds", what))
}

fn read_config_file(path: &Path) -> Result<AgentConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
