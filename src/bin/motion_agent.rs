//! motion_agent - PIR-triggered clip recorder and mailer
//!
//! This daemon:
//! 1. Loads configuration (JSON file + environment), aborting on missing keys
//! 2. Opens the PIR sensor and warms up the camera
//! 3. Waits for confirmed, cooldown-respecting motion
//! 4. Records a fixed-length clip and re-muxes it to MP4
//! 5. Emails the clip to the configured recipients
//! 6. Releases the camera and exits 0 on Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use motion_mailer::{build_agent, AgentConfig, SystemClock};

#[derive(Parser, Debug)]
#[command(author, version, about = "Record and email a clip on every confirmed PIR trigger")]
struct Args {
    /// JSON config file. Environment variables override its values.
    #[arg(long, env = "MOTION_CONFIG")]
    config: Option<PathBuf>,

    /// Validate configuration and exit without touching hardware.
    #[arg(long)]
    check_config: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = AgentConfig::load_from(args.config.as_deref(), |key| std::env::var(key).ok())?;
    if args.check_config {
        log::info!(
            "configuration ok: relay {}:{}, {} recipient(s), sensor {}, camera {}",
            cfg.smtp.host,
            cfg.smtp.port,
            cfg.email_to.len(),
            cfg.sensor,
            cfg.camera_source
        );
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    let mut agent = build_agent(&cfg, SystemClock::shared())?;
    agent.warm_up()?;

    log::info!("motion sensor camera running");
    log::info!("saving clips to {}", cfg.output_dir.display());
    log::info!("waiting for motion... (Ctrl-C to stop)");

    let stats = agent.run(&shutdown)?;
    log::info!(
        "stopping: {} trigger(s), {} clip(s), {} email(s) sent, {} failure(s)",
        stats.triggers,
        stats.recorded,
        stats.notified,
        stats.record_failures + stats.notify_failures
    );
    Ok(())
}
