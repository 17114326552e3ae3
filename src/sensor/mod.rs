//! Motion sensor sources.
//!
//! This module provides the raw PIR signal to the motion gate:
//! - Sysfs GPIO input (`gpio:<pin>`, the production path)
//! - Synthetic pulses (`stub://...`, dry runs without hardware)
//! - Scripted traces (tests)
//!
//! Sensors only report the instantaneous raw signal and wait for edges.
//! Debouncing, confirmation and cooldown are decided by the gate, never here.

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::clock::SharedClock;

pub mod gpio;
pub mod synthetic;
pub mod trace;

pub use gpio::SysfsGpioSensor;
pub use synthetic::SyntheticSensor;
pub use trace::TraceSensor;

/// Raw motion sensor.
///
/// Edge waits are bounded by `timeout` so the caller can observe shutdown
/// requests between waits. They return `true` when the awaited level was
/// reached and `false` when the timeout elapsed first.
pub trait MotionSensor: Send {
    /// Sensor identifier for logs.
    fn name(&self) -> String;

    /// Instantaneous raw signal: `true` while motion is sensed.
    fn motion_detected(&mut self) -> Result<bool>;

    /// Block until the raw signal is active.
    fn wait_for_motion(&mut self, timeout: Duration) -> Result<bool>;

    /// Block until the raw signal is inactive.
    fn wait_for_no_motion(&mut self, timeout: Duration) -> Result<bool>;
}

/// Build a sensor from a source string (`gpio:17`, `stub://porch`).
pub fn open_sensor(source: &str, clock: SharedClock) -> Result<Box<dyn MotionSensor>> {
    if source.starts_with("stub://") {
        return Ok(Box::new(SyntheticSensor::new(source, clock)));
    }
    if let Some(pin) = source.strip_prefix("gpio:") {
        let pin: u32 = pin
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid gpio pin in sensor source '{}'", source))?;
        return Ok(Box::new(SysfsGpioSensor::open(pin)?));
    }
    Err(anyhow!(
        "unsupported sensor source '{}' (expected gpio:<pin> or stub://<name>)",
        source
    ))
}

/// Poll `sample` until it returns `want` or `timeout` elapses.
pub(crate) fn poll_level<F>(
    clock: &SharedClock,
    interval: Duration,
    timeout: Duration,
    want: bool,
    mut sample: F,
) -> Result<bool>
where
    F: FnMut() -> Result<bool>,
{
    let started = clock.now();
    loop {
        if sample()? == want {
            return Ok(true);
        }
        if clock.now().duration_since(started) >= timeout {
            return Ok(false);
        }
        clock.sleep(interval);
    }
}
