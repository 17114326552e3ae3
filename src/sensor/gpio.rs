//! Sysfs GPIO PIR input.
//!
//! The PIR output is wired to a GPIO line configured as an input. A `1` on the
//! line means motion is currently sensed.
//!
//! Pins are given as BCM numbers. Sysfs numbers lines globally, so the pin is
//! offset by the `base` of the SoC pin controller chip (`pinctrl-*`), which
//! is 512 on a Pi 4 and 571 on a Pi 5 with 6.6+ kernels and 0 on older ones.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{poll_level, MotionSensor};
use crate::clock::{SharedClock, SystemClock};

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const EXPORT_SETTLE: Duration = Duration::from_millis(100);

pub struct SysfsGpioSensor {
    pin: u32,
    line: u32,
    value_path: PathBuf,
    clock: SharedClock,
}

impl SysfsGpioSensor {
    /// Export `pin` (if needed) and configure it as an input.
    pub fn open(pin: u32) -> Result<Self> {
        Self::open_at(PathBuf::from(SYSFS_GPIO_ROOT), pin, SystemClock::shared())
    }

    pub(crate) fn open_at(root: PathBuf, pin: u32, clock: SharedClock) -> Result<Self> {
        let base = pinctrl_base(&root)?;
        let line = base
            .checked_add(pin)
            .ok_or_else(|| anyhow!("gpio {pin} is out of range for chip base {base}"))?;
        let line_dir = root.join(format!("gpio{line}"));
        if !line_dir.exists() {
            fs::write(root.join("export"), line.to_string()).with_context(|| {
                format!("export gpio {pin} (line {line}) via {}", root.display())
            })?;
            // udev needs a moment to fix permissions on the new line
            clock.sleep(EXPORT_SETTLE);
        }
        let direction = line_dir.join("direction");
        if direction.exists() {
            fs::write(&direction, "in")
                .with_context(|| format!("set gpio {pin} direction to input"))?;
        }
        let value_path = line_dir.join("value");
        if !value_path.exists() {
            return Err(anyhow!(
                "gpio {} has no value file at {}",
                pin,
                value_path.display()
            ));
        }
        log::info!("SysfsGpioSensor: pir input on gpio {} (sysfs line {})", pin, line);
        Ok(Self {
            pin,
            line,
            value_path,
            clock,
        })
    }

    fn read_level(&self) -> Result<bool> {
        let raw = fs::read_to_string(&self.value_path)
            .with_context(|| format!("read gpio {} (line {}) value", self.pin, self.line))?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            other => Err(anyhow!("gpio {} reported unexpected value '{}'", self.pin, other)),
        }
    }
}

/// Base line number of the SoC pin controller, or 0 when sysfs exposes no
/// `pinctrl-*` chip. The RP1 controller wins on boards that carry several.
fn pinctrl_base(root: &Path) -> Result<u32> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e).with_context(|| format!("list {}", root.display())),
    };
    let mut chips = Vec::new();
    for entry in entries {
        let dir = entry?.path();
        let is_chip = dir
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("gpiochip"));
        if !is_chip {
            continue;
        }
        let Ok(label) = fs::read_to_string(dir.join("label")) else {
            continue;
        };
        let label = label.trim().to_string();
        if !label.starts_with("pinctrl-") {
            continue;
        }
        let base: u32 = fs::read_to_string(dir.join("base"))
            .with_context(|| format!("read base of {}", dir.display()))?
            .trim()
            .parse()
            .with_context(|| format!("parse base of {}", dir.display()))?;
        chips.push((label, base));
    }
    let chosen = chips
        .iter()
        .find(|(label, _)| label == "pinctrl-rp1")
        .or_else(|| chips.iter().min_by_key(|(_, base)| *base));
    Ok(chosen.map_or(0, |(_, base)| *base))
}

impl MotionSensor for SysfsGpioSensor {
    fn name(&self) -> String {
        format!("gpio:{}", self.pin)
    }

    fn motion_detected(&mut self) -> Result<bool> {
        self.read_level()
    }

    fn wait_for_motion(&mut self, timeout: Duration) -> Result<bool> {
        poll_level(&self.clock, POLL_INTERVAL, timeout, true, || self.read_level())
    }

    fn wait_for_no_motion(&mut self, timeout: Duration) -> Result<bool> {
        poll_level(&self.clock, POLL_INTERVAL, timeout, false, || self.read_level())
    }
}
