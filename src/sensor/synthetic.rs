//! Synthetic PIR source for dry runs (`stub://` sources).
//!
//! Simulates a scene with periodic motion: the raw signal is active for
//! `active` at the start of every `period`, beginning one `idle` gap after the
//! source is opened.

use anyhow::Result;
use std::time::{Duration, Instant};

use super::{poll_level, MotionSensor};
use crate::clock::SharedClock;

const DEFAULT_PERIOD: Duration = Duration::from_secs(60);
const DEFAULT_ACTIVE: Duration = Duration::from_secs(3);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct SyntheticSensor {
    source: String,
    clock: SharedClock,
    opened_at: Instant,
    period: Duration,
    active: Duration,
}

impl SyntheticSensor {
    pub fn new(source: &str, clock: SharedClock) -> Self {
        Self::with_cycle(source, clock, DEFAULT_PERIOD, DEFAULT_ACTIVE)
    }

    pub fn with_cycle(
        source: &str,
        clock: SharedClock,
        period: Duration,
        active: Duration,
    ) -> Self {
        let opened_at = clock.now();
        log::info!(
            "SyntheticSensor: {} pulses {:?} every {:?}",
            source,
            active,
            period
        );
        Self {
            source: source.to_string(),
            clock,
            opened_at,
            period: period.max(Duration::from_millis(1)),
            active: active.min(period),
        }
    }

    fn level(&self) -> bool {
        let since = self.clock.now().duration_since(self.opened_at);
        if since < self.period {
            return false;
        }
        let phase = since.as_nanos() % self.period.as_nanos();
        phase < self.active.as_nanos()
    }
}

impl MotionSensor for SyntheticSensor {
    fn name(&self) -> String {
        self.source.clone()
    }

    fn motion_detected(&mut self) -> Result<bool> {
        Ok(self.level())
    }

    fn wait_for_motion(&mut self, timeout: Duration) -> Result<bool> {
        poll_level(&self.clock, POLL_INTERVAL, timeout, true, || Ok(self.level()))
    }

    fn wait_for_no_motion(&mut self, timeout: Duration) -> Result<bool> {
        poll_level(&self.clock, POLL_INTERVAL, timeout, false, || Ok(self.level()))
    }
}
