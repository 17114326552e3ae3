//! Time sources.
//!
//! Every component that waits does so through a [`Clock`], so the temporal
//! logic of the pipeline (confirmation windows, cooldown, fixed-length
//! recording) can be driven by a virtual clock in tests.

use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic + wall clock with a blocking sleep.
pub trait Clock: Send + Sync {
    /// Monotonic instant used for windows and cooldown arithmetic.
    fn now(&self) -> Instant;

    /// Wall-clock time used for clip names and message text.
    fn local_now(&self) -> DateTime<Local>;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

pub type SharedClock = Arc<dyn Clock>;

/// Real clock backed by `Instant`, `chrono::Local` and `thread::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn local_now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock: `sleep` advances time instantly.
///
/// Both the monotonic and the wall reading move together, so a clip stamped
/// after a 15 s recording is stamped 15 s later than the trigger.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    wall_origin: DateTime<Local>,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            wall_origin: Local::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn shared() -> Arc<ManualClock> {
        Arc::new(Self::new())
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn advance(&self, duration: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += duration;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn local_now(&self) -> DateTime<Local> {
        let elapsed =
            chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::zero());
        self.wall_origin + elapsed
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

/// Clip timestamp format, e.g. `2024-05-01_13-45-09`.
pub const STAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

pub fn stamp(at: &DateTime<Local>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_sleep_advances_both_readings() {
        let clock = ManualClock::new();
        let start = clock.now();
        let wall_start = clock.local_now();

        clock.sleep(Duration::from_secs(15));

        assert_eq!(clock.now() - start, Duration::from_secs(15));
        assert_eq!((clock.local_now() - wall_start).num_seconds(), 15);
        assert_eq!(clock.elapsed(), Duration::from_secs(15));
    }

    #[test]
    fn stamp_uses_sortable_format() {
        let at = chrono::NaiveDate::from_ymd_opt(2024, 5, 1)
            .and_then(|d| d.and_hms_opt(13, 45, 9))
            .and_then(|dt| dt.and_local_timezone(Local).single())
            .expect("valid local time");
        assert_eq!(stamp(&at), "2024-05-01_13-45-09");
    }
}
