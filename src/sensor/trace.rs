//! Scripted raw-signal traces.
//!
//! A trace is a list of `[start, end)` intervals, measured from the moment the
//! sensor was created, during which the raw signal is active. Waits jump the
//! shared clock straight to the next edge, so with a `ManualClock` a trace
//! spanning minutes runs instantly.

use anyhow::Result;
use std::time::{Duration, Instant};

use super::MotionSensor;
use crate::clock::SharedClock;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveSpan {
    pub start: Duration,
    pub end: Duration,
}

pub struct TraceSensor {
    clock: SharedClock,
    origin: Instant,
    spans: Vec<ActiveSpan>,
}

impl TraceSensor {
    pub fn new(clock: SharedClock) -> Self {
        let origin = clock.now();
        Self {
            clock,
            origin,
            spans: Vec::new(),
        }
    }

    /// Add an active interval starting at `start` and lasting `length`.
    pub fn active(mut self, start: Duration, length: Duration) -> Self {
        self.spans.push(ActiveSpan {
            start,
            end: start + length,
        });
        self.spans.sort_by_key(|span| span.start);
        self
    }

    /// Convenience for second-granularity traces.
    pub fn active_secs(self, start: f64, length: f64) -> Self {
        self.active(Duration::from_secs_f64(start), Duration::from_secs_f64(length))
    }

    fn offset(&self) -> Duration {
        self.clock.now().duration_since(self.origin)
    }

    fn span_at(&self, at: Duration) -> Option<&ActiveSpan> {
        self.spans
            .iter()
            .find(|span| span.start <= at && at < span.end)
    }

    fn next_start_after(&self, at: Duration) -> Option<Duration> {
        self.spans
            .iter()
            .map(|span| span.start)
            .find(|start| *start > at)
    }

    /// Sleep until `target` if it falls within `timeout`, otherwise sleep out
    /// the whole timeout.
    fn sleep_until(&self, now: Duration, target: Option<Duration>, timeout: Duration) -> bool {
        match target {
            Some(target) if target - now <= timeout => {
                self.clock.sleep(target - now);
                true
            }
            _ => {
                self.clock.sleep(timeout);
                false
            }
        }
    }
}

impl MotionSensor for TraceSensor {
    fn name(&self) -> String {
        format!("trace({} spans)", self.spans.len())
    }

    fn motion_detected(&mut self) -> Result<bool> {
        Ok(self.span_at(self.offset()).is_some())
    }

    fn wait_for_motion(&mut self, timeout: Duration) -> Result<bool> {
        let now = self.offset();
        if self.span_at(now).is_some() {
            return Ok(true);
        }
        let next = self.next_start_after(now);
        Ok(self.sleep_until(now, next, timeout))
    }

    fn wait_for_no_motion(&mut self, timeout: Duration) -> Result<bool> {
        let now = self.offset();
        let Some(span) = self.span_at(now).copied() else {
            return Ok(true);
        };
        // back-to-back spans keep the line high
        let mut end = span.end;
        while let Some(next) = self.span_at(end) {
            end = next.end;
        }
        Ok(self.sleep_until(now, Some(end), timeout))
    }
}
