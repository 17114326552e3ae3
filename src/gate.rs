//! Motion gate: raw PIR transitions → trusted motion events.
//!
//! Two independent filters run on every raw "motion started" transition:
//!
//! 1. **Cooldown**: if the last accepted event is younger than the minimum
//!    gap, the trigger is suppressed without sampling.
//! 2. **Confirmation**: the raw signal is sampled at a fine interval across
//!    the confirmation window and must persist through it. Isolated missed
//!    samples (flicker below the sampling granularity) are tolerated; a run of
//!    inactive samples longer than the tolerance rejects the trigger as a
//!    transient.
//!
//! The gate never mutates cooldown state. The orchestrator records an alert
//! for a confirmed event once its recording has started, stamped with the
//! confirmation time; an event whose camera never started leaves no cooldown.
//!
//! The stream of confirmed events is pulled lazily, one raw trigger at a
//! time: see [`MotionGate::next_event`]. The orchestrator drives the same
//! steps itself so it can report each decision.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::time::{Duration, Instant};

use crate::clock::SharedClock;
use crate::sensor::MotionSensor;

/// A confirmed motion event, consumed immediately by the orchestrator.
#[derive(Clone, Debug)]
pub struct MotionEvent {
    pub detected_at: DateTime<Local>,
    pub detected_instant: Instant,
    pub confirmed: bool,
}

/// Time of the last accepted event.
///
/// Only moves forward; an earlier timestamp never replaces a later one.
#[derive(Clone, Copy, Debug, Default)]
pub struct CooldownState {
    last_alert_at: Option<Instant>,
}

impl CooldownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_alert_at(&self) -> Option<Instant> {
        self.last_alert_at
    }

    /// True while `now` is within `min_gap` of the last accepted event.
    pub fn is_active(&self, now: Instant, min_gap: Duration) -> bool {
        match self.last_alert_at {
            Some(last) => now.saturating_duration_since(last) < min_gap,
            None => false,
        }
    }

    pub fn record_alert(&mut self, at: Instant) {
        self.last_alert_at = Some(match self.last_alert_at {
            Some(last) if last > at => last,
            _ => at,
        });
    }
}

/// Outcome of evaluating one raw trigger.
#[derive(Clone, Debug)]
pub enum GateDecision {
    /// Suppressed by cooldown; confirmation was not attempted.
    CooldownBlocked,
    /// No active sample inside the confirmation window.
    Rejected,
    Confirmed(MotionEvent),
}

#[derive(Clone, Copy, Debug)]
pub struct GateSettings {
    pub confirm_window: Duration,
    pub sample_interval: Duration,
    /// Consecutive inactive samples tolerated inside the window.
    pub max_missed_samples: u32,
    pub min_motion_gap: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            confirm_window: Duration::from_secs(1),
            sample_interval: Duration::from_millis(50),
            max_missed_samples: 1,
            min_motion_gap: Duration::from_secs(15),
        }
    }
}

pub struct MotionGate {
    settings: GateSettings,
    clock: SharedClock,
}

impl MotionGate {
    pub fn new(settings: GateSettings, clock: SharedClock) -> Self {
        Self { settings, clock }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    /// Decide what to do with a raw trigger that has just been observed.
    pub fn evaluate(
        &self,
        sensor: &mut dyn MotionSensor,
        cooldown: &CooldownState,
    ) -> Result<GateDecision> {
        if cooldown.is_active(self.clock.now(), self.settings.min_motion_gap) {
            return Ok(GateDecision::CooldownBlocked);
        }
        if !self.confirm(sensor)? {
            return Ok(GateDecision::Rejected);
        }
        Ok(GateDecision::Confirmed(MotionEvent {
            detected_at: self.clock.local_now(),
            detected_instant: self.clock.now(),
            confirmed: true,
        }))
    }

    /// Pull the next confirmed event from `sensor`.
    ///
    /// Waits up to `timeout` for a raw trigger and evaluates it. Whatever the
    /// decision, the raw signal must drop again before this returns, so one
    /// trigger yields at most one event. `Ok(None)` means no trigger arrived,
    /// or the trigger was suppressed or rejected. The caller records the
    /// alert in `cooldown` once it acts on the event.
    pub fn next_event(
        &self,
        sensor: &mut dyn MotionSensor,
        cooldown: &CooldownState,
        timeout: Duration,
    ) -> Result<Option<MotionEvent>> {
        if !sensor.wait_for_motion(timeout)? {
            return Ok(None);
        }
        let decision = self.evaluate(sensor, cooldown)?;
        while !sensor.wait_for_no_motion(timeout)? {}
        match decision {
            GateDecision::Confirmed(event) => Ok(Some(event)),
            GateDecision::CooldownBlocked | GateDecision::Rejected => Ok(None),
        }
    }

    /// Sample the raw signal across the confirmation window.
    ///
    /// Confirms when the window closes with at least one active sample and no
    /// dropout longer than `max_missed_samples`. Rejects as soon as a dropout
    /// exceeds the tolerance.
    pub fn confirm(&self, sensor: &mut dyn MotionSensor) -> Result<bool> {
        let started = self.clock.now();
        let mut seen_active = false;
        let mut missed = 0u32;
        while self.clock.now().duration_since(started) < self.settings.confirm_window {
            if sensor.motion_detected()? {
                seen_active = true;
                missed = 0;
            } else {
                missed += 1;
                if missed > self.settings.max_missed_samples {
                    return Ok(false);
                }
            }
            self.clock.sleep(self.settings.sample_interval);
        }
        Ok(seen_active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::sensor::TraceSensor;

    fn gate(clock: SharedClock) -> MotionGate {
        MotionGate::new(GateSettings::default(), clock)
    }

    #[test]
    fn cooldown_is_inactive_before_first_alert() {
        let cooldown = CooldownState::new();
        assert!(!cooldown.is_active(Instant::now(), Duration::from_secs(15)));
    }

    #[test]
    fn cooldown_never_moves_backwards() {
        let now = Instant::now();
        let mut cooldown = CooldownState::new();
        cooldown.record_alert(now + Duration::from_secs(10));
        cooldown.record_alert(now);
        assert_eq!(cooldown.last_alert_at(), Some(now + Duration::from_secs(10)));
    }

    #[test]
    fn sustained_signal_is_confirmed_after_window() -> Result<()> {
        let manual = ManualClock::shared();
        let mut sensor = TraceSensor::new(manual.clone()).active_secs(0.0, 2.0);
        let decision = gate(manual.clone()).evaluate(&mut sensor, &CooldownState::new())?;

        assert!(matches!(decision, GateDecision::Confirmed(ref ev) if ev.confirmed));
        assert_eq!(manual.elapsed(), Duration::from_secs(1));
        Ok(())
    }

    #[test]
    fn short_blip_is_rejected_early() -> Result<()> {
        let manual = ManualClock::shared();
        let mut sensor = TraceSensor::new(manual.clone()).active_secs(0.0, 0.2);
        let decision = gate(manual.clone()).evaluate(&mut sensor, &CooldownState::new())?;

        assert!(matches!(decision, GateDecision::Rejected));
        // 200 ms and 250 ms samples are the two misses
        assert_eq!(manual.elapsed(), Duration::from_millis(250));
        Ok(())
    }

    #[test]
    fn single_missed_sample_is_tolerated() -> Result<()> {
        let manual = ManualClock::shared();
        let mut sensor = TraceSensor::new(manual.clone())
            .active(Duration::ZERO, Duration::from_millis(500))
            .active(Duration::from_millis(550), Duration::from_millis(1450));
        assert!(gate(manual.clone()).confirm(&mut sensor)?);
        Ok(())
    }

    #[test]
    fn sustained_dropout_rejects() -> Result<()> {
        let manual = ManualClock::shared();
        let mut sensor = TraceSensor::new(manual.clone())
            .active(Duration::ZERO, Duration::from_millis(500))
            .active(Duration::from_millis(600), Duration::from_millis(1400));
        assert!(!gate(manual.clone()).confirm(&mut sensor)?);
        Ok(())
    }

    #[test]
    fn activity_starting_late_does_not_confirm() -> Result<()> {
        let manual = ManualClock::shared();
        let mut sensor = TraceSensor::new(manual.clone()).active_secs(0.6, 1.0);
        assert!(!gate(manual.clone()).confirm(&mut sensor)?);
        Ok(())
    }

    #[test]
    fn wider_tolerance_rides_out_longer_dropouts() -> Result<()> {
        let manual = ManualClock::shared();
        let settings = GateSettings {
            max_missed_samples: 3,
            ..GateSettings::default()
        };
        let mut sensor = TraceSensor::new(manual.clone())
            .active(Duration::ZERO, Duration::from_millis(500))
            .active(Duration::from_millis(600), Duration::from_millis(1400));
        assert!(MotionGate::new(settings, manual.clone()).confirm(&mut sensor)?);
        Ok(())
    }

    #[test]
    fn cooldown_skips_confirmation_sampling() -> Result<()> {
        let manual = ManualClock::shared();
        let mut cooldown = CooldownState::new();
        cooldown.record_alert(manual.now());
        manual.advance(Duration::from_secs(5));

        let mut sensor = TraceSensor::new(manual.clone()).active_secs(0.0, 10.0);
        let decision = gate(manual.clone()).evaluate(&mut sensor, &cooldown)?;

        assert!(matches!(decision, GateDecision::CooldownBlocked));
        assert_eq!(manual.elapsed(), Duration::from_secs(5));
        Ok(())
    }

    #[test]
    fn cooldown_expires_after_gap() -> Result<()> {
        let manual = ManualClock::shared();
        let mut cooldown = CooldownState::new();
        cooldown.record_alert(manual.now());
        manual.advance(Duration::from_secs(15));

        let mut sensor = TraceSensor::new(manual.clone()).active_secs(0.0, 1.0);
        let decision = gate(manual.clone()).evaluate(&mut sensor, &cooldown)?;
        assert!(matches!(decision, GateDecision::Confirmed(_)));
        Ok(())
    }

    #[test]
    fn event_sequence_yields_one_event_per_accepted_trigger() -> Result<()> {
        let manual = ManualClock::shared();
        let mut sensor = TraceSensor::new(manual.clone())
            .active_secs(0.0, 2.0)
            .active_secs(5.0, 2.0)
            .active_secs(10.0, 0.2)
            .active_secs(30.0, 2.0);
        let gate = gate(manual.clone());
        let mut cooldown = CooldownState::new();
        let mut accepted = Vec::new();

        while manual.elapsed() < Duration::from_secs(40) {
            let next = gate.next_event(&mut sensor, &cooldown, Duration::from_millis(250))?;
            if let Some(event) = next {
                cooldown.record_alert(event.detected_instant);
                accepted.push(manual.elapsed());
            }
        }

        // the 5 s trigger is inside the cooldown, the 10 s blip is rejected
        assert_eq!(accepted.len(), 2);
        assert!(accepted[0] < Duration::from_secs(3));
        assert!(accepted[1] >= Duration::from_secs(31));
        Ok(())
    }
}
