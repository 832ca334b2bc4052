//! The countdown state machine for one timer of one room.
//!
//! ```text
//!            start            remaining hits 0
//! Stopped ─────────→ Running ─────────────────→ Completed
//!    ↑                │   ↑                         │
//!    │ stop / reset   │   │ start                   │ start (fresh run)
//!    └────────────────┤   │                         │
//!                     ↓   │                         ↓
//!                    Paused                      Running
//! ```
//!
//! The state machine is pure: every operation takes `now` explicitly and
//! the owner (the room actor) arms or disarms the matching [`Ticker`]
//! from the result. Remaining time is `duration - floor(now - anchor)`,
//! so a late tick reports the right value instead of drifting.
//!
//! [`Ticker`]: crate::Ticker

use std::ops::RangeInclusive;

use tokio::time::Instant;

use crate::TimerError;

/// Derived lifecycle phase of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// Not running, full duration remaining.
    Stopped,
    /// Tick loop active.
    Running,
    /// Not running, part of the duration used.
    Paused,
    /// Not running, countdown reached zero.
    Completed,
}

/// A point-in-time view of a timer, as published to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub remaining: u64,
    pub duration: u64,
    pub running: bool,
    pub enabled: bool,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// Seconds left after this tick.
    pub remaining: u64,
    /// Whole seconds elapsed since the (virtual) start of the countdown.
    pub elapsed: u64,
    /// Every remaining-seconds value this tick accounts for. Normally just
    /// `remaining..=remaining`; wider when the tick woke up late enough for
    /// `remaining` to drop by more than one, so thresholds in the seconds
    /// in between are still seen.
    pub crossed: RangeInclusive<u64>,
    /// The countdown reached zero on this tick and stopped itself.
    pub completed: bool,
}

/// State of one countdown timer.
#[derive(Debug, Clone)]
pub struct TimerState {
    duration: u64,
    remaining: u64,
    running: bool,
    /// Instant of the last start/resume. Only set while running.
    start_time: Option<Instant>,
    /// Whole seconds already used when the countdown was last resumed.
    /// Elapsed time is `banked + floor(now - start_time)`.
    banked: u64,
    enabled: bool,
}

impl TimerState {
    /// A stopped, enabled timer. A zero duration is raised to one second
    /// so `duration > 0` always holds.
    pub fn new(duration_secs: u64) -> Self {
        let duration = duration_secs.max(1);
        Self {
            duration,
            remaining: duration,
            running: false,
            start_time: None,
            banked: 0,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Seconds used so far.
    pub fn elapsed(&self) -> u64 {
        self.duration - self.remaining
    }

    pub fn phase(&self) -> TimerPhase {
        if self.running {
            TimerPhase::Running
        } else if self.remaining == self.duration {
            TimerPhase::Stopped
        } else if self.remaining == 0 {
            TimerPhase::Completed
        } else {
            TimerPhase::Paused
        }
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            remaining: self.remaining,
            duration: self.duration,
            running: self.running,
            enabled: self.enabled,
        }
    }

    /// Starts or resumes the countdown.
    ///
    /// Returns the instant the tick loop must align its deadlines to, or `None`
    /// if the timer was already running (start is idempotent). Starting a
    /// completed timer begins a fresh countdown.
    pub fn start(&mut self, now: Instant) -> Option<Instant> {
        if self.running {
            return None;
        }
        if self.remaining == 0 {
            self.remaining = self.duration;
        }
        self.banked = self.duration - self.remaining;
        self.start_time = Some(now);
        self.running = true;
        Some(now)
    }

    /// Recomputes remaining time from the anchor.
    ///
    /// `crossed` spans every second between the previous tick and this one,
    /// however late this tick woke up. Returns `None` when the timer isn't
    /// running.
    pub fn tick(&mut self, now: Instant) -> Option<TickOutcome> {
        if !self.running {
            return None;
        }
        let previous = self.remaining;
        self.remaining = self.remaining_at(now);

        let upper = if previous > self.remaining {
            previous - 1
        } else {
            self.remaining
        };

        let completed = self.remaining == 0;
        if completed {
            self.running = false;
            self.start_time = None;
        }

        Some(TickOutcome {
            remaining: self.remaining,
            elapsed: self.elapsed(),
            crossed: self.remaining..=upper,
            completed,
        })
    }

    /// Freezes the countdown at its last computed value. Returns `false`
    /// (and does nothing) if the timer wasn't running.
    pub fn pause(&mut self) -> bool {
        if !self.running {
            return false;
        }
        self.running = false;
        self.start_time = None;
        true
    }

    /// Stops the countdown and restores the full duration.
    pub fn stop(&mut self) {
        self.running = false;
        self.start_time = None;
        self.remaining = self.duration;
    }

    /// Adds `amount` seconds (negative to remove) to the duration.
    ///
    /// A stopped timer keeps `remaining == duration`; a paused one moves
    /// `remaining` by the same amount; a running one re-derives it from
    /// the anchor. `remaining` is clamped to `[0, duration]` in every case.
    ///
    /// # Errors
    /// [`TimerError::AdjustRejected`] if the new duration would not be
    /// positive. The timer is left untouched.
    pub fn adjust(&mut self, amount: i64, now: Instant) -> Result<(), TimerError> {
        let new_duration = i128::from(self.duration) + i128::from(amount);
        if new_duration <= 0 {
            return Err(TimerError::AdjustRejected {
                duration: self.duration,
                amount,
            });
        }
        let new_duration = u64::try_from(new_duration).unwrap_or(u64::MAX);
        let phase = self.phase();
        self.duration = new_duration;

        self.remaining = match phase {
            TimerPhase::Stopped => new_duration,
            TimerPhase::Running => self.remaining_at(now),
            TimerPhase::Paused | TimerPhase::Completed => {
                let moved = i128::from(self.remaining) + i128::from(amount);
                u64::try_from(moved.max(0)).unwrap_or(u64::MAX)
            }
        }
        .min(new_duration);
        Ok(())
    }

    /// Stops the countdown, optionally replacing the duration (ignored
    /// unless positive), and restores the full duration.
    pub fn reset(&mut self, new_duration: Option<i64>) {
        if let Some(d) = new_duration.filter(|d| *d > 0) {
            self.duration = d as u64;
        }
        self.stop();
    }

    fn remaining_at(&self, now: Instant) -> u64 {
        let Some(anchor) = self.start_time else {
            return self.remaining;
        };
        let elapsed = self
            .banked
            .saturating_add(now.saturating_duration_since(anchor).as_secs());
        self.duration.saturating_sub(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Clock, ManualClock};

    fn running(duration: u64, clock: &ManualClock) -> TimerState {
        let mut t = TimerState::new(duration);
        assert!(t.start(clock.now()).is_some());
        t
    }

    #[test]
    fn test_new_timer_is_stopped_at_full_duration() {
        let t = TimerState::new(300);
        assert_eq!(t.phase(), TimerPhase::Stopped);
        assert_eq!(t.remaining(), 300);
        assert!(!t.is_running());
        assert!(t.is_enabled());
    }

    #[test]
    fn test_zero_duration_is_raised_to_one() {
        assert_eq!(TimerState::new(0).duration(), 1);
    }

    #[test]
    fn test_start_is_idempotent() {
        let clock = ManualClock::new();
        let mut t = running(300, &clock);
        clock.advance_secs(5);
        assert!(t.start(clock.now()).is_none());
        assert_eq!(t.tick(clock.now()).unwrap().remaining, 295);
    }

    #[test]
    fn test_tick_derives_remaining_from_anchor() {
        let clock = ManualClock::new();
        let mut t = running(300, &clock);

        clock.advance(std::time::Duration::from_millis(1000));
        let out = t.tick(clock.now()).unwrap();
        assert_eq!(out.remaining, 299);
        assert_eq!(out.elapsed, 1);
        assert_eq!(out.crossed, 299..=299);
        assert!(!out.completed);

        // A late tick (scheduler jitter) still reports wall-clock truth.
        clock.advance(std::time::Duration::from_millis(1900));
        assert_eq!(t.tick(clock.now()).unwrap().remaining, 298);
    }

    #[test]
    fn test_tick_when_not_running_is_none() {
        let clock = ManualClock::new();
        let mut t = TimerState::new(10);
        assert!(t.tick(clock.now()).is_none());
    }

    #[test]
    fn test_countdown_completes_once_and_stops() {
        let clock = ManualClock::new();
        let mut t = running(3, &clock);
        let mut completions = 0;
        for _ in 0..3 {
            clock.advance_secs(1);
            if t.tick(clock.now()).unwrap().completed {
                completions += 1;
            }
        }
        assert_eq!(completions, 1);
        assert_eq!(t.remaining(), 0);
        assert_eq!(t.phase(), TimerPhase::Completed);

        clock.advance_secs(1);
        assert!(t.tick(clock.now()).is_none(), "no ticks after completion");
    }

    #[test]
    fn test_remaining_never_goes_below_zero() {
        let clock = ManualClock::new();
        let mut t = running(2, &clock);
        clock.advance_secs(10);
        let out = t.tick(clock.now()).unwrap();
        assert_eq!(out.remaining, 0);
        assert!(out.completed);
    }

    #[test]
    fn test_skipped_ticks_widen_crossed_range() {
        let clock = ManualClock::new();
        let mut t = running(120, &clock);
        clock.advance_secs(1);
        t.tick(clock.now());

        // Scheduler stalled through two deadlines: 118 and 117 were skipped.
        clock.advance_secs(3);
        let out = t.tick(clock.now()).unwrap();
        assert_eq!(out.remaining, 116);
        assert_eq!(out.crossed, 116..=118);
    }

    #[test]
    fn test_late_wakeup_within_one_period_still_covers_every_second() {
        // The ticker's deadlines carry a sub-second phase, so a wake-up can
        // be late by almost a full period without counting as a skip.
        let clock = ManualClock::new();
        let mut t = running(120, &clock);

        clock.advance(std::time::Duration::from_millis(2000));
        let out = t.tick(clock.now()).unwrap();
        assert_eq!(out.remaining, 118);
        assert_eq!(out.crossed, 118..=119);

        // The next on-time tick doesn't re-cover 119 or invent new seconds.
        clock.advance(std::time::Duration::from_millis(1));
        let out = t.tick(clock.now()).unwrap();
        assert_eq!(out.remaining, 118);
        assert_eq!(out.crossed, 118..=118);

        clock.advance(std::time::Duration::from_millis(999));
        assert_eq!(t.tick(clock.now()).unwrap().crossed, 117..=117);
    }

    #[test]
    fn test_pause_then_start_preserves_remaining() {
        let clock = ManualClock::new();
        let mut t = running(120, &clock);
        clock.advance_secs(30);
        t.tick(clock.now());
        assert!(t.pause());
        assert_eq!(t.phase(), TimerPhase::Paused);

        clock.advance_secs(500);
        assert_eq!(t.remaining(), 90, "paused timers don't move");

        t.start(clock.now());
        assert_eq!(t.remaining(), 90);
        clock.advance_secs(1);
        assert_eq!(t.tick(clock.now()).unwrap().remaining, 89);
    }

    #[test]
    fn test_pause_when_not_running_is_noop() {
        let mut t = TimerState::new(60);
        assert!(!t.pause());
        assert_eq!(t.phase(), TimerPhase::Stopped);
    }

    #[test]
    fn test_stop_restores_duration() {
        let clock = ManualClock::new();
        let mut t = running(300, &clock);
        clock.advance_secs(12);
        t.tick(clock.now());
        t.stop();
        assert_eq!(t.remaining(), 300);
        assert_eq!(t.phase(), TimerPhase::Stopped);
    }

    #[test]
    fn test_adjust_stopped_moves_duration_and_remaining() {
        let clock = ManualClock::new();
        let mut t = TimerState::new(300);
        t.adjust(60, clock.now()).unwrap();
        assert_eq!(t.duration(), 360);
        assert_eq!(t.remaining(), 360);
    }

    #[test]
    fn test_adjust_to_non_positive_is_rejected_without_change() {
        let clock = ManualClock::new();
        let mut t = TimerState::new(300);
        let err = t.adjust(-300, clock.now()).unwrap_err();
        assert_eq!(
            err,
            TimerError::AdjustRejected {
                duration: 300,
                amount: -300
            }
        );
        assert_eq!(t.duration(), 300);
        assert_eq!(t.remaining(), 300);
    }

    #[test]
    fn test_adjust_running_rederives_from_anchor() {
        let clock = ManualClock::new();
        let mut t = running(300, &clock);
        clock.advance_secs(10);
        t.tick(clock.now());

        t.adjust(60, clock.now()).unwrap();
        assert_eq!(t.duration(), 360);
        assert_eq!(t.remaining(), 350);
        assert!(t.is_running());

        clock.advance_secs(1);
        assert_eq!(t.tick(clock.now()).unwrap().remaining, 349);
    }

    #[test]
    fn test_adjust_paused_moves_remaining_clamped() {
        let clock = ManualClock::new();
        let mut t = running(100, &clock);
        clock.advance_secs(40);
        t.tick(clock.now());
        t.pause();

        t.adjust(-50, clock.now()).unwrap();
        assert_eq!(t.duration(), 50);
        assert_eq!(t.remaining(), 10);

        t.adjust(-20, clock.now()).unwrap();
        assert_eq!(t.duration(), 30);
        assert_eq!(t.remaining(), 0);
    }

    #[test]
    fn test_reset_with_and_without_new_duration() {
        let clock = ManualClock::new();
        let mut t = running(300, &clock);
        clock.advance_secs(20);
        t.tick(clock.now());

        t.reset(None);
        assert_eq!(t.snapshot(), TimerSnapshot {
            remaining: 300,
            duration: 300,
            running: false,
            enabled: true,
        });

        t.reset(Some(1800));
        assert_eq!(t.duration(), 1800);
        assert_eq!(t.remaining(), 1800);

        t.reset(Some(-5));
        assert_eq!(t.duration(), 1800, "non-positive durations are ignored");
    }

    #[test]
    fn test_start_after_completion_begins_fresh_run() {
        let clock = ManualClock::new();
        let mut t = running(2, &clock);
        clock.advance_secs(2);
        assert!(t.tick(clock.now()).unwrap().completed);

        t.start(clock.now());
        assert_eq!(t.remaining(), 2);
        clock.advance_secs(1);
        assert_eq!(t.tick(clock.now()).unwrap().remaining, 1);
    }
}
