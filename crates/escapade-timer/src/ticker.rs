//! Anchor-aligned tick scheduler.
//!
//! A [`Ticker`] fires at `anchor + phase + k × period` for k = 1, 2, …
//! where `anchor` is the instant the timer was (re)started. Deadlines are
//! computed from the anchor rather than from the previous wake-up, so a
//! late wake-up never pushes later ticks back.
//!
//! A disarmed ticker's [`Ticker::wait_for_tick`] pends forever, which is
//! what lets a room actor keep it as a permanent `tokio::select!` branch.

use std::time::{Duration, Instant as StdInstant};

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for a [`Ticker`].
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks. Countdown timers use one second.
    pub period: Duration,
    /// Budget warning threshold (0.0–1.0) as a fraction of `period`.
    /// A tracing warning is emitted when the work done for one tick
    /// (snapshot, trigger evaluation, dispatch) exceeds it.
    pub budget_warn_threshold: f64,
    /// Budget critical threshold (0.0–1.0).
    pub budget_critical_threshold: f64,
    /// Enable per-tick metrics collection.
    pub metrics_enabled: bool,
    /// Random phase offset (0–max µs) added to every deadline of an armed
    /// ticker, so rooms started by the same command don't all wake in the
    /// same instant. Must stay well below `period`.
    pub initial_jitter_us: u64,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            budget_warn_threshold: 0.50,
            budget_critical_threshold: 1.0,
            metrics_enabled: true,
            initial_jitter_us: 2_000,
        }
    }
}

impl TickConfig {
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            ..Default::default()
        }
    }

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// - `period` raised to at least [`Self::MIN_PERIOD`].
    /// - Thresholds clamped to `0.0..=1.0`, warn ≤ critical.
    /// - Jitter capped at a tenth of the period.
    pub fn validated(mut self) -> Self {
        if self.period < Self::MIN_PERIOD {
            warn!(period = ?self.period, "tick period below minimum, clamping");
            self.period = Self::MIN_PERIOD;
        }
        self.budget_warn_threshold = self.budget_warn_threshold.clamp(0.0, 1.0);
        self.budget_critical_threshold = self.budget_critical_threshold.clamp(0.0, 1.0);
        if self.budget_warn_threshold > self.budget_critical_threshold {
            self.budget_warn_threshold = self.budget_critical_threshold;
        }
        let max_jitter = (self.period.as_micros() / 10) as u64;
        self.initial_jitter_us = self.initial_jitter_us.min(max_jitter);
        self
    }
}

// ---------------------------------------------------------------------------
// Tick info
// ---------------------------------------------------------------------------

/// Information about a fired tick, returned by [`Ticker::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Ticks fired since the ticker was last armed (starts at 1).
    pub tick: u64,
    /// Whole periods the wake-up was late by. Those deadlines were not
    /// fired individually; callers catch up from this count.
    pub ticks_skipped: u64,
    /// `true` if the wake-up was more than 10% of a period late.
    pub overrun: bool,
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Runtime metrics for a ticker. Survive disarm/arm cycles.
#[derive(Debug, Clone, Default)]
pub struct TickMetrics {
    pub total_ticks: u64,
    pub total_overruns: u64,
    pub total_skipped: u64,
    /// Exponential moving average of per-tick work (α = 0.1).
    pub avg_tick_time: Duration,
    pub max_tick_time: Duration,
    /// Last per-tick work as a fraction of the period.
    pub budget_utilization: f64,
}

// ---------------------------------------------------------------------------
// Ticker
// ---------------------------------------------------------------------------

/// Drives one countdown timer. One per room per timer kind.
pub struct Ticker {
    config: TickConfig,
    anchor: Option<Instant>,
    phase: Duration,
    next_tick: Option<Instant>,
    tick_count: u64,
    /// Set by `wait_for_tick`, consumed by `record_tick_end`.
    tick_start: Option<StdInstant>,
    metrics: TickMetrics,
}

impl Ticker {
    /// Creates a disarmed ticker.
    pub fn new(config: TickConfig) -> Self {
        let config = config.validated();
        debug!(period = ?config.period, "ticker created");
        Self {
            config,
            anchor: None,
            phase: Duration::ZERO,
            next_tick: None,
            tick_count: 0,
            tick_start: None,
            metrics: TickMetrics::default(),
        }
    }

    /// Arms the ticker so its deadlines line up with `anchor`.
    ///
    /// The first deadline is the first `anchor + phase + k × period`
    /// strictly after `now`. Re-arming an armed ticker replaces its
    /// schedule; there is never more than one.
    pub fn arm(&mut self, anchor: Instant, now: Instant) {
        self.phase = if self.config.initial_jitter_us > 0 {
            Duration::from_micros(rand::rng().random_range(0..self.config.initial_jitter_us))
        } else {
            Duration::ZERO
        };
        let periods = now.saturating_duration_since(anchor).as_nanos()
            / self.config.period.as_nanos();
        let k = u32::try_from(periods).unwrap_or(u32::MAX - 1) + 1;
        self.anchor = Some(anchor);
        self.next_tick = Some(anchor + self.phase + self.config.period * k);
        self.tick_count = 0;
        trace!(?anchor, phase = ?self.phase, "ticker armed");
    }

    /// Cancels the schedule. Takes effect immediately: a disarmed ticker
    /// never fires, even if its deadline has already passed.
    pub fn disarm(&mut self) {
        if self.anchor.take().is_some() {
            self.next_tick = None;
            self.tick_start = None;
            trace!(ticks = self.tick_count, "ticker disarmed");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.anchor.is_some()
    }

    /// Waits until the next deadline. Pends forever while disarmed.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let Some(next) = self.next_tick else {
            return std::future::pending().await;
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        self.tick_count += 1;
        self.tick_start = Some(StdInstant::now());

        let period = self.config.period;
        let late_by = now.saturating_duration_since(next);
        let overrun = late_by > period / 10;
        let ticks_skipped = (late_by.as_nanos() / period.as_nanos()) as u64;
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "tick overrun, skipping ahead"
            );
        }

        // Stay on the anchor's grid.
        let advance = u32::try_from(ticks_skipped + 1).unwrap_or(u32::MAX);
        self.next_tick = Some(next + period * advance);

        if overrun {
            self.metrics.total_overruns += 1;
        }
        self.metrics.total_skipped += ticks_skipped;
        self.metrics.total_ticks += 1;

        trace!(tick = self.tick_count, overrun, "tick fired");

        TickInfo {
            tick: self.tick_count,
            ticks_skipped,
            overrun,
        }
    }

    /// Records that the work for the current tick has finished.
    ///
    /// Call this after the tick's snapshot and trigger evaluation are
    /// done to enable budget monitoring and metrics.
    pub fn record_tick_end(&mut self) {
        let Some(start) = self.tick_start.take() else {
            return;
        };
        let elapsed = start.elapsed();
        let budget = self.config.period;
        let utilization = elapsed.as_secs_f64() / budget.as_secs_f64();
        self.metrics.budget_utilization = utilization;

        if utilization >= self.config.budget_critical_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "CRITICAL: tick work exceeded period"
            );
        } else if utilization >= self.config.budget_warn_threshold {
            warn!(
                tick = self.tick_count,
                elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                utilization_pct = format!("{:.1}", utilization * 100.0),
                "tick work approaching period"
            );
        }

        if self.config.metrics_enabled {
            if elapsed > self.metrics.max_tick_time {
                self.metrics.max_tick_time = elapsed;
            }
            let alpha = 0.1;
            let prev = self.metrics.avg_tick_time.as_secs_f64();
            let curr = elapsed.as_secs_f64();
            self.metrics.avg_tick_time = Duration::from_secs_f64(prev * (1.0 - alpha) + curr * alpha);
        }
    }

    /// Ticks fired since the last `arm`.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn metrics(&self) -> &TickMetrics {
        &self.metrics
    }

    pub fn period(&self) -> Duration {
        self.config.period
    }

    /// The next deadline, if armed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_tick
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(TickConfig::default())
    }
}
