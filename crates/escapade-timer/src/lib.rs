//! Countdown timers for Escapade rooms.
//!
//! Three pieces, leaves first:
//!
//! - [`Clock`] — monotonic time source ([`MonotonicClock`] in production,
//!   [`ManualClock`] in tests).
//! - [`TimerState`] — the per-room, per-kind countdown state machine.
//!   Remaining time is always derived from an anchor instant, never by
//!   decrementing a counter, so tick jitter cannot bias it.
//! - [`Ticker`] — a 1 Hz scheduler whose deadlines are aligned to that
//!   same anchor, with budget monitoring and skipped-tick reporting.
//!
//! # Integration
//!
//! The room actor owns one `TimerState` + `Ticker` pair per kind and
//! drives both from its `tokio::select!` loop:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         Some(cmd) = cmd_rx.recv() => { /* start → ticker.arm(anchor, now) */ }
//!         info = main.ticker.wait_for_tick() => {
//!             let outcome = main.state.tick(clock.now());
//!             main.ticker.record_tick_end();
//!         }
//!     }
//! }
//! ```

mod clock;
mod error;
mod state;
mod ticker;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::TimerError;
pub use state::{TickOutcome, TimerPhase, TimerSnapshot, TimerState};
pub use ticker::{TickConfig, TickInfo, TickMetrics, Ticker};
