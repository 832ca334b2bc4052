//! Engine-wide settings shared by every room.

use std::time::Duration;

use escapade_timer::TickConfig;
use tracing::warn;

/// Settings for the room engine.
///
/// Construct with `EngineConfig { field: .., ..Default::default() }` and
/// pass it through [`EngineConfig::validated`] before use; the registry
/// does this itself.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether `reset` forgets which time triggers already fired. When
    /// `false`, a trigger that fired stays spent until the room is torn
    /// down.
    pub clear_triggers_on_reset: bool,

    /// Countdown tick period.
    pub tick_interval: Duration,

    /// How often the write-behind queue flushes dirty rooms.
    pub persist_interval: Duration,

    /// Per-attempt timeout for webhook deliveries.
    pub webhook_timeout: Duration,

    /// Delay before the single webhook retry.
    pub webhook_retry_delay: Duration,

    /// Webhook jobs buffered before new ones are dropped.
    pub webhook_queue_size: usize,

    /// Webhook deliveries in flight at once. Further jobs wait in the
    /// queue.
    pub webhook_concurrency: usize,

    /// Room actor command channel capacity.
    pub command_channel_size: usize,

    /// Main timer duration for records that don't set one.
    pub default_main_duration: u64,

    /// Secondary timer duration for records that don't set one.
    pub default_secondary_duration: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            clear_triggers_on_reset: false,
            tick_interval: Duration::from_secs(1),
            persist_interval: Duration::from_secs(5),
            webhook_timeout: Duration::from_secs(5),
            webhook_retry_delay: Duration::from_secs(1),
            webhook_queue_size: 256,
            webhook_concurrency: 8,
            command_channel_size: 64,
            default_main_duration: 3600,
            default_secondary_duration: 600,
        }
    }
}

impl EngineConfig {
    /// Clamps out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        if self.tick_interval < TickConfig::MIN_PERIOD {
            warn!(tick_interval = ?self.tick_interval, "tick interval below minimum, clamping");
            self.tick_interval = TickConfig::MIN_PERIOD;
        }
        if self.persist_interval.is_zero() {
            warn!("persist interval is zero, using 1s");
            self.persist_interval = Duration::from_secs(1);
        }
        if self.webhook_timeout.is_zero() {
            self.webhook_timeout = Duration::from_secs(5);
        }
        self.webhook_queue_size = self.webhook_queue_size.max(1);
        self.webhook_concurrency = self.webhook_concurrency.max(1);
        self.command_channel_size = self.command_channel_size.max(1);
        self.default_main_duration = self.default_main_duration.max(1);
        self.default_secondary_duration = self.default_secondary_duration.max(1);
        self
    }

    /// Ticker settings for one room timer.
    pub fn tick_config(&self) -> TickConfig {
        TickConfig::with_period(self.tick_interval)
    }
}
