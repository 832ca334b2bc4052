/// Errors returned by timer operations. A failed operation never changes
/// the timer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimerError {
    /// `adjust` would leave the timer with no time at all.
    #[error("cannot adjust duration {duration}s by {amount}s: result must be positive")]
    AdjustRejected { duration: u64, amount: i64 },
}
