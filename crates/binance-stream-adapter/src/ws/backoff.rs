/*
[INPUT]:  Consecutive reconnect attempt count
[OUTPUT]: Deterministic, capped delay before the next connect
[POS]:    WebSocket layer - reconnect backoff schedule
[UPDATE]: When changing the backoff curve or its ceiling
*/

use std::time::Duration;

/// Exponential backoff with a ceiling: `min(base * 2^(attempt - 1), max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffSchedule {
    base: Duration,
    max: Duration,
}

impl BackoffSchedule {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Delay before reconnect attempt `attempt` (1-based). Attempt 0 is treated as 1.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exp)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}
