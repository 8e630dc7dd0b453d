//! Exponential backoff for rate-limited invocations.

use std::time::Duration;

/// Delay at level 0.
pub const BASE_BACKOFF: Duration = Duration::from_secs(5 * 60);
/// Upper bound on any single delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// `BASE_BACKOFF * 2^level`, capped at `MAX_BACKOFF`.
pub fn calculate_backoff(level: u32) -> Duration {
    1u32.checked_shl(level)
        .and_then(|factor| BASE_BACKOFF.checked_mul(factor))
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

/// Consecutive rate-limit counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Backoff {
    level: u32,
}

impl Backoff {
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Delay for the current rate-limit, advancing the level for the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = calculate_backoff(self.level);
        self.level = self.level.saturating_add(1);
        delay
    }

    /// Any non-rate-limited outcome resets the sequence.
    pub fn reset(&mut self) {
        self.level = 0;
    }
}
