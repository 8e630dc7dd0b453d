//! Iteration and wall-clock limits for a run.

use std::time::{Duration, Instant};

/// Why the loop must stop before starting more work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetStop {
    LimitReached,
    TimeExpired,
}

/// Limits checked before every iteration. Zero disables a limit.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    pub iteration_limit: u32,
    pub time_limit: Duration,
    pub started: Instant,
}

impl RunBudget {
    pub fn new(iteration_limit: u32, time_limit: Duration, started: Instant) -> Self {
        Self {
            iteration_limit,
            time_limit,
            started,
        }
    }

    /// Check limits given `iterations` already completed, as of `now`.
    pub fn check(&self, iterations: u32, now: Instant) -> Option<BudgetStop> {
        if self.iteration_limit > 0 && iterations >= self.iteration_limit {
            return Some(BudgetStop::LimitReached);
        }
        if !self.time_limit.is_zero()
            && now.saturating_duration_since(self.started) >= self.time_limit
        {
            return Some(BudgetStop::TimeExpired);
        }
        None
    }
}
