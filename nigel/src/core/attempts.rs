//! Per-candidate attempt state for the ignore list.

/// Attempt-tracking state of one candidate key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttemptState {
    #[default]
    NotTracked,
    /// Attempted `n` times, still within the repeat budget.
    Attempts(u32),
    /// Exhausted (or loaded from disk); skipped from now on.
    Done,
}

/// Result of recording one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: AttemptState,
    /// True when the key just became `Done` and must be persisted.
    pub persist: bool,
}

impl AttemptState {
    /// Record one attempt. `max_repeat == 0` means every attempt is terminal.
    pub fn record(self, max_repeat: u32) -> Transition {
        match self {
            AttemptState::Done => Transition {
                next: AttemptState::Done,
                persist: false,
            },
            AttemptState::NotTracked | AttemptState::Attempts(_) => {
                let attempts = match self {
                    AttemptState::Attempts(n) => n + 1,
                    _ => 1,
                };
                if attempts >= max_repeat {
                    Transition {
                        next: AttemptState::Done,
                        persist: true,
                    }
                } else {
                    Transition {
                        next: AttemptState::Attempts(attempts),
                        persist: false,
                    }
                }
            }
        }
    }

    /// Whether a candidate in this state should be skipped.
    pub fn is_exhausted(self, max_repeat: u32) -> bool {
        match self {
            AttemptState::Done => true,
            AttemptState::NotTracked => false,
            AttemptState::Attempts(n) => max_repeat > 0 && n >= max_repeat,
        }
    }
}
