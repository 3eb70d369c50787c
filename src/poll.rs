//! Bounded polling
//!
//! The rendered page never announces that an asynchronous update has finished, so every
//! component that waits on the page (data ready after navigation, rows added after an
//! expand click, a detail panel appearing) checks an observable condition at a fixed
//! interval for a bounded number of attempts.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempt count and interval for a polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBudget {
    /// Maximum number of checks
    pub attempts: u32,

    /// Pause between two consecutive checks, in milliseconds
    pub interval_ms: u64,
}

impl PollBudget {
    pub const fn new(attempts: u32, interval_ms: u64) -> Self {
        Self { attempts, interval_ms }
    }

    /// Single check, no waiting
    pub const fn once() -> Self {
        Self::new(1, 0)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Upper bound on the time spent sleeping inside [`poll_until`]
    pub fn total(&self) -> Duration {
        self.interval() * self.attempts.saturating_sub(1)
    }

    /// Same attempt count with the interval removed
    pub fn without_delay(self) -> Self {
        Self { interval_ms: 0, ..self }
    }
}

/// Run `check` until it yields a value or the budget runs out.
///
/// The first check happens immediately; `budget.interval()` is slept between checks and
/// never after the final one. `check` receives the zero-based attempt number.
pub fn poll_until<T, F>(budget: PollBudget, mut check: F) -> Option<T>
where
    F: FnMut(u32) -> Option<T>,
{
    for attempt in 0..budget.attempts {
        if attempt > 0 {
            pause(budget.interval());
        }
        if let Some(value) = check(attempt) {
            return Some(value);
        }
    }
    None
}

/// Fixed settle delay between page interactions
pub fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}
