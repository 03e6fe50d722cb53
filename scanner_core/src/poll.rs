//! Deadline-bounded status polling.

use std::time::Duration;

use scanner_traits::Clock;
use tracing::trace;

use crate::error::{Result, ScanError};

/// `polls` checks spaced `interval` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub polls: u32,
    pub interval: Duration,
}

impl PollBudget {
    pub fn new(polls: u32, interval: Duration) -> Self {
        Self { polls, interval }
    }

    pub fn total(&self) -> Duration {
        self.interval * self.polls
    }
}

/// Call `ready` until it returns `true` or the budget runs out.
///
/// `ready` is checked immediately, then once per interval; the wait fails
/// with `ScanError::Timeout(op)` once the next check would fall past the
/// deadline. Errors from `ready` end the wait at once.
pub fn wait_until<F>(clock: &dyn Clock, budget: PollBudget, op: &'static str, mut ready: F) -> Result<()>
where
    F: FnMut() -> Result<bool>,
{
    let deadline = clock.deadline(budget.total());
    let mut checks = 0u32;
    loop {
        checks += 1;
        if ready()? {
            trace!(op, checks, "poll satisfied");
            return Ok(());
        }
        if clock.now() + budget.interval > deadline || checks >= budget.polls {
            trace!(op, checks, "poll budget exhausted");
            return Err(ScanError::Timeout(op));
        }
        clock.sleep(budget.interval);
    }
}
