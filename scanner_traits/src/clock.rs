use std::thread;
use std::time::{Duration, Instant};

/// Monotonic time source used by every poll loop in the engine.
///
/// Hardware waits are expressed as "poll, then sleep"; routing the sleep
/// through this trait lets tests run multi-second budgets instantly.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Instant at which a wait of `budget` starting now expires.
    fn deadline(&self, budget: Duration) -> Instant {
        self.now() + budget
    }

    /// Milliseconds elapsed since `epoch`, saturating at 0.
    fn ms_since(&self, epoch: Instant) -> u64 {
        let dur = self.now().saturating_duration_since(epoch);
        dur.as_millis() as u64
    }
}

/// Wall-clock implementation backed by `std::time::Instant`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_in_the_future() {
        let clock = MonotonicClock::new();
        let start = clock.now();
        let deadline = clock.deadline(Duration::from_millis(50));
        assert!(deadline >= start + Duration::from_millis(50));
    }

    #[test]
    fn zero_sleep_returns_immediately() {
        let clock = MonotonicClock::new();
        let start = clock.now();
        clock.sleep(Duration::ZERO);
        assert!(clock.ms_since(start) < 50);
    }
}
