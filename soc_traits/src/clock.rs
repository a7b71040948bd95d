use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for the periodic loop and timing across the stack.
///
/// - now(): returns a monotonic Instant
/// - sleep(): sleeps for the provided duration (implementations may simulate)
/// - sleep_until(): blocks until an absolute deadline; returns at once if it already passed
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Block until `deadline`. A deadline in the past returns immediately.
    fn sleep_until(&self, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(self.now());
        self.sleep(remaining);
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
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

    fn sleep_until(&self, deadline: Instant) {
        // thread::sleep may wake early on some platforms; re-check against the deadline.
        loop {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(deadline - now);
        }
    }
}
