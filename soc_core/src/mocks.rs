//! Test and helper mocks for soc_core

use soc_traits::Clock;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct ManualState {
    now: Instant,
    waits: Vec<Instant>,
}

/// Virtual clock: time only moves through `advance`, `sleep` or `sleep_until`.
///
/// Clones share the same timeline, so a test can keep one handle while the
/// code under test owns another. Every `sleep_until` deadline is recorded.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                waits: Vec::new(),
            })),
        }
    }

    pub fn advance(&self, d: Duration) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.now += d;
    }

    /// Deadlines passed to `sleep_until`, in call order.
    pub fn waits(&self) -> Vec<Instant> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .waits
            .clone()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }

    fn sleep_until(&self, deadline: Instant) {
        let mut s = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        s.waits.push(deadline);
        if deadline > s.now {
            s.now = deadline;
        }
    }
}
