//! Fixed-period loop with absolute deadlines.
//!
//! The deadline advances by exactly one period from its previous value every
//! iteration, independent of how long the body took. An overrun is not
//! detected: the following wait returns immediately and the loop catches up.
use soc_traits::Clock;
use std::ops::ControlFlow;
use std::time::{Duration, Instant};

use crate::error::Result;
use crate::shutdown::ShutdownFlag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Running,
    Stopped,
}

/// Period length and the next absolute wake-up time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodInfo {
    pub period: Duration,
    pub next_deadline: Instant,
}

impl PeriodInfo {
    pub fn new(period: Duration, start: Instant) -> Self {
        Self {
            period,
            next_deadline: start,
        }
    }

    #[inline]
    pub fn advance(&mut self) {
        self.next_deadline += self.period;
    }
}

/// Min/avg/max of the per-iteration compute time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyStats {
    pub count: u64,
    pub min: Duration,
    pub max: Duration,
    pub total: Duration,
}

impl LatencyStats {
    pub fn record(&mut self, d: Duration) {
        if self.count == 0 || d < self.min {
            self.min = d;
        }
        if d > self.max {
            self.max = d;
        }
        self.total += d;
        self.count += 1;
    }

    pub fn avg(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / u32::try_from(self.count).unwrap_or(u32::MAX)
        }
    }
}

pub struct PeriodicScheduler<C: Clock> {
    clock: C,
    period: Duration,
    info: PeriodInfo,
    state: SchedulerState,
    stats: LatencyStats,
}

impl<C: Clock> PeriodicScheduler<C> {
    pub fn new(clock: C, period: Duration) -> Self {
        let now = clock.now();
        Self {
            clock,
            period,
            info: PeriodInfo::new(period, now),
            state: SchedulerState::Idle,
            stats: LatencyStats::default(),
        }
    }

    /// Capture `now` as the first deadline.
    pub fn arm(&mut self) {
        self.info = PeriodInfo::new(self.period, self.clock.now());
        self.state = SchedulerState::Armed;
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn period_info(&self) -> PeriodInfo {
        self.info
    }

    pub fn stats(&self) -> LatencyStats {
        self.stats
    }

    /// Run `body` once per period until `shutdown` is raised, the body breaks,
    /// or the body fails. Returns the number of completed iterations.
    ///
    /// The flag is checked once at the top of each period; a running body is
    /// never interrupted.
    pub fn run<F>(&mut self, shutdown: &ShutdownFlag, mut body: F) -> Result<u64>
    where
        F: FnMut(u64) -> Result<ControlFlow<()>>,
    {
        if self.state != SchedulerState::Armed {
            self.arm();
        }
        self.state = SchedulerState::Running;
        let mut iterations = 0u64;

        while !shutdown.is_raised() {
            let start = self.clock.now();
            let step = body(iterations);
            let elapsed = self.clock.now().saturating_duration_since(start);
            self.stats.record(elapsed);

            match step {
                Ok(ControlFlow::Continue(())) => iterations += 1,
                Ok(ControlFlow::Break(())) => {
                    iterations += 1;
                    break;
                }
                Err(e) => {
                    self.state = SchedulerState::Stopped;
                    return Err(e);
                }
            }

            self.info.advance();
            tracing::trace!(
                iteration = iterations,
                elapsed_us = elapsed.as_micros() as u64,
                "period complete"
            );
            self.clock.sleep_until(self.info.next_deadline);
        }

        self.state = SchedulerState::Stopped;
        Ok(iterations)
    }
}
