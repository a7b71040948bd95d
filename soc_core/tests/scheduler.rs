// Periodic loop timing against a virtual clock.
use soc_core::mocks::ManualClock;
use soc_core::{PeriodicScheduler, SchedulerState, ShutdownFlag, SocError};
use soc_traits::Clock;
use std::ops::ControlFlow;
use std::time::Duration;

const PERIOD: Duration = Duration::from_millis(10);

#[test]
fn deadlines_advance_by_exactly_one_period() {
    let clock = ManualClock::new();
    let handle = clock.clone();
    let mut sched = PeriodicScheduler::new(clock, PERIOD);
    sched.arm();
    let start = handle.now();
    let flag = ShutdownFlag::new();

    let n = sched
        .run(&flag, |i| {
            // Iteration 3 overruns two periods
            if i == 3 {
                handle.advance(Duration::from_millis(20));
            } else {
                handle.advance(Duration::from_millis(1));
            }
            Ok(if i == 9 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            })
        })
        .unwrap();

    assert_eq!(n, 10);
    assert_eq!(sched.state(), SchedulerState::Stopped);
    let waits = handle.waits();
    assert_eq!(waits.len(), 9);
    for (k, w) in waits.iter().enumerate() {
        assert_eq!(*w, start + PERIOD * (k as u32 + 1), "wait {k}");
    }
    // Overrun is absorbed: iteration 3 ends at start+50ms, past the 40ms deadline,
    // and the loop is back on its grid by the end.
    assert_eq!(handle.now(), start + PERIOD * 9 + Duration::from_millis(1));

    let stats = sched.stats();
    assert_eq!(stats.count, 10);
    assert_eq!(stats.max, Duration::from_millis(20));
    assert_eq!(stats.min, Duration::from_millis(1));
}

#[test]
fn raised_flag_stops_before_first_iteration() {
    let mut sched = PeriodicScheduler::new(ManualClock::new(), PERIOD);
    let flag = ShutdownFlag::new();
    flag.raise();
    let mut calls = 0;
    let n = sched
        .run(&flag, |_| {
            calls += 1;
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
    assert_eq!(n, 0);
    assert_eq!(calls, 0);
}

#[test]
fn flag_is_checked_at_the_top_of_each_period() {
    let clock = ManualClock::new();
    let handle = clock.clone();
    let mut sched = PeriodicScheduler::new(clock, PERIOD);
    let flag = ShutdownFlag::new();
    let inner = flag.clone();
    let n = sched
        .run(&flag, |i| {
            if i == 4 {
                inner.raise();
            }
            Ok(ControlFlow::Continue(()))
        })
        .unwrap();
    // The iteration that raised the flag completes and still sleeps once.
    assert_eq!(n, 5);
    assert_eq!(handle.waits().len(), 5);
}

#[test]
fn body_error_stops_the_loop() {
    let mut sched = PeriodicScheduler::new(ManualClock::new(), PERIOD);
    let flag = ShutdownFlag::new();
    let err = sched
        .run(&flag, |i| {
            if i == 2 {
                Err(SocError::State("boom".into()).into())
            } else {
                Ok(ControlFlow::Continue(()))
            }
        })
        .unwrap_err();
    assert!(err.to_string().contains("boom"));
    assert_eq!(sched.state(), SchedulerState::Stopped);
    assert_eq!(sched.stats().count, 3);
}
