// Full estimator run: simulated slave, end-of-test listener and the
// periodic loop sharing one virtual bus.
mod support;

use soc_can::{SimulatedSlave, TraceSample, VirtualBus};
use soc_core::mocks::ManualClock;
use soc_core::{EndListener, RunConfig, ShutdownFlag, Topology, estimate};
use std::time::Duration;
use support::cell_model;

const SLAVE: u8 = 1;

fn trace(rows: usize) -> Vec<TraceSample> {
    (0..rows)
        .map(|i| TraceSample {
            current: if i == 0 { 0.0 } else { 2.0 },
            voltage: 3.7,
            temperature: 25,
        })
        .collect()
}

fn run_pipeline(par: usize, ser: usize, rows: usize) {
    let topo = Topology::new(par, ser).unwrap();
    let bus = VirtualBus::new();
    let master = bus.node();
    let listener_node = bus.node();
    let slave_node = bus.node();

    let flag = ShutdownFlag::new();
    let listener = EndListener::spawn(listener_node, SLAVE, flag.clone());
    let slave = SimulatedSlave::new(SLAVE, topo.channels(), trace(rows)).spawn(slave_node);

    let clock = ManualClock::new();
    let cfg = RunConfig {
        topology: topo,
        slave_address: SLAVE,
        period: Duration::from_millis(100),
        ..RunConfig::default()
    };
    let summary = estimate(master, clock.clone(), cell_model(), &cfg, &flag).unwrap();

    assert!(flag.is_raised());
    assert_eq!(summary.cycles, rows as u64 - 1);
    assert_eq!(summary.stale_cycles, 0);
    let last = summary.last.unwrap();
    assert_eq!(last.soc.len(), topo.channels());
    assert!(last.soc.iter().all(|s| (0.0..=1.0).contains(s)));

    let served = slave.join().unwrap();
    assert_eq!(served.rows_served, rows);
    assert_eq!(served.masks.len(), rows - 1);
    assert_eq!(listener.join().unwrap(), soc_can::slave::END_SEQUENCE);

    // Every recorded wait sits on the 100 ms grid
    let waits = clock.waits();
    for pair in waits.windows(2) {
        assert_eq!(pair[1] - pair[0], cfg.period);
    }
}

#[test]
fn single_cell_runs_until_end_of_test() {
    run_pipeline(1, 1, 6);
}

#[test]
fn pack_runs_until_end_of_test() {
    run_pipeline(2, 3, 4);
}

#[test]
fn max_cycles_caps_the_run() {
    let bus = VirtualBus::new();
    let master = bus.node();
    let slave_node = bus.node();
    let slave = SimulatedSlave::new(SLAVE, 1, trace(3)).spawn(slave_node);

    let cfg = RunConfig {
        max_cycles: Some(2),
        ..RunConfig::default()
    };
    let flag = ShutdownFlag::new();
    let summary = estimate(master, ManualClock::new(), cell_model(), &cfg, &flag).unwrap();
    assert_eq!(summary.cycles, 2);
    assert!(!flag.is_raised());
    assert_eq!(slave.join().unwrap().masks.len(), 2);
}
