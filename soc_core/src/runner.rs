use soc_traits::{Bus, Clock};
use std::ops::ControlFlow;

use crate::config::RunConfig;
use crate::ekf::Kalman;
use crate::error::Result;
use crate::model::CellModel;
use crate::protocol::{CycleOutcome, CycleReport, Orchestrator};
use crate::scheduler::{LatencyStats, PeriodicScheduler};
use crate::shutdown::ShutdownFlag;

/// What a finished run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub cycles: u64,
    pub stale_cycles: u64,
    pub last: Option<CycleReport>,
    pub latency: LatencyStats,
}

/// Drive `kalman` through one cycle per period until shutdown or `max_cycles`.
///
/// A cycle error stops the loop and is returned, unless the shutdown flag was
/// already raised when it happened (the bus going away after the end of the
/// test is a normal way to finish).
pub fn run_loop<B: Bus, C: Clock>(
    orch: &mut Orchestrator<B>,
    kalman: &mut Kalman,
    scheduler: &mut PeriodicScheduler<C>,
    shutdown: &ShutdownFlag,
    max_cycles: Option<u64>,
) -> Result<RunSummary> {
    let mut summary = RunSummary::default();

    let iterations = scheduler.run(shutdown, |i| {
        let report = match orch.cycle(kalman) {
            Ok(r) => r,
            Err(e) if shutdown.is_raised() => {
                tracing::info!(error = %e, "bus closed after end of test");
                return Ok(ControlFlow::Break(()));
            }
            Err(e) => {
                tracing::error!(cycle = i, error = %e, "cycle failed");
                return Err(e);
            }
        };

        if report.outcome == CycleOutcome::Stale {
            summary.stale_cycles += 1;
        }
        summary.cycles += 1;
        tracing::debug!(
            cycle = i,
            outcome = ?report.outcome,
            mask = report.mask,
            gated = report.gated,
            soc = ?report.soc,
            soc_var = ?report.soc_variance,
            "cycle complete"
        );
        summary.last = Some(report);

        if max_cycles.is_some_and(|m| summary.cycles >= m) {
            return Ok(ControlFlow::Break(()));
        }
        Ok(ControlFlow::Continue(()))
    })?;

    summary.latency = scheduler.stats();
    tracing::info!(
        iterations,
        cycles = summary.cycles,
        stale = summary.stale_cycles,
        "estimator loop stopped"
    );
    Ok(summary)
}

/// Bootstrap the filter from the first bus reading, then run the periodic loop.
pub fn estimate<B: Bus, C: Clock>(
    bus: B,
    clock: C,
    model: CellModel,
    cfg: &RunConfig,
    shutdown: &ShutdownFlag,
) -> Result<RunSummary> {
    let mut orch = Orchestrator::new(bus, cfg.slave_address, cfg.topology, cfg.soc_range);
    tracing::info!(
        par = cfg.topology.par,
        ser = cfg.topology.ser,
        slave = cfg.slave_address,
        period_ms = cfg.period.as_millis() as u64,
        "estimator start"
    );
    let mut kalman = orch.bootstrap(cfg.tuning, model)?;
    let mut scheduler = PeriodicScheduler::new(clock, cfg.period);
    scheduler.arm();
    run_loop(&mut orch, &mut kalman, &mut scheduler, shutdown, cfg.max_cycles)
}
