//! Estimator wiring: config mapping, bus assembly, the run itself and its report.

use eyre::WrapErr;
use soc_can::{SimulatedSlave, TraceSample, VirtualBus};
use soc_config::BusBackend;
use soc_core::{
    CellModel, EndListener, LatencyStats, RunConfig, RunSummary, ShutdownFlag, SocError, estimate,
};
use soc_traits::{Bus, MonotonicClock};
use std::path::Path;
use std::time::Instant;

use crate::cli::LoopArgs;
use crate::rt::{RtRequest, setup_rt_once};

/// Everything a run needs from the command line and the loaded config.
pub struct RunRequest<'a> {
    pub cfg: &'a soc_config::Config,
    pub tables_dir: &'a Path,
    pub backend: BusBackend,
    pub trace: Option<&'a Path>,
    pub opts: &'a LoopArgs,
}

/// Load both cell-model tables, tagging failures as configuration errors.
pub fn load_model(dir: &Path) -> eyre::Result<CellModel> {
    soc_core::load_cell_model(dir)
        .wrap_err_with(|| SocError::Config(format!("cell-model tables in {}", dir.display())))
}

fn load_trace(path: &Path) -> eyre::Result<Vec<TraceSample>> {
    let rows = soc_config::load_trace_csv(path)
        .wrap_err_with(|| SocError::Config(format!("trace {}", path.display())))?;
    Ok(rows
        .into_iter()
        .map(|r| TraceSample {
            current: r.current,
            voltage: r.voltage,
            temperature: r.temperature,
        })
        .collect())
}

fn run_config(req: &RunRequest<'_>) -> eyre::Result<RunConfig> {
    let mut run = RunConfig::try_from(req.cfg)?;
    if let Some(ms) = req.opts.period_ms {
        run.period = soc_core::util::period_from_ms(ms);
    }
    run.max_cycles = req.opts.cycles;
    Ok(run)
}

/// Listener on its own endpoint, then the estimator loop on `master`.
fn drive<B: Bus + Send + 'static>(
    master: B,
    listener_bus: B,
    model: CellModel,
    run: &RunConfig,
    shutdown: &ShutdownFlag,
) -> eyre::Result<RunSummary> {
    let listener = EndListener::spawn(listener_bus, run.slave_address, shutdown.clone());
    let summary = estimate(master, MonotonicClock::new(), model, run, shutdown)?;
    if listener.is_finished() {
        match listener.join() {
            Ok(seq) => tracing::debug!(sequence = seq, "end-of-test listener joined"),
            Err(e) => tracing::warn!(error = %e, "end-of-test listener failed"),
        }
    }
    Ok(summary)
}

fn run_sim(
    req: &RunRequest<'_>,
    model: CellModel,
    run: &RunConfig,
    shutdown: &ShutdownFlag,
) -> eyre::Result<RunSummary> {
    let Some(trace_path) = req.trace else {
        return Err(SocError::Config("the sim backend needs a trace (--trace FILE)".into()).into());
    };
    let trace = load_trace(trace_path)?;
    tracing::info!(rows = trace.len(), path = %trace_path.display(), "trace loaded");

    let bus = VirtualBus::new();
    let master = bus.node();
    let listener = bus.node();
    let slave = SimulatedSlave::new(run.slave_address, run.topology.channels(), trace)
        .spawn(bus.node());

    let summary = drive(master, listener, model, run, shutdown)?;
    if slave.is_finished() {
        match slave.join() {
            Ok(s) => tracing::info!(
                rows = s.rows_served,
                masks = s.masks.len(),
                "simulated slave done"
            ),
            Err(e) => tracing::warn!(error = %e, "simulated slave failed"),
        }
    }
    Ok(summary)
}

#[cfg(all(feature = "socketcan", target_os = "linux"))]
fn run_socketcan(
    req: &RunRequest<'_>,
    model: CellModel,
    run: &RunConfig,
    shutdown: &ShutdownFlag,
) -> eyre::Result<RunSummary> {
    let iface = req.cfg.bus.interface.as_str();
    let open = |role: &str| {
        soc_can::SocketCanBus::open(iface)
            .map_err(|e| SocError::Bus(format!("open {iface} for {role}: {e}")))
    };
    let master = open("estimator")?;
    let listener = open("end-of-test listener")?;
    tracing::info!(interface = iface, "SocketCAN bus open");
    drive(master, listener, model, run, shutdown)
}

#[cfg(not(all(feature = "socketcan", target_os = "linux")))]
fn run_socketcan(
    _req: &RunRequest<'_>,
    _model: CellModel,
    _run: &RunConfig,
    _shutdown: &ShutdownFlag,
) -> eyre::Result<RunSummary> {
    Err(SocError::Config(
        "socketcan backend not available: build with --features socketcan on Linux".into(),
    )
    .into())
}

/// Load tables, apply RT settings and run until end of test, ctrl-c or `--cycles`.
pub fn run_estimator(req: &RunRequest<'_>, shutdown: &ShutdownFlag) -> eyre::Result<RunSummary> {
    let run = run_config(req)?;
    let model = load_model(req.tables_dir)?;

    setup_rt_once(RtRequest::resolve(&req.cfg.rt, req.opts));

    let started = Instant::now();
    let summary = match req.backend {
        BusBackend::Sim => run_sim(req, model, &run, shutdown)?,
        BusBackend::Socketcan => run_socketcan(req, model, &run, shutdown)?,
    };
    tracing::info!(
        cycles = summary.cycles,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "estimation finished"
    );

    if req.opts.stats {
        print_stats(&summary.latency, &run);
    }
    Ok(summary)
}

/// One JSON object describing a finished run.
pub fn summary_json(summary: &RunSummary, duration_ms: u64) -> serde_json::Value {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let last = summary.last.as_ref();
    serde_json::json!({
        "timestamp": timestamp,
        "duration_ms": duration_ms,
        "cycles": summary.cycles,
        "stale_cycles": summary.stale_cycles,
        "soc": last.map(|r| r.soc.clone()),
        "soc_variance": last.map(|r| r.soc_variance.clone()),
        "mask": last.map(|r| r.mask),
        "gated": last.map(|r| r.gated),
    })
}

/// Human-readable run result on stdout.
pub fn print_summary(summary: &RunSummary) {
    println!(
        "Estimation complete: {} cycles ({} stale)",
        summary.cycles, summary.stale_cycles
    );
    if let Some(last) = &summary.last {
        let socs: Vec<String> = last.soc.iter().map(|s| format!("{:.1}%", s * 100.0)).collect();
        println!("SoC: [{}]", socs.join(", "));
        println!("Balancing mask: {:#x}", last.mask);
    }
}

/// Print per-period compute time stats to stderr.
fn print_stats(stats: &LatencyStats, run: &RunConfig) {
    use soc_core::util::{as_millis_f64, rate_hz};
    eprintln!("\n--- Estimator Stats ---");
    eprintln!("Periods: {}", stats.count);
    eprintln!(
        "Period (ms): {:.3} ({:.2} Hz)",
        as_millis_f64(run.period),
        rate_hz(run.period)
    );
    eprintln!(
        "Compute min/avg/max (ms): {:.3} / {:.3} / {:.3}",
        as_millis_f64(stats.min),
        as_millis_f64(stats.avg()),
        as_millis_f64(stats.max)
    );
    eprintln!("-----------------------\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use soc_core::{CycleOutcome, CycleReport};

    #[test]
    fn summary_json_has_nulls_before_first_cycle() {
        let v = summary_json(&RunSummary::default(), 5);
        assert_eq!(v["cycles"], 0);
        assert!(v["soc"].is_null());
        assert!(v["mask"].is_null());
        assert!(v["timestamp"].as_u64().is_some());
    }

    #[test]
    fn summary_json_reports_last_cycle() {
        let summary = RunSummary {
            cycles: 3,
            stale_cycles: 1,
            last: Some(CycleReport {
                outcome: CycleOutcome::Fresh,
                mask: 0b10,
                soc: vec![0.5, 0.6],
                soc_variance: vec![1e-3, 1e-3],
                gated: 0,
            }),
            latency: LatencyStats::default(),
        };
        let v = summary_json(&summary, 12);
        assert_eq!(v["mask"], 2);
        assert_eq!(v["soc"].as_array().map(Vec::len), Some(2));
        assert_eq!(v["stale_cycles"], 1);
    }
}
