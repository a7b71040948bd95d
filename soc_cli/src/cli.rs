//! Command-line surface of the `soc` binary plus process-wide statics.

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();
/// Set once from `--json`; read when formatting a failed run.
pub static JSON_MODE: OnceLock<bool> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "soc", version, about = "Battery-pack SoC estimator")]
pub struct Cli {
    /// Estimator config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/soc_config.toml")]
    pub config: PathBuf,

    /// Override the cell-model table directory from the config
    #[arg(long, value_name = "DIR")]
    pub tables: Option<PathBuf>,

    /// Emit the summary, errors and console logs as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

/// Memory locking mode for real-time operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum RtLock {
    /// Do not lock memory
    None,
    /// Lock currently resident pages
    Current,
    /// Lock current and future pages
    All,
}

impl RtLock {
    #[inline]
    pub fn os_default() -> Self {
        #[cfg(target_os = "linux")]
        {
            return RtLock::Current;
        }
        #[allow(unreachable_code)]
        RtLock::None
    }
}

impl From<soc_config::RtLockCfg> for RtLock {
    fn from(c: soc_config::RtLockCfg) -> Self {
        match c {
            soc_config::RtLockCfg::None => RtLock::None,
            soc_config::RtLockCfg::Current => RtLock::Current,
            soc_config::RtLockCfg::All => RtLock::All,
        }
    }
}

/// Options shared by every command that runs the estimator loop.
#[derive(Args, Debug, Clone)]
pub struct LoopArgs {
    /// Stop after this many estimation cycles
    #[arg(long, value_name = "N")]
    pub cycles: Option<u64>,
    /// Override schedule.period_ms from the config
    #[arg(long, value_name = "MS")]
    pub period_ms: Option<u64>,
    /// Enable real-time mode (SCHED_FIFO, affinity, mlockall)
    #[arg(
        long,
        action = ArgAction::SetTrue,
        long_help = "Enable real-time mode on supported OSes.\n\nLinux: Attempts SCHED_FIFO priority, optionally pins to one CPU, and calls mlockall to lock the process address space into RAM. This reduces page faults and jitter for the estimator period but may require elevated privileges or ulimits (e.g., memlock).\n\nmacOS: Only mlockall is applied; SCHED_FIFO/affinity are unavailable.\n\nAlso enabled by [rt].enabled in the config."
    )]
    pub rt: bool,
    /// SCHED_FIFO priority (Linux only); defaults to [rt].priority
    #[arg(long, value_name = "PRIO")]
    pub rt_prio: Option<i32>,
    /// mlockall mode used with --rt
    #[arg(long, value_enum, value_name = "MODE")]
    pub rt_lock: Option<RtLock>,
    /// CPU index to pin the process to (Linux only)
    #[arg(long, value_name = "CPU")]
    pub rt_cpu: Option<usize>,
    /// Print per-period compute time stats on exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub stats: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the estimator on the bus backend selected in the config
    Run {
        /// Trace CSV for the simulated slave (required for the sim backend)
        #[arg(long, value_name = "FILE")]
        trace: Option<PathBuf>,
        #[command(flatten)]
        opts: LoopArgs,
    },
    /// Replay a recorded trace through a simulated slave on an in-process bus
    Simulate {
        /// Trace CSV with headers `current,voltage,temperature`
        #[arg(long, value_name = "FILE")]
        trace: PathBuf,
        #[command(flatten)]
        opts: LoopArgs,
    },
    /// Load and validate config and cell-model tables, then exit
    SelfCheck,
}
