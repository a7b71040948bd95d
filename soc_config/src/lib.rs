#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and file loaders for the SoC estimator.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `tables` loads the cell-model CSV rows (one file per named row).
//! - `load_trace_csv` reads a recorded current/voltage/temperature trace
//!   for the simulated slave, enforcing exact headers.
use serde::Deserialize;
use std::path::PathBuf;

pub mod tables;

pub use tables::{OCV_FILES, PARAM_FILES, load_ocv_rows, load_param_rows, load_row_csv};

/// Trace CSV schema.
///
/// Expected headers:
/// current,voltage,temperature
///
/// Example:
/// current,voltage,temperature
/// -1.5,3.71,25
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TraceRow {
    pub current: f32,
    pub voltage: f32,
    pub temperature: i32,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PackCfg {
    /// Cells in parallel per series group
    pub par: usize,
    /// Series groups
    pub ser: usize,
}

impl Default for PackCfg {
    fn default() -> Self {
        Self { par: 1, ser: 1 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    #[default]
    Sim,
    Socketcan,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BusCfg {
    pub backend: BusBackend,
    /// SocketCAN interface name; ignored by the simulated backend
    pub interface: String,
    /// 5-bit address of the slave group this master talks to
    pub slave_address: u8,
}

impl Default for BusCfg {
    fn default() -> Self {
        Self {
            backend: BusBackend::Sim,
            interface: "vcan0".to_string(),
            slave_address: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScheduleCfg {
    pub period_ms: u64,
}

impl Default for ScheduleCfg {
    fn default() -> Self {
        Self { period_ms: 1000 }
    }
}

/// Kalman filter tuning. Defaults reproduce the reference cell setup.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilterCfg {
    pub delta_t_s: f32,
    pub current_cov0: f32,
    pub hysteresis_cov0: f32,
    pub soc_cov0: f32,
    pub process_noise: f32,
    pub measurement_noise: f32,
    /// Residual gate: reject when residual^2 > outlier_gate * S[c][c]
    pub outlier_gate: f32,
    /// Fraction of capacity below which the current sign is not re-latched
    pub sign_deadband: f32,
}

impl Default for FilterCfg {
    fn default() -> Self {
        Self {
            delta_t_s: 1.0,
            current_cov0: 100.0,
            hysteresis_cov0: 0.01,
            soc_cov0: 0.001,
            process_noise: 4.0,
            measurement_noise: 0.3,
            outlier_gate: 100.0,
            sign_deadband: 0.01,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BalancingCfg {
    /// Channels whose SoC exceeds the pack minimum by more than this are discharged
    pub soc_range: f32,
}

impl Default for BalancingCfg {
    fn default() -> Self {
        Self { soc_range: 0.05 }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RtLockCfg {
    #[default]
    None,
    Current,
    All,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RtCfg {
    pub enabled: bool,
    /// SCHED_FIFO priority (clamped to the OS range at runtime)
    pub priority: i32,
    pub lock: RtLockCfg,
    /// Optional CPU index to pin the estimator to
    pub cpu: Option<usize>,
}

impl Default for RtCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            priority: 75,
            lock: RtLockCfg::None,
            cpu: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TablesCfg {
    /// Directory holding the CellModel*.csv files
    pub dir: PathBuf,
}

impl Default for TablesCfg {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./csv/"),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pack: PackCfg,
    pub bus: BusCfg,
    pub schedule: ScheduleCfg,
    pub filter: FilterCfg,
    pub balancing: BalancingCfg,
    pub rt: RtCfg,
    pub logging: Logging,
    pub tables: TablesCfg,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Largest pack the 64-bit balancing mask can address.
pub const MAX_CHANNELS: usize = 64;

fn positive_finite(v: f32) -> bool {
    v.is_finite() && v > 0.0
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pack
        if self.pack.par == 0 {
            eyre::bail!("pack.par must be >= 1");
        }
        if self.pack.ser == 0 {
            eyre::bail!("pack.ser must be >= 1");
        }
        let channels = self.pack.par.saturating_mul(self.pack.ser);
        if channels > MAX_CHANNELS {
            eyre::bail!("pack.par * pack.ser must be <= {MAX_CHANNELS}, got {channels}");
        }

        // Bus
        if self.bus.slave_address > 31 {
            eyre::bail!("bus.slave_address must be in [0, 31]");
        }
        if self.bus.backend == BusBackend::Socketcan && self.bus.interface.trim().is_empty() {
            eyre::bail!("bus.interface must be set for the socketcan backend");
        }

        // Schedule
        if self.schedule.period_ms == 0 {
            eyre::bail!("schedule.period_ms must be >= 1");
        }
        if self.schedule.period_ms > 60 * 1000 {
            eyre::bail!("schedule.period_ms is unreasonably large (>60s)");
        }

        // Filter
        let f = &self.filter;
        if !positive_finite(f.delta_t_s) {
            eyre::bail!("filter.delta_t_s must be > 0");
        }
        for (name, v) in [
            ("current_cov0", f.current_cov0),
            ("hysteresis_cov0", f.hysteresis_cov0),
            ("soc_cov0", f.soc_cov0),
            ("process_noise", f.process_noise),
            ("measurement_noise", f.measurement_noise),
            ("outlier_gate", f.outlier_gate),
        ] {
            if !positive_finite(v) {
                eyre::bail!("filter.{name} must be > 0");
            }
        }
        if !(f.sign_deadband.is_finite() && (0.0..=1.0).contains(&f.sign_deadband)) {
            eyre::bail!("filter.sign_deadband must be in [0.0, 1.0]");
        }

        // Balancing
        if !(self.balancing.soc_range.is_finite()
            && (0.0..=1.0).contains(&self.balancing.soc_range))
        {
            eyre::bail!("balancing.soc_range must be in [0.0, 1.0]");
        }

        // RT
        if !(1..=99).contains(&self.rt.priority) {
            eyre::bail!("rt.priority must be in [1, 99]");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref() {
            if !matches!(rot, "never" | "daily" | "hourly") {
                eyre::bail!("logging.rotation must be one of never|daily|hourly, got '{rot}'");
            }
        }

        Ok(())
    }

    /// Number of estimated channels (`par * ser`).
    pub fn channels(&self) -> usize {
        self.pack.par * self.pack.ser
    }
}

pub fn load_trace_csv(path: &std::path::Path) -> eyre::Result<Vec<TraceRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open trace CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let expected = ["current", "voltage", "temperature"];
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != expected {
        eyre::bail!(
            "trace CSV must have headers 'current,voltage,temperature', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<TraceRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => {
                eyre::bail!("invalid CSV row {}: {}", idx + 2, e);
            }
        }
    }
    if rows.is_empty() {
        eyre::bail!("trace CSV {:?} has no samples", path);
    }
    Ok(rows)
}
