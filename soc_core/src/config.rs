//! Runtime configuration for the estimator.
//!
//! These are the structs the runner consumes. They are separate from the
//! TOML-deserialized config in `soc_config`; see `conversions` for the bridge.
use eyre::WrapErr;
use std::path::Path;
use std::time::Duration;

use crate::ekf::{EkfTuning, Topology};
use crate::error::Result;
use crate::model::CellModel;

/// Everything one estimator run needs besides the bus, the clock and the model.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub topology: Topology,
    /// 5-bit address of the slave group.
    pub slave_address: u8,
    /// Loop period; deadlines advance by exactly this much.
    pub period: Duration,
    /// Balancing threshold above the pack minimum SoC.
    pub soc_range: f32,
    pub tuning: EkfTuning,
    /// Stop after this many estimation cycles (bootstrap not counted).
    pub max_cycles: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            topology: Topology { par: 1, ser: 1 },
            slave_address: 1,
            period: Duration::from_millis(1000),
            soc_range: 0.05,
            tuning: EkfTuning::default(),
            max_cycles: None,
        }
    }
}

/// Load both cell-model tables from `dir`.
pub fn load_cell_model(dir: &Path) -> Result<CellModel> {
    let params = soc_config::load_param_rows(dir)
        .wrap_err_with(|| format!("loading parameter table from {}", dir.display()))?;
    let ocv = soc_config::load_ocv_rows(dir)
        .wrap_err_with(|| format!("loading OCV table from {}", dir.display()))?;
    Ok(CellModel::from_rows(&params, &ocv)?)
}
