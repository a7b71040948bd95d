//! `From` implementations bridging `soc_config` types to `soc_core` types.

use crate::config::RunConfig;
use crate::ekf::{EkfTuning, Topology};
use crate::error::SocError;
use crate::util::period_from_ms;

// ── EkfTuning ────────────────────────────────────────────────────────────────

impl From<&soc_config::FilterCfg> for EkfTuning {
    fn from(c: &soc_config::FilterCfg) -> Self {
        Self {
            delta_t: c.delta_t_s,
            current_cov0: c.current_cov0,
            hysteresis_cov0: c.hysteresis_cov0,
            soc_cov0: c.soc_cov0,
            process_noise: c.process_noise,
            measurement_noise: c.measurement_noise,
            outlier_gate: c.outlier_gate,
            sign_deadband: c.sign_deadband,
        }
    }
}

// ── Topology ─────────────────────────────────────────────────────────────────

impl TryFrom<&soc_config::PackCfg> for Topology {
    type Error = SocError;
    fn try_from(c: &soc_config::PackCfg) -> Result<Self, Self::Error> {
        Self::new(c.par, c.ser)
    }
}

// ── RunConfig ────────────────────────────────────────────────────────────────

impl TryFrom<&soc_config::Config> for RunConfig {
    type Error = SocError;
    fn try_from(c: &soc_config::Config) -> Result<Self, Self::Error> {
        Ok(Self {
            topology: Topology::try_from(&c.pack)?,
            slave_address: c.bus.slave_address,
            period: period_from_ms(c.schedule.period_ms),
            soc_range: c.balancing.soc_range,
            tuning: EkfTuning::from(&c.filter),
            max_cycles: None,
        })
    }
}
