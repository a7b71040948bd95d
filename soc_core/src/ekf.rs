//! Extended Kalman filter over a `par x ser` pack.
//!
//! State layout for `n = par * ser` channels, in index order:
//!
//! - `I` block (`0..n`): diffusion-current filter state
//! - `H` block (`n..2n`): dynamic hysteresis state
//! - `Z` block (`2n..3n`): state of charge
//!
//! Lifecycle: [`Kalman::setup`] returns a filter in [`EkfPhase::Ready`];
//! [`Kalman::predict`] moves it to [`EkfPhase::Predicted`] and
//! [`Kalman::update`] back to `Ready`. Every call allocates its own scratch
//! matrices, so independent filters never share state.
use crate::error::SocError;
use crate::matrix::Matrix;
use crate::model::{CellModel, CellParams};

/// Seconds per hour; capacities are in Ah.
const SECS_PER_HOUR: f32 = 3600.0;

/// Pack wiring: `par` cells in parallel per group, `ser` groups in series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub par: usize,
    pub ser: usize,
}

impl Topology {
    pub fn new(par: usize, ser: usize) -> Result<Self, SocError> {
        if par == 0 || ser == 0 {
            return Err(SocError::Config(format!(
                "pack topology must be at least 1x1, got {par}x{ser}"
            )));
        }
        Ok(Self { par, ser })
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.par * self.ser
    }

    /// Series group a channel belongs to.
    #[inline]
    pub fn group_of(&self, channel: usize) -> usize {
        channel / self.par
    }
}

/// Initial covariances, noise levels and tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EkfTuning {
    pub delta_t: f32,
    pub current_cov0: f32,
    pub hysteresis_cov0: f32,
    pub soc_cov0: f32,
    pub process_noise: f32,
    pub measurement_noise: f32,
    pub outlier_gate: f32,
    pub sign_deadband: f32,
}

impl Default for EkfTuning {
    fn default() -> Self {
        Self {
            delta_t: 1.0,
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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EkfPhase {
    Ready,
    Predicted,
}

/// Sign with `sign(0) == 0`.
#[inline]
fn sign(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub struct Kalman {
    topo: Topology,
    tuning: EkfTuning,
    model: CellModel,
    phase: EkfPhase,

    x: Matrix,
    p: Matrix,
    f: Matrix,
    g: Matrix,
    q: Matrix,
    r: Matrix,
    h: Matrix,
    d: Matrix,
    k: Matrix,
    s: Matrix,
    y_p: Matrix,

    i_prev: Vec<f32>,
    i_sign: Vec<f32>,
    params: CellParams,
    gated: Vec<bool>,
}

impl Kalman {
    /// Build a filter from an initial open-circuit reading per series group.
    ///
    /// SoC of each group is looked up from its OCV at `t0` and replicated over
    /// the group's parallel cells; current and hysteresis states start at 0.
    pub fn setup(
        topo: Topology,
        tuning: EkfTuning,
        model: CellModel,
        t0: f32,
        ocv: &[f32],
    ) -> Result<Self, SocError> {
        if ocv.len() != topo.ser {
            return Err(SocError::Input(format!(
                "setup expects {} group voltages, got {}",
                topo.ser,
                ocv.len()
            )));
        }
        let n = topo.channels();
        let mut x = Matrix::zeros(3 * n, 1);
        let mut p = Matrix::zeros(3 * n, 3 * n);
        for c in 0..n {
            p[(c, c)] = tuning.current_cov0;
            p[(n + c, n + c)] = tuning.hysteresis_cov0;
            p[(2 * n + c, 2 * n + c)] = tuning.soc_cov0;
        }
        for (grp, v) in ocv.iter().enumerate() {
            let soc = model.ocv.soc_from_ocv(*v, t0);
            for j in 0..topo.par {
                x[(2 * n + grp * topo.par + j, 0)] = soc;
            }
        }
        let params = model.params.params_at(t0);
        tracing::debug!(channels = n, t0, "kalman filter initialised");

        Ok(Self {
            topo,
            tuning,
            model,
            phase: EkfPhase::Ready,
            x,
            p,
            f: Matrix::zeros(3 * n, 3 * n),
            g: Matrix::zeros(3 * n, n),
            q: Matrix::from_diagonal(&vec![tuning.process_noise; n]),
            r: Matrix::from_diagonal(&vec![tuning.measurement_noise; n]),
            h: Matrix::zeros(n, 3 * n),
            d: Matrix::identity(n),
            k: Matrix::zeros(3 * n, n),
            s: Matrix::zeros(n, n),
            y_p: Matrix::zeros(n, 1),
            i_prev: vec![0.0; n],
            i_sign: vec![0.0; n],
            params,
            gated: vec![false; n],
        })
    }

    /// Time update from per-channel measured currents at temperature `t`.
    pub fn predict(&mut self, currents: &[f32], t: f32) -> Result<(), SocError> {
        let n = self.topo.channels();
        if currents.len() != n {
            return Err(SocError::Input(format!(
                "predict expects {n} currents, got {}",
                currents.len()
            )));
        }
        let par = self.model.params.params_at(t);
        let dt = self.tuning.delta_t;
        let rc = (-dt / par.rc.abs()).exp();
        let per_q = par.g / (SECS_PER_HOUR * par.q);
        let soc_gain = -dt / (SECS_PER_HOUR * par.q);

        // Efficiency-scaled currents and the latched sign
        let mut u = currents.to_vec();
        for (c, ui) in u.iter_mut().enumerate() {
            if *ui < 0.0 {
                *ui *= par.eta;
            }
            if ui.abs() > par.q * self.tuning.sign_deadband {
                self.i_sign[c] = sign(*ui);
            }
        }

        let (zi, zh, zz) = (0, n, 2 * n);
        let mut gu = Matrix::zeros(3 * n, 1);
        for c in 0..n {
            let ip = self.i_prev[c];
            let decay = (-(ip * per_q).abs()).exp();

            self.f[(zi + c, zi + c)] = rc;
            self.f[(zh + c, zh + c)] = decay;
            self.f[(zz + c, zz + c)] = 1.0;

            self.g[(zi + c, c)] = 1.0 - rc;
            self.g[(zz + c, c)] = soc_gain;
            self.g[(zh + c, c)] =
                -(per_q * dt).abs() * decay * (1.0 + sign(ip) * self.x[(zh + c, 0)]);

            gu[(zi + c, 0)] = (1.0 - rc) * ip;
            gu[(zz + c, 0)] = soc_gain * ip;
            gu[(zh + c, 0)] = ((-(ip * per_q * dt).abs()).exp() - 1.0) * sign(ip);
        }

        // x = F x + Gu
        let fx = self.f.multiply(&self.x)?;
        fx.add_into(&gu, &mut self.x)?;

        // P = F P F' + G Q G'
        let fp = self.f.multiply(&self.p)?;
        let fpf = fp.multiply(&self.f.transpose())?;
        let gq = self.g.multiply(&self.q)?;
        let gqg = gq.multiply(&self.g.transpose())?;
        fpf.add_into(&gqg, &mut self.p)?;

        // Predicted terminal voltage per channel
        for c in 0..n {
            let soc = self.x[(zz + c, 0)];
            self.y_p[(c, 0)] = self.model.ocv.ocv_from_soc(soc, t)
                + par.m0 * self.i_sign[c]
                + par.m * self.x[(zh + c, 0)]
                - par.r * self.x[(zi + c, 0)]
                - par.r0 * u[c];
        }

        self.i_prev = u;
        self.params = par;
        self.phase = EkfPhase::Predicted;
        Ok(())
    }

    /// Measurement update from per-group terminal voltages at temperature `t`.
    ///
    /// Uses the parameters resolved by the preceding [`Kalman::predict`].
    pub fn update(&mut self, voltages: &[f32], t: f32) -> Result<(), SocError> {
        if self.phase != EkfPhase::Predicted {
            return Err(SocError::State(
                "update called without a preceding predict".to_string(),
            ));
        }
        let n = self.topo.channels();
        if voltages.len() != self.topo.ser {
            return Err(SocError::Input(format!(
                "update expects {} group voltages, got {}",
                self.topo.ser,
                voltages.len()
            )));
        }
        let par = self.params;
        let (zi, zh, zz) = (0, n, 2 * n);

        self.h.fill(0.0);
        for c in 0..n {
            self.h[(c, zz + c)] = self.model.ocv.docv_from_soc(self.x[(zz + c, 0)], t);
            self.h[(c, zh + c)] = par.m;
            self.h[(c, zi + c)] = -par.r;
        }

        // S = H P H' + D R D'
        let ht = self.h.transpose();
        let hph = self.h.multiply(&self.p)?.multiply(&ht)?;
        let drd = self.d.multiply(&self.r)?.multiply(&self.d.transpose())?;
        hph.add_into(&drd, &mut self.s)?;

        // K = P H' S^-1
        let pht = self.p.multiply(&ht)?;
        if n == 1 {
            pht.scale_into(1.0 / self.s[(0, 0)], &mut self.k)?;
        } else {
            let s_inv = self.s.invert()?;
            pht.multiply_into(&s_inv, &mut self.k)?;
        }

        // Outlier gate, then turn the prediction into the residual
        for c in 0..n {
            let resid = voltages[self.topo.group_of(c)] - self.y_p[(c, 0)];
            let reject = resid * resid > self.tuning.outlier_gate * self.s[(c, c)];
            if reject {
                self.k[(zi + c, c)] = 0.0;
                self.k[(zh + c, c)] = 0.0;
                self.k[(zz + c, c)] = 0.0;
                tracing::debug!(channel = c, resid, "measurement gated as outlier");
            }
            self.gated[c] = reject;
            self.y_p[(c, 0)] = resid;
        }

        // x += K r, then clamp
        let kr = self.k.multiply(&self.y_p)?;
        let x_prev = self.x.clone();
        x_prev.add_into(&kr, &mut self.x)?;
        for c in 0..n {
            self.x[(zz + c, 0)] = self.x[(zz + c, 0)].clamp(0.0, 1.0);
            self.x[(zh + c, 0)] = self.x[(zh + c, 0)].clamp(-1.0, 1.0);
        }

        // P -= K S K'
        let ksk = self.k.multiply(&self.s)?.multiply(&self.k.transpose())?;
        let p_prev = self.p.clone();
        p_prev.sub_into(&ksk, &mut self.p)?;

        self.phase = EkfPhase::Ready;
        Ok(())
    }

    fn block(&self, offset: usize) -> Vec<f32> {
        let n = self.topo.channels();
        (0..n).map(|c| self.x[(offset + c, 0)]).collect()
    }

    /// Per-channel SoC estimate.
    pub fn soc(&self) -> Vec<f32> {
        self.block(2 * self.topo.channels())
    }

    pub fn hysteresis(&self) -> Vec<f32> {
        self.block(self.topo.channels())
    }

    pub fn diffusion_current(&self) -> Vec<f32> {
        self.block(0)
    }

    /// Diagonal of the SoC block of the covariance.
    pub fn soc_variance(&self) -> Vec<f32> {
        let n = self.topo.channels();
        (0..n).map(|c| self.p[(2 * n + c, 2 * n + c)]).collect()
    }

    pub fn phase(&self) -> EkfPhase {
        self.phase
    }

    pub fn topology(&self) -> Topology {
        self.topo
    }

    pub fn tuning(&self) -> &EkfTuning {
        &self.tuning
    }

    pub fn state(&self) -> &Matrix {
        &self.x
    }

    pub fn covariance(&self) -> &Matrix {
        &self.p
    }

    pub fn gain(&self) -> &Matrix {
        &self.k
    }

    pub fn innovation_covariance(&self) -> &Matrix {
        &self.s
    }

    /// Predicted voltages after `predict`, residuals after `update`.
    pub fn output(&self) -> &Matrix {
        &self.y_p
    }

    /// Channels whose last measurement was rejected by the outlier gate.
    pub fn gated(&self) -> &[bool] {
        &self.gated
    }
}
