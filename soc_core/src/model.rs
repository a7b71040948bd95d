//! Temperature-indexed cell model tables.
//!
//! `ParamTable` holds the equivalent-circuit parameters, one column per
//! temperature breakpoint, and is sampled piecewise-constant. `OcvTable`
//! holds the OCV/SoC curve as baseline + temperature-slope pairs and is
//! interpolated linearly, extrapolating with the first or last interval.
use crate::error::SocError;
use crate::matrix::Matrix;

/// Row indices of the parameter table.
pub mod param_row {
    pub const Q: usize = 0;
    pub const G: usize = 1;
    pub const M: usize = 2;
    pub const M0: usize = 3;
    pub const RC: usize = 4;
    pub const R: usize = 5;
    pub const R0: usize = 6;
    pub const ETA: usize = 7;
    pub const TEMP: usize = 8;
    pub const COUNT: usize = 9;
}

/// Row indices of the OCV/SoC table.
pub mod ocv_row {
    pub const OCV: usize = 0;
    pub const OCV0: usize = 1;
    pub const OCV_REL: usize = 2;
    pub const SOC: usize = 3;
    pub const SOC0: usize = 4;
    pub const SOC_REL: usize = 5;
    pub const DOCV0: usize = 6;
    pub const DOCV_REL: usize = 7;
    pub const COUNT: usize = 8;
}

/// Cell parameters resolved at one temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellParams {
    /// Capacity in Ah
    pub q: f32,
    /// Hysteresis rate constant
    pub g: f32,
    /// Dynamic hysteresis magnitude (V)
    pub m: f32,
    /// Instantaneous hysteresis magnitude (V)
    pub m0: f32,
    /// RC time constant (s)
    pub rc: f32,
    /// Diffusion resistance (Ohm)
    pub r: f32,
    /// Series resistance (Ohm)
    pub r0: f32,
    /// Coulombic efficiency applied to charging current
    pub eta: f32,
}

fn table_from_rows(
    name: &str,
    rows: &[Vec<f32>],
    expected_rows: usize,
    min_cols: usize,
) -> Result<Matrix, SocError> {
    if rows.len() != expected_rows {
        return Err(SocError::Config(format!(
            "{name} table needs {expected_rows} rows, got {}",
            rows.len()
        )));
    }
    let m = Matrix::from_rows(rows)
        .map_err(|_| SocError::Config(format!("{name} table rows differ in length")))?;
    if m.cols() < min_cols {
        return Err(SocError::Config(format!(
            "{name} table needs at least {min_cols} columns, got {}",
            m.cols()
        )));
    }
    Ok(m)
}

#[derive(Debug, Clone)]
pub struct ParamTable {
    m: Matrix,
}

impl ParamTable {
    /// Rows in `param_row` order; every row must have the same length (>= 1).
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, SocError> {
        Ok(Self {
            m: table_from_rows("parameter", rows, param_row::COUNT, 1)?,
        })
    }

    pub fn temperatures(&self) -> &[f32] {
        self.m.row(param_row::TEMP)
    }

    /// Column index used for temperature `t`: clamped to the first/last
    /// breakpoint, otherwise the `j` with `T[j] <= t < T[j+1]`.
    pub fn column_for(&self, t: f32) -> usize {
        let temps = self.temperatures();
        let last = temps.len() - 1;
        if t <= temps[0] {
            0
        } else if t >= temps[last] {
            last
        } else {
            temps
                .windows(2)
                .position(|w| w[0] <= t && t < w[1])
                .unwrap_or(last)
        }
    }

    /// Piecewise-constant parameter lookup; no interpolation.
    pub fn params_at(&self, t: f32) -> CellParams {
        let j = self.column_for(t);
        let at = |row| self.m[(row, j)];
        CellParams {
            q: at(param_row::Q),
            g: at(param_row::G),
            m: at(param_row::M),
            m0: at(param_row::M0),
            rc: at(param_row::RC),
            r: at(param_row::R),
            r0: at(param_row::R0),
            eta: at(param_row::ETA),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcvTable {
    m: Matrix,
}

impl OcvTable {
    /// Rows in `ocv_row` order; every row must have the same length (>= 2).
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, SocError> {
        Ok(Self {
            m: table_from_rows("OCV", rows, ocv_row::COUNT, 2)?,
        })
    }

    /// Interval `(k, k+1)` bracketing `x` on row `axis`. Below the first
    /// breakpoint this is the first interval, beyond the last the last one.
    fn bracket(&self, axis: usize, x: f32) -> usize {
        let xs = self.m.row(axis);
        let last_interval = xs.len() - 2;
        if x <= xs[0] {
            return 0;
        }
        xs.windows(2)
            .position(|w| w[0] <= x && x <= w[1])
            .unwrap_or(last_interval)
    }

    /// Line through `(x_k, y_k)` and `(x_k+1, y_k+1)` where
    /// `y_i = base[i] + t * slope[i]`, evaluated at `x`.
    fn interpolate(&self, axis: usize, base: usize, slope: usize, x: f32, t: f32) -> f32 {
        let k = self.bracket(axis, x);
        let xs = self.m.row(axis);
        let y = |i: usize| self.m[(base, i)] + t * self.m[(slope, i)];
        let (y0, y1) = (y(k), y(k + 1));
        (x - xs[k + 1]) * (y1 - y0) / (xs[k + 1] - xs[k]) + y1
    }

    pub fn soc_from_ocv(&self, ocv: f32, t: f32) -> f32 {
        self.interpolate(ocv_row::OCV, ocv_row::SOC0, ocv_row::SOC_REL, ocv, t)
    }

    pub fn ocv_from_soc(&self, soc: f32, t: f32) -> f32 {
        self.interpolate(ocv_row::SOC, ocv_row::OCV0, ocv_row::OCV_REL, soc, t)
    }

    /// Slope of the OCV curve at `soc`.
    pub fn docv_from_soc(&self, soc: f32, t: f32) -> f32 {
        self.interpolate(ocv_row::SOC, ocv_row::DOCV0, ocv_row::DOCV_REL, soc, t)
    }
}

/// Both tables the filter reads from.
#[derive(Debug, Clone)]
pub struct CellModel {
    pub params: ParamTable,
    pub ocv: OcvTable,
}

impl CellModel {
    pub fn from_rows(param_rows: &[Vec<f32>], ocv_rows: &[Vec<f32>]) -> Result<Self, SocError> {
        Ok(Self {
            params: ParamTable::from_rows(param_rows)?,
            ocv: OcvTable::from_rows(ocv_rows)?,
        })
    }
}
