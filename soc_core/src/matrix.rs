//! Small dense `f32` matrix with the operations the Kalman filter needs.
//!
//! Storage is a flat row-major `Vec<f32>` holding exactly `rows * cols`
//! elements. Every binary operation comes in two forms:
//!
//! - `*_into(&self, .., out)` writes into a caller-supplied, pre-shaped
//!   result. Shapes are checked first; on mismatch `out` is left untouched.
//! - the owned form (`add`, `multiply`, ...) allocates a fresh result.
//!
//! `multiply_into` zeroes `out` before accumulating, so reusing a scratch
//! buffer gives the same result as a fresh one.
use std::fmt;
use std::ops::{Index, IndexMut};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MatrixError {
    #[error("{op}: shape mismatch {lhs:?} vs {rhs:?}")]
    Shape {
        op: &'static str,
        lhs: (usize, usize),
        rhs: (usize, usize),
    },
    #[error("{op}: {rows}x{cols} matrix is not square")]
    NotSquare {
        op: &'static str,
        rows: usize,
        cols: usize,
    },
    #[error("row index {index} out of range for {rows} rows")]
    Index { index: usize, rows: usize },
}

/// Row-major dense matrix. Equality is exact (shape and every element).
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

fn check_same(op: &'static str, a: &Matrix, b: &Matrix) -> Result<(), MatrixError> {
    if a.shape() == b.shape() {
        Ok(())
    } else {
        Err(MatrixError::Shape {
            op,
            lhs: a.shape(),
            rhs: b.shape(),
        })
    }
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = 1.0;
        }
        m
    }

    /// Square matrix with `diag` on the diagonal.
    pub fn from_diagonal(diag: &[f32]) -> Self {
        let n = diag.len();
        let mut m = Self::zeros(n, n);
        for (i, v) in diag.iter().enumerate() {
            m.data[i * n + i] = *v;
        }
        m
    }

    /// Build from row slices. All rows must have the same length.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self, MatrixError> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        let mut data = Vec::with_capacity(rows.len() * cols);
        for r in rows {
            let r = r.as_ref();
            if r.len() != cols {
                return Err(MatrixError::Shape {
                    op: "from_rows",
                    lhs: (1, cols),
                    rhs: (1, r.len()),
                });
            }
            data.extend_from_slice(r);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    /// Column vector from a slice.
    pub fn column(values: &[f32]) -> Self {
        Self {
            rows: values.len(),
            cols: 1,
            data: values.to_vec(),
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Row `r` as a slice. Callers check `r < rows`.
    pub(crate) fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub(crate) fn row_mut(&mut self, r: usize) -> &mut [f32] {
        &mut self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn get(&self, r: usize, c: usize) -> Option<f32> {
        (r < self.rows && c < self.cols).then(|| self.data[r * self.cols + c])
    }

    /// Main diagonal (length `min(rows, cols)`).
    pub fn diagonal(&self) -> Vec<f32> {
        (0..self.rows.min(self.cols))
            .map(|i| self.data[i * self.cols + i])
            .collect()
    }

    pub fn fill(&mut self, v: f32) {
        self.data.fill(v);
    }

    /// Overwrite `self` with `src`; shapes must match.
    pub fn copy_from(&mut self, src: &Matrix) -> Result<(), MatrixError> {
        check_same("copy", self, src)?;
        self.data.copy_from_slice(&src.data);
        Ok(())
    }

    /// Exact element-wise comparison, no tolerance.
    pub fn equals(&self, other: &Matrix) -> bool {
        self == other
    }

    pub fn all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }

    // ── element-wise ─────────────────────────────────────────────────────

    pub fn add_into(&self, rhs: &Matrix, out: &mut Matrix) -> Result<(), MatrixError> {
        check_same("add", self, rhs)?;
        check_same("add", self, out)?;
        for ((o, a), b) in out.data.iter_mut().zip(&self.data).zip(&rhs.data) {
            *o = a + b;
        }
        Ok(())
    }

    pub fn sub_into(&self, rhs: &Matrix, out: &mut Matrix) -> Result<(), MatrixError> {
        check_same("sub", self, rhs)?;
        check_same("sub", self, out)?;
        for ((o, a), b) in out.data.iter_mut().zip(&self.data).zip(&rhs.data) {
            *o = a - b;
        }
        Ok(())
    }

    pub fn scale_into(&self, f: f32, out: &mut Matrix) -> Result<(), MatrixError> {
        check_same("scale", self, out)?;
        for (o, a) in out.data.iter_mut().zip(&self.data) {
            *o = a * f;
        }
        Ok(())
    }

    pub fn add(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        let mut out = Self::zeros(self.rows, self.cols);
        self.add_into(rhs, &mut out)?;
        Ok(out)
    }

    pub fn sub(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        let mut out = Self::zeros(self.rows, self.cols);
        self.sub_into(rhs, &mut out)?;
        Ok(out)
    }

    pub fn scale(&self, f: f32) -> Matrix {
        Self {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|a| a * f).collect(),
        }
    }

    // ── products ─────────────────────────────────────────────────────────

    /// `out = self * rhs`. `out` is cleared first; every term is summed, so a
    /// non-finite entry in either operand always reaches the result.
    pub fn multiply_into(&self, rhs: &Matrix, out: &mut Matrix) -> Result<(), MatrixError> {
        if self.cols != rhs.rows {
            return Err(MatrixError::Shape {
                op: "multiply",
                lhs: self.shape(),
                rhs: rhs.shape(),
            });
        }
        if out.shape() != (self.rows, rhs.cols) {
            return Err(MatrixError::Shape {
                op: "multiply",
                lhs: out.shape(),
                rhs: (self.rows, rhs.cols),
            });
        }
        out.fill(0.0);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self.data[i * self.cols + k];
                let rrow = &rhs.data[k * rhs.cols..(k + 1) * rhs.cols];
                let orow = &mut out.data[i * rhs.cols..(i + 1) * rhs.cols];
                for (o, b) in orow.iter_mut().zip(rrow) {
                    *o += a * b;
                }
            }
        }
        Ok(())
    }

    pub fn multiply(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        let mut out = Self::zeros(self.rows, rhs.cols);
        self.multiply_into(rhs, &mut out)?;
        Ok(out)
    }

    pub fn transpose_into(&self, out: &mut Matrix) -> Result<(), MatrixError> {
        if out.shape() != (self.cols, self.rows) {
            return Err(MatrixError::Shape {
                op: "transpose",
                lhs: out.shape(),
                rhs: (self.cols, self.rows),
            });
        }
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Ok(())
    }

    pub fn transpose(&self) -> Matrix {
        let mut out = Self::zeros(self.cols, self.rows);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out.data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        out
    }

    // ── row operations ───────────────────────────────────────────────────

    fn check_row(&self, index: usize) -> Result<(), MatrixError> {
        if index < self.rows {
            Ok(())
        } else {
            Err(MatrixError::Index {
                index,
                rows: self.rows,
            })
        }
    }

    pub fn row_swap(&mut self, i: usize, j: usize) -> Result<(), MatrixError> {
        self.check_row(i)?;
        self.check_row(j)?;
        if i != j {
            for c in 0..self.cols {
                self.data.swap(i * self.cols + c, j * self.cols + c);
            }
        }
        Ok(())
    }

    /// `row_j -= factor * row_i`.
    pub fn row_reduce(&mut self, i: usize, j: usize, factor: f32) -> Result<(), MatrixError> {
        self.check_row(i)?;
        self.check_row(j)?;
        for c in 0..self.cols {
            let v = self.data[i * self.cols + c];
            self.data[j * self.cols + c] -= factor * v;
        }
        Ok(())
    }

    fn row_scale(&mut self, i: usize, f: f32) {
        for v in self.row_mut(i) {
            *v *= f;
        }
    }

    // ── decompositions ───────────────────────────────────────────────────

    /// Gauss–Jordan inverse.
    ///
    /// A zero pivot is swapped with the first lower row holding a non-zero
    /// entry in that column. There is no magnitude pivoting and singularity is
    /// not detected: a zero pivot with no candidate yields non-finite values.
    pub fn invert(&self) -> Result<Matrix, MatrixError> {
        if !self.is_square() {
            return Err(MatrixError::NotSquare {
                op: "invert",
                rows: self.rows,
                cols: self.cols,
            });
        }
        let n = self.rows;
        let mut work = self.clone();
        let mut inv = Self::identity(n);

        for p in 0..n {
            if work[(p, p)] == 0.0 {
                if let Some(k) = (p + 1..n).find(|&k| work[(k, p)] != 0.0) {
                    work.row_swap(p, k)?;
                    inv.row_swap(p, k)?;
                }
            }
            let pivot = work[(p, p)];
            work.row_scale(p, 1.0 / pivot);
            inv.row_scale(p, 1.0 / pivot);
            for r in (0..n).filter(|&r| r != p) {
                let f = work[(r, p)];
                work.row_reduce(p, r, f)?;
                inv.row_reduce(p, r, f)?;
            }
        }
        Ok(inv)
    }

    /// Lower-triangular Cholesky factor `L` with `L * Lᵀ = self`.
    /// Input is not validated; a non positive-definite matrix yields NaN.
    pub fn cholesky(&self) -> Result<Matrix, MatrixError> {
        if !self.is_square() {
            return Err(MatrixError::NotSquare {
                op: "cholesky",
                rows: self.rows,
                cols: self.cols,
            });
        }
        let n = self.rows;
        let mut l = Self::zeros(n, n);
        for i in 0..n {
            for j in 0..=i {
                let sum: f32 = (0..j).map(|k| l[(i, k)] * l[(j, k)]).sum();
                l[(i, j)] = if i == j {
                    (self[(i, i)] - sum).sqrt()
                } else {
                    (self[(i, j)] - sum) / l[(j, j)]
                };
            }
        }
        Ok(l)
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f32;
    #[inline]
    fn index(&self, (r, c): (usize, usize)) -> &f32 {
        debug_assert!(r < self.rows && c < self.cols);
        &self.data[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f32 {
        debug_assert!(r < self.rows && c < self.cols);
        &mut self.data[r * self.cols + c]
    }
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for r in 0..self.rows {
            for (c, v) in self.row(r).iter().enumerate() {
                if c > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{v:>10.4}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: &Matrix, b: &Matrix, tol: f32) -> bool {
        a.shape() == b.shape()
            && a.as_slice()
                .iter()
                .zip(b.as_slice())
                .all(|(x, y)| (x - y).abs() <= tol)
    }

    #[test]
    fn shape_mismatch_leaves_output_untouched() {
        let a = Matrix::zeros(2, 3);
        let b = Matrix::zeros(3, 2);
        let mut out = Matrix::from_rows(&[[7.0, 7.0], [7.0, 7.0]]).unwrap();
        let before = out.clone();
        assert!(matches!(
            a.add_into(&b, &mut out),
            Err(MatrixError::Shape { op: "add", .. })
        ));
        assert_eq!(out, before);
        // a * b is 2x2 so this one is fine, but b * a is 3x3
        assert!(b.multiply_into(&a, &mut out).is_err());
        assert_eq!(out, before);
    }

    #[test]
    fn multiply_into_dirty_buffer_matches_fresh() {
        let a = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let b = Matrix::from_rows(&[[5.0, 6.0], [7.0, 8.0]]).unwrap();
        let fresh = a.multiply(&b).unwrap();
        let mut dirty = Matrix::from_rows(&[[100.0, -3.0], [9.0, 1.0]]).unwrap();
        a.multiply_into(&b, &mut dirty).unwrap();
        assert_eq!(dirty, fresh);
        a.multiply_into(&b, &mut dirty).unwrap();
        assert_eq!(dirty, fresh);
        assert_eq!(fresh.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn invert_three_by_three_round_trips() {
        let a = Matrix::from_rows(&[[4.0, 1.0, 0.5], [1.0, 5.0, 1.0], [0.5, 1.0, 6.0]]).unwrap();
        let inv = a.invert().unwrap();
        assert!(approx(&inv.invert().unwrap(), &a, 1e-4));
        assert!(approx(&a.multiply(&inv).unwrap(), &Matrix::identity(3), 1e-5));
    }

    #[test]
    fn invert_swaps_zero_pivot() {
        let a = Matrix::from_rows(&[[0.0, 1.0], [1.0, 0.0]]).unwrap();
        let inv = a.invert().unwrap();
        assert!(approx(&inv, &a, 0.0));
    }

    #[test]
    fn invert_singular_is_not_finite() {
        let a = Matrix::from_rows(&[[1.0, 2.0], [2.0, 4.0]]).unwrap();
        assert!(!a.invert().unwrap().all_finite());
    }

    #[test]
    fn non_square_is_rejected() {
        let a = Matrix::zeros(2, 3);
        assert!(matches!(a.invert(), Err(MatrixError::NotSquare { .. })));
        assert!(matches!(a.cholesky(), Err(MatrixError::NotSquare { .. })));
    }

    #[test]
    fn cholesky_reconstructs_input() {
        let a = Matrix::from_rows(&[[4.0, 2.0], [2.0, 3.0]]).unwrap();
        let l = a.cholesky().unwrap();
        assert_eq!(l[(0, 1)], 0.0);
        assert!(approx(&l.multiply(&l.transpose()).unwrap(), &a, 1e-6));
    }

    #[test]
    fn row_ops_check_bounds() {
        let mut a = Matrix::identity(2);
        assert_eq!(
            a.row_swap(0, 2),
            Err(MatrixError::Index { index: 2, rows: 2 })
        );
        a.row_reduce(0, 1, 2.0).unwrap();
        assert_eq!(a.row(1), &[-2.0, 1.0]);
    }

    #[test]
    fn copy_from_requires_matching_shape() {
        let src = Matrix::from_rows(&[[1.0, 2.0], [3.0, 4.0]]).unwrap();
        let mut dst = Matrix::zeros(2, 2);
        dst.copy_from(&src).unwrap();
        assert!(dst.equals(&src));

        let mut wrong = Matrix::from_rows(&[[9.0, 9.0, 9.0]]).unwrap();
        let before = wrong.clone();
        assert!(matches!(
            wrong.copy_from(&src),
            Err(MatrixError::Shape { op: "copy", .. })
        ));
        assert_eq!(wrong, before);
    }

    #[test]
    fn equals_is_exact() {
        let a = Matrix::from_rows(&[[0.1, 0.2]]).unwrap();
        let mut b = a.clone();
        assert!(a.equals(&b));
        b[(0, 1)] += f32::EPSILON;
        assert!(!a.equals(&b));
        assert!(!a.equals(&a.transpose()));
    }

    #[test]
    fn transpose_into_fills_preshaped_output() {
        let a = Matrix::from_rows(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]).unwrap();
        let mut out = Matrix::zeros(3, 2);
        a.transpose_into(&mut out).unwrap();
        assert_eq!(out.as_slice(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert!(out.equals(&a.transpose()));

        let mut wrong = Matrix::from_rows(&[[7.0, 7.0, 7.0], [7.0, 7.0, 7.0]]).unwrap();
        let before = wrong.clone();
        assert!(matches!(
            a.transpose_into(&mut wrong),
            Err(MatrixError::Shape { op: "transpose", .. })
        ));
        assert_eq!(wrong, before);
    }

    #[test]
    fn multiply_propagates_non_finite_through_zero_entries() {
        let a = Matrix::from_rows(&[[0.0, 1.0]]).unwrap();
        let b = Matrix::from_rows(&[[f32::INFINITY], [2.0]]).unwrap();
        // 0 * inf is NaN and must not be skipped
        assert!(a.multiply(&b).unwrap()[(0, 0)].is_nan());
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let rows: Vec<Vec<f32>> = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(Matrix::from_rows(&rows).is_err());
    }

    fn small_matrix() -> impl Strategy<Value = Matrix> {
        (1usize..5, 1usize..5).prop_flat_map(|(r, c)| {
            // integer-valued entries keep add/sub exact
            prop::collection::vec(-1000i32..1000, r * c).prop_map(move |v| Matrix {
                rows: r,
                cols: c,
                data: v.into_iter().map(|x| x as f32).collect(),
            })
        })
    }

    proptest! {
        #[test]
        fn transpose_is_an_involution(a in small_matrix()) {
            prop_assert_eq!(a.transpose().transpose(), a);
        }

        #[test]
        fn add_then_sub_restores(a in small_matrix(), seed in any::<u64>()) {
            let b = Matrix {
                rows: a.rows,
                cols: a.cols,
                data: (0..a.data.len()).map(|i| ((seed >> (i % 32)) & 0xFF) as f32).collect(),
            };
            prop_assert_eq!(a.add(&b).unwrap().sub(&b).unwrap(), a);
        }

        #[test]
        fn identity_is_left_neutral(a in small_matrix()) {
            prop_assert_eq!(Matrix::identity(a.rows()).multiply(&a).unwrap(), a);
        }
    }
}
