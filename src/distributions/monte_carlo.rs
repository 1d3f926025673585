//! Empirical summaries of Monte Carlo realizations.

use crate::utils::{Matrix, MatrixError};

/// Collects realizations of a random vector and summarizes them.
#[derive(Debug, Clone, Default)]
pub struct MonteCarloEstimate {
    realizations: Vec<Matrix>,
}

impl MonteCarloEstimate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a realization. All realizations must be column vectors of the same length.
    pub fn add_realization(&mut self, realization: Matrix) -> Result<(), MatrixError> {
        if let Some(first) = self.realizations.first() {
            if realization.nrows() != first.nrows() || !realization.is_column_vector() {
                return Err(MatrixError::DimensionMismatch {
                    operation: "add_realization",
                    left_rows: first.nrows(),
                    left_cols: 1,
                    right_rows: realization.nrows(),
                    right_cols: realization.ncols(),
                });
            }
        } else if !realization.is_column_vector() {
            return Err(MatrixError::InvalidLength {
                expected: 1,
                got: realization.ncols(),
            });
        }
        self.realizations.push(realization);
        Ok(())
    }

    pub fn n_realizations(&self) -> usize {
        self.realizations.len()
    }

    fn dimension(&self) -> usize {
        self.realizations.first().map_or(0, Matrix::nrows)
    }

    /// Empirical mean of the realizations (empty vector when none were added).
    pub fn mean(&self) -> Matrix {
        let k = self.dimension();
        let n = self.realizations.len() as f64;
        let mut mean = Matrix::zeros(k, 1);
        for r in &self.realizations {
            for i in 0..k {
                mean.accumulate(i, 0, r.at(i, 0) / n);
            }
        }
        mean
    }

    /// Empirical variance-covariance matrix with the n - 1 denominator.
    pub fn variance(&self) -> Matrix {
        let k = self.dimension();
        let n = self.realizations.len();
        let mut cov = Matrix::zeros(k, k);
        if n < 2 {
            return cov;
        }
        let mean = self.mean();
        let denom = (n - 1) as f64;
        for r in &self.realizations {
            for i in 0..k {
                let di = r.at(i, 0) - mean.at(i, 0);
                for j in 0..k {
                    cov.accumulate(i, j, di * (r.at(j, 0) - mean.at(j, 0)) / denom);
                }
            }
        }
        cov
    }

    /// Per-dimension empirical percentile, `p` in [0, 1], by linear interpolation.
    pub fn percentile(&self, p: f64) -> Matrix {
        let k = self.dimension();
        let n = self.realizations.len();
        let p = p.clamp(0.0, 1.0);
        Matrix::from_fn(k, 1, |i, _| {
            let mut values: Vec<f64> = self.realizations.iter().map(|r| r.at(i, 0)).collect();
            values.sort_by(f64::total_cmp);
            let position = p * (n - 1) as f64;
            let lo = position.floor() as usize;
            let hi = position.ceil() as usize;
            let weight = position - lo as f64;
            values[lo] + weight * (values[hi] - values[lo])
        })
    }
}
