//! Bounded uniform distribution with independent dimensions.

use super::{check_point, Distribution};
use crate::core::ConfigurationError;
use crate::utils::{Matrix, MatrixError};
use rand::{Rng, RngCore};

/// Uniform distribution over the box `[lower_i, upper_i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformDistribution {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl UniformDistribution {
    /// Create a distribution; every lower bound must be strictly below its upper bound.
    pub fn new(lower: &[f64], upper: &[f64]) -> Result<Self, ConfigurationError> {
        if lower.len() != upper.len() {
            return Err(ConfigurationError::Matrix(MatrixError::InvalidLength {
                expected: lower.len(),
                got: upper.len(),
            }));
        }
        for (index, (&lo, &hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if !(lo < hi) || !lo.is_finite() || !hi.is_finite() {
                return Err(ConfigurationError::InvalidBounds {
                    index,
                    lower: lo,
                    upper: hi,
                });
            }
        }
        Ok(Self {
            lower: lower.to_vec(),
            upper: upper.to_vec(),
        })
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    fn ranges(&self) -> impl Iterator<Item = f64> + '_ {
        self.lower.iter().zip(self.upper.iter()).map(|(lo, hi)| hi - lo)
    }
}

impl Distribution for UniformDistribution {
    fn dimension(&self) -> usize {
        self.lower.len()
    }

    fn mean(&self) -> Matrix {
        Matrix::from_fn(self.dimension(), 1, |i, _| 0.5 * (self.lower[i] + self.upper[i]))
    }

    /// Diagonal matrix of range²/12; dimensions are independent.
    fn variance(&self) -> Matrix {
        let diag: Vec<f64> = self.ranges().map(|r| r * r / 12.0).collect();
        Matrix::diagonal(&diag)
    }

    fn probability_density(&self, x: &Matrix) -> Result<f64, MatrixError> {
        check_point(x, self.dimension())?;
        let inside = (0..self.dimension())
            .all(|i| x.at(i, 0) >= self.lower[i] && x.at(i, 0) <= self.upper[i]);
        if !inside {
            return Ok(0.0);
        }
        Ok(self.ranges().map(|r| 1.0 / r).product())
    }

    fn random_realization(&self, rng: &mut dyn RngCore) -> Matrix {
        Matrix::from_fn(self.dimension(), 1, |i, _| {
            let u: f64 = rng.gen();
            self.lower[i] + u * (self.upper[i] - self.lower[i])
        })
    }
}
