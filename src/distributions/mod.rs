//! Probability distributions shared across parametric families.
//!
//! Every distribution exposes its mean, its variance-covariance matrix, its
//! density and a way to draw random realizations. Randomness always comes
//! from a caller-supplied generator; no seeding is imposed.

mod gaussian;
mod monte_carlo;
mod uniform;

pub use gaussian::GaussianDistribution;
pub use monte_carlo::MonteCarloEstimate;
pub use uniform::UniformDistribution;

use crate::utils::{Matrix, MatrixError};
use rand::RngCore;

/// A (possibly multivariate) continuous distribution.
pub trait Distribution {
    /// Number of dimensions of a realization.
    fn dimension(&self) -> usize;

    /// Mean as a column vector.
    fn mean(&self) -> Matrix;

    /// Variance-covariance matrix.
    fn variance(&self) -> Matrix;

    /// Density evaluated at the column vector `x`.
    fn probability_density(&self, x: &Matrix) -> Result<f64, MatrixError>;

    /// Draw one realization as a column vector.
    fn random_realization(&self, rng: &mut dyn RngCore) -> Matrix;
}

/// Check that `x` is a column vector of the expected length.
pub(crate) fn check_point(x: &Matrix, dimension: usize) -> Result<(), MatrixError> {
    if !x.is_column_vector() || x.nrows() != dimension {
        return Err(MatrixError::DimensionMismatch {
            operation: "probability_density",
            left_rows: dimension,
            left_cols: 1,
            right_rows: x.nrows(),
            right_cols: x.ncols(),
        });
    }
    Ok(())
}
