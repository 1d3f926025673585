//! Multivariate Gaussian distribution with settable central moments.

use super::{check_point, Distribution};
use crate::core::ConfigurationError;
use crate::utils::{Matrix, MatrixError};
use rand::RngCore;
use rand_distr::{Distribution as _, StandardNormal};
use std::f64::consts::PI;

/// Gaussian distribution N(μ, Σ).
///
/// Σ must be symmetric positive definite; this is checked whenever the
/// variance is set. The Cholesky factor, inverse and determinant of Σ are
/// cached so densities and draws do not refactor the matrix.
#[derive(Debug, Clone)]
pub struct GaussianDistribution {
    mean: Matrix,
    variance: Matrix,
    lower_cholesky: Matrix,
    inverse_variance: Matrix,
    determinant: f64,
}

impl GaussianDistribution {
    /// Create a distribution from a mean column vector and a variance matrix.
    pub fn new(mean: Matrix, variance: Matrix) -> Result<Self, ConfigurationError> {
        let (lower_cholesky, inverse_variance, determinant) = Self::factor(&mean, &variance)?;
        Ok(Self {
            mean,
            variance,
            lower_cholesky,
            inverse_variance,
            determinant,
        })
    }

    /// Univariate N(mean, variance).
    pub fn univariate(mean: f64, variance: f64) -> Result<Self, ConfigurationError> {
        Self::new(Matrix::column(&[mean]), Matrix::filled(1, 1, variance))
    }

    /// Standard multivariate normal of the given dimension.
    pub fn standard(dimension: usize) -> Self {
        Self {
            mean: Matrix::zeros(dimension, 1),
            variance: Matrix::identity(dimension),
            lower_cholesky: Matrix::identity(dimension),
            inverse_variance: Matrix::identity(dimension),
            determinant: 1.0,
        }
    }

    fn factor(mean: &Matrix, variance: &Matrix) -> Result<(Matrix, Matrix, f64), ConfigurationError> {
        if !mean.is_column_vector() || !variance.is_square() || variance.nrows() != mean.nrows() {
            return Err(ConfigurationError::Matrix(MatrixError::DimensionMismatch {
                operation: "gaussian_distribution",
                left_rows: mean.nrows(),
                left_cols: mean.ncols(),
                right_rows: variance.nrows(),
                right_cols: variance.ncols(),
            }));
        }
        if !variance.is_symmetric(1e-10 * variance.max_abs().max(1.0)) {
            return Err(ConfigurationError::NonPositiveDefiniteVariance);
        }
        let lower = variance
            .cholesky()
            .map_err(|_| ConfigurationError::NonPositiveDefiniteVariance)?;
        let inverse = variance
            .invert()
            .map_err(|_| ConfigurationError::NonPositiveDefiniteVariance)?;
        let determinant = variance.determinant()?;
        Ok((lower, inverse, determinant))
    }

    /// Replace the mean. The dimension must not change.
    pub fn set_mean(&mut self, mean: Matrix) -> Result<(), ConfigurationError> {
        if !mean.is_column_vector() || mean.nrows() != self.mean.nrows() {
            return Err(ConfigurationError::Matrix(MatrixError::DimensionMismatch {
                operation: "set_mean",
                left_rows: self.mean.nrows(),
                left_cols: 1,
                right_rows: mean.nrows(),
                right_cols: mean.ncols(),
            }));
        }
        self.mean = mean;
        Ok(())
    }

    /// Replace the variance, re-checking positive definiteness.
    pub fn set_variance(&mut self, variance: Matrix) -> Result<(), ConfigurationError> {
        let (lower, inverse, determinant) = Self::factor(&self.mean, &variance)?;
        self.variance = variance;
        self.lower_cholesky = lower;
        self.inverse_variance = inverse;
        self.determinant = determinant;
        Ok(())
    }

    /// Lower Cholesky factor of the variance.
    pub fn lower_cholesky(&self) -> &Matrix {
        &self.lower_cholesky
    }
}

impl Distribution for GaussianDistribution {
    fn dimension(&self) -> usize {
        self.mean.nrows()
    }

    fn mean(&self) -> Matrix {
        self.mean.clone()
    }

    fn variance(&self) -> Matrix {
        self.variance.clone()
    }

    fn probability_density(&self, x: &Matrix) -> Result<f64, MatrixError> {
        check_point(x, self.dimension())?;
        let residual = x.subtract(&self.mean)?;
        let quadratic = residual
            .transpose()
            .multiply(&self.inverse_variance)?
            .multiply(&residual)?
            .at(0, 0);
        let k = self.dimension() as f64;
        let normalizing = (2.0 * PI).powf(-0.5 * k) * self.determinant.powf(-0.5);
        Ok(normalizing * (-0.5 * quadratic).exp())
    }

    fn random_realization(&self, rng: &mut dyn RngCore) -> Matrix {
        let k = self.dimension();
        let z = Matrix::from_fn(k, 1, |_, _| StandardNormal.sample(&mut *rng));
        let mut draw = self.mean.clone();
        for i in 0..k {
            let shift: f64 = (0..=i).map(|j| self.lower_cholesky.at(i, j) * z.at(j, 0)).sum();
            draw.accumulate(i, 0, shift);
        }
        draw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_univariate_density() {
        let dist = GaussianDistribution::univariate(1.0, 4.0).unwrap();
        let density = dist.probability_density(&Matrix::column(&[1.0])).unwrap();
        let expected = 1.0 / (2.0 * PI * 4.0).sqrt();
        assert!((density - expected).abs() < 1e-12);
    }

    #[test]
    fn test_bivariate_density() {
        let variance = Matrix::from_rows(&[&[2.0, 0.5], &[0.5, 1.0]]).unwrap();
        let dist = GaussianDistribution::new(Matrix::zeros(2, 1), variance).unwrap();
        let x = Matrix::column(&[1.0, -1.0]);
        // det = 1.75, inverse = [[1, -0.5], [-0.5, 2]] / 1.75
        let quad: f64 = (1.0 + 1.0 + 2.0) / 1.75;
        let expected = (-0.5 * quad).exp() / (2.0 * PI * 1.75_f64.sqrt());
        assert!((dist.probability_density(&x).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_non_positive_definite_variance() {
        let variance = Matrix::from_rows(&[&[1.0, 2.0], &[2.0, 1.0]]).unwrap();
        assert_eq!(
            GaussianDistribution::new(Matrix::zeros(2, 1), variance).unwrap_err(),
            ConfigurationError::NonPositiveDefiniteVariance
        );
        assert!(GaussianDistribution::univariate(0.0, -1.0).is_err());

        let mut dist = GaussianDistribution::standard(2);
        let asymmetric = Matrix::from_rows(&[&[1.0, 0.3], &[0.0, 1.0]]).unwrap();
        assert!(dist.set_variance(asymmetric).is_err());
    }

    #[test]
    fn test_density_dimension_mismatch() {
        let dist = GaussianDistribution::standard(2);
        assert!(dist.probability_density(&Matrix::column(&[0.0])).is_err());
    }

    #[test]
    fn test_random_realization_moments() {
        let variance = Matrix::from_rows(&[&[1.0, 0.6], &[0.6, 2.0]]).unwrap();
        let mean = Matrix::column(&[3.0, -1.0]);
        let dist = GaussianDistribution::new(mean, variance).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        let n = 50_000;
        let draws: Vec<Matrix> = (0..n).map(|_| dist.random_realization(&mut rng)).collect();
        let m0 = draws.iter().map(|d| d.at(0, 0)).sum::<f64>() / n as f64;
        let m1 = draws.iter().map(|d| d.at(1, 0)).sum::<f64>() / n as f64;
        let cov = draws
            .iter()
            .map(|d| (d.at(0, 0) - m0) * (d.at(1, 0) - m1))
            .sum::<f64>()
            / (n - 1) as f64;

        assert!((m0 - 3.0).abs() < 0.03);
        assert!((m1 + 1.0).abs() < 0.04);
        assert!((cov - 0.6).abs() < 0.05);
    }
}
