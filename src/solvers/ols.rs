//! Ordinary least squares via the normal equations.
//!
//! The closed-form path of the estimation engine: no iteration,
//! β = (X'X)⁻¹X'Y, residual variance RSS/(n - p).
//!
//! # Example
//!
//! ```rust,ignore
//! use copula_glm::prelude::*;
//!
//! let fitted = LinearModel::new(&table, "height ~ dbh + species")?.estimate()?;
//! println!("σ² = {}", fitted.residual_variance());
//! println!("{}", fitted.summary());
//! ```

use crate::core::{EstimationResult, ModelStatus, OptimizerOptions, OptionsError};
use crate::data::{DataStructure, Table, INTERCEPT_NAME};
use crate::inference::{CoefficientInference, CoefficientTable, ReferenceDistribution};
use crate::solvers::traits::{check_design, EstimationError, FittedModel, Model};
use crate::utils::{detect_constant_columns, Matrix, MatrixError};
use std::f64::consts::PI;

/// Solve the normal equations for `x` and `y`.
///
/// Returns β and (X'X)⁻¹. A singular X'X is a numerical error naming the
/// constant columns of `x`, if any.
pub fn solve_normal_equations(
    x: &Matrix,
    y: &Matrix,
    column_names: &[String],
) -> Result<(Matrix, Matrix), EstimationError> {
    let xt = x.transpose();
    let xtx = xt.multiply(x)?;
    let xtx_inverse = xtx.invert().map_err(|e| match e {
        MatrixError::Singular => {
            let constant: Vec<&str> = detect_constant_columns(x, 1e-10)
                .into_iter()
                .enumerate()
                .filter(|&(j, is_constant)| is_constant && column_names[j] != INTERCEPT_NAME)
                .map(|(j, _)| column_names[j].as_str())
                .collect();
            if constant.is_empty() {
                EstimationError::Numerical("X'X is singular".to_string())
            } else {
                EstimationError::Numerical(format!(
                    "X'X is singular; constant columns: {}",
                    constant.join(", ")
                ))
            }
        }
        other => other.into(),
    })?;
    let beta = xtx_inverse.multiply(&xt.multiply(y)?)?;
    Ok((beta, xtx_inverse))
}

/// Linear model fitted by ordinary least squares.
#[derive(Debug, Clone)]
pub struct LinearModel {
    structure: DataStructure,
    options: OptimizerOptions,
}

impl LinearModel {
    /// Build the design matrix and response from `table` and `formula`.
    pub fn new(table: &dyn Table, formula: &str) -> Result<Self, EstimationError> {
        Ok(Self::from_structure(DataStructure::new(table, formula)?))
    }

    pub fn from_structure(structure: DataStructure) -> Self {
        Self {
            structure,
            options: OptimizerOptions::default(),
        }
    }

    /// Only `compute_inference` and `confidence_level` apply to OLS.
    pub fn with_options(mut self, options: OptimizerOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        self.options = options;
        Ok(self)
    }

    pub fn structure(&self) -> &DataStructure {
        &self.structure
    }
}

impl Model for LinearModel {
    type Fitted = FittedLinearModel;

    fn estimate(self) -> Result<FittedLinearModel, EstimationError> {
        let x = self.structure.x();
        let y = self.structure.y();
        let n = x.nrows();
        let p = x.ncols();

        if n < p {
            return Err(EstimationError::InsufficientObservations { needed: p, got: n });
        }

        let (beta, xtx_inverse) = solve_normal_equations(x, y, self.structure.column_names())?;
        let predicted = x.multiply(&beta)?;
        let residuals = y.subtract(&predicted)?;

        let rss = residuals.inner_product(&residuals)?;
        let df = n - p;
        let residual_variance = if df > 0 { rss / df as f64 } else { f64::NAN };

        // Maximized Gaussian log-likelihood, σ² at its MLE RSS/n.
        let nf = n as f64;
        let log_likelihood = -0.5 * nf * ((2.0 * PI * rss / nf).ln() + 1.0);

        let has_intercept = self
            .structure
            .column_names()
            .iter()
            .any(|c| c == INTERCEPT_NAME);
        let y_mean = y.sum() / nf;
        let tss: f64 = (0..n)
            .map(|i| {
                let yi = y.at(i, 0);
                if has_intercept {
                    (yi - y_mean).powi(2)
                } else {
                    yi * yi
                }
            })
            .sum();
        let r_squared = if tss > 0.0 { 1.0 - rss / tss } else { f64::NAN };

        let mut result = EstimationResult::new(
            self.structure.column_names().to_vec(),
            beta,
            predicted,
            residuals,
            log_likelihood,
            0,
            ModelStatus::Converged,
        );
        if df > 0 {
            result.covariance = Some(xtx_inverse.scalar_multiply(residual_variance));
            if self.options.compute_inference {
                CoefficientInference::apply(
                    &mut result,
                    ReferenceDistribution::StudentsT(df as f64),
                    self.options.confidence_level,
                );
            }
        }

        Ok(FittedLinearModel {
            structure: self.structure,
            result,
            residual_variance,
            r_squared,
            xtx_inverse,
        })
    }
}

/// A fitted linear model.
#[derive(Debug, Clone)]
pub struct FittedLinearModel {
    structure: DataStructure,
    result: EstimationResult,
    residual_variance: f64,
    r_squared: f64,
    xtx_inverse: Matrix,
}

impl FittedLinearModel {
    pub fn structure(&self) -> &DataStructure {
        &self.structure
    }

    /// Residual variance RSS/(n - p); NaN for an exact fit.
    pub fn residual_variance(&self) -> f64 {
        self.residual_variance
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// (X'X)⁻¹ at the fitted design.
    pub fn xtx_inverse(&self) -> &Matrix {
        &self.xtx_inverse
    }

    pub fn summary(&self) -> CoefficientTable {
        CoefficientTable::from_result(&self.result)
    }
}

impl FittedModel for FittedLinearModel {
    fn result(&self) -> &EstimationResult {
        &self.result
    }

    fn predict(&self, x: &Matrix) -> Result<Matrix, MatrixError> {
        check_design(x, self.result.n_parameters)?;
        x.multiply(&self.result.parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataSet;

    fn line() -> DataSet {
        // y = 1 + 2x exactly, plus one perturbed point
        DataSet::from_numeric_columns(&[
            ("x", vec![0.0, 1.0, 2.0, 3.0, 4.0]),
            ("y", vec![1.0, 3.0, 5.0, 7.0, 9.5]),
        ])
        .unwrap()
    }

    #[test]
    fn test_simple_fit() {
        let fitted = LinearModel::new(&line(), "y ~ x").unwrap().estimate().unwrap();
        // Closed form: slope = Sxy/Sxx = 21/10, intercept = 5.1 - 2.1·2
        assert!((fitted.parameters().at(1, 0) - 2.1).abs() < 1e-10);
        assert!((fitted.parameters().at(0, 0) - 0.9).abs() < 1e-10);
        assert!(fitted.is_converged());
        assert_eq!(fitted.result().iterations, 0);
        assert!(fitted.r_squared() > 0.99);
        assert!(fitted.result().std_errors.is_some());
    }

    #[test]
    fn test_residual_variance() {
        let fitted = LinearModel::new(&line(), "y ~ x").unwrap().estimate().unwrap();
        let rss: f64 = fitted.residuals().to_vec().iter().map(|r| r * r).sum();
        assert!((fitted.residual_variance() - rss / 3.0).abs() < 1e-12);
        let cov = fitted.covariance().unwrap();
        assert!((cov.at(1, 1) - fitted.residual_variance() / 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_predict() {
        let fitted = LinearModel::new(&line(), "y ~ x").unwrap().estimate().unwrap();
        let x_new = Matrix::from_rows(&[&[1.0, 10.0]]).unwrap();
        let pred = fitted.predict(&x_new).unwrap();
        assert!((pred.at(0, 0) - 21.9).abs() < 1e-10);
        assert!(fitted.predict(&Matrix::zeros(1, 3)).is_err());
    }

    #[test]
    fn test_singular_design() {
        let data = DataSet::from_numeric_columns(&[
            ("x", vec![2.0, 2.0, 2.0]),
            ("y", vec![1.0, 2.0, 3.0]),
        ])
        .unwrap();
        let err = LinearModel::new(&data, "y ~ x").unwrap().estimate().unwrap_err();
        match err {
            EstimationError::Numerical(message) => assert!(message.contains('x')),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_insufficient_observations() {
        let data = DataSet::from_numeric_columns(&[
            ("a", vec![1.0]),
            ("b", vec![2.0]),
            ("y", vec![1.0]),
        ])
        .unwrap();
        assert!(matches!(
            LinearModel::new(&data, "y ~ a + b").unwrap().estimate(),
            Err(EstimationError::InsufficientObservations { needed: 3, got: 1 })
        ));
    }
}
