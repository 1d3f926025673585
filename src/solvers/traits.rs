//! Core traits for likelihood-based estimation.

use crate::core::{ConfigurationError, EstimationResult, ModelStatus, OptionsError};
use crate::utils::{Matrix, MatrixError};
use thiserror::Error;

/// Errors that can occur while building or fitting a model.
///
/// Non-convergence is not an error: it is reported through the
/// [`ModelStatus`] of the fitted model.
#[derive(Debug, Error)]
pub enum EstimationError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error("insufficient observations: need at least {needed}, got {got}")]
    InsufficientObservations { needed: usize, got: usize },

    #[error("numerical error: {0}")]
    Numerical(String),
}

/// Value, gradient and Hessian of an objective at one parameter vector.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub value: f64,
    /// Column vector of first derivatives.
    pub gradient: Matrix,
    /// Symmetric matrix of second derivatives.
    pub hessian: Matrix,
}

/// An objective function with analytic first and second derivatives.
///
/// The optimizer maximizes it. Points outside the domain of the objective
/// evaluate to `-inf` (or NaN) rather than to an error; errors are reserved
/// for malformed parameter vectors.
pub trait DifferentiableObjective {
    /// Length of the parameter vector.
    fn n_parameters(&self) -> usize;

    /// Objective value only, used by the line search.
    fn value(&self, parameters: &Matrix) -> Result<f64, EstimationError>;

    /// Objective value with its gradient and Hessian.
    fn evaluate(&self, parameters: &Matrix) -> Result<Evaluation, EstimationError>;

    /// True when `parameters` sit where the objective has flattened out
    /// numerically, so a vanishing change says nothing about a maximum.
    fn is_saturated(&self, _parameters: &Matrix) -> bool {
        false
    }

    /// Check that `parameters` is a column vector of the right length.
    fn check_parameters(&self, parameters: &Matrix) -> Result<(), EstimationError> {
        if !parameters.is_column_vector() || parameters.nrows() != self.n_parameters() {
            return Err(MatrixError::InvalidLength {
                expected: self.n_parameters(),
                got: parameters.nrows() * parameters.ncols(),
            }
            .into());
        }
        Ok(())
    }
}

/// A model that can be estimated.
///
/// Estimation consumes the model: a fitted model is never refitted, a fresh
/// model is built instead.
pub trait Model {
    /// The type of the fitted model.
    type Fitted: FittedModel;

    /// Estimate the parameters.
    fn estimate(self) -> Result<Self::Fitted, EstimationError>;
}

/// A fitted model.
pub trait FittedModel {
    /// Access the estimation results (parameters, covariance, statistics).
    fn result(&self) -> &EstimationResult;

    /// Predictions on the response scale for the design rows `x`.
    fn predict(&self, x: &Matrix) -> Result<Matrix, MatrixError>;

    /// Get the parameter estimates (convenience method).
    fn parameters(&self) -> &Matrix {
        &self.result().parameters
    }

    /// Get the maximized log-likelihood (convenience method).
    fn log_likelihood(&self) -> f64 {
        self.result().log_likelihood
    }

    fn fitted_values(&self) -> &Matrix {
        &self.result().fitted_values
    }

    fn residuals(&self) -> &Matrix {
        &self.result().residuals
    }

    /// Asymptotic covariance of the estimates, when available.
    fn covariance(&self) -> Option<&Matrix> {
        self.result().covariance.as_ref()
    }

    fn status(&self) -> ModelStatus {
        self.result().status
    }

    fn is_converged(&self) -> bool {
        self.result().is_converged()
    }
}

/// Design rows must have one column per parameter.
pub(crate) fn check_design(x: &Matrix, n_parameters: usize) -> Result<(), MatrixError> {
    if x.ncols() != n_parameters {
        return Err(MatrixError::DimensionMismatch {
            operation: "predict",
            left_rows: x.nrows(),
            left_cols: x.ncols(),
            right_rows: n_parameters,
            right_cols: 1,
        });
    }
    Ok(())
}
