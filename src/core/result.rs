//! Estimation result structures.

use crate::utils::Matrix;

/// Outcome of an `estimate` call on a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    /// The optimizer met its convergence criterion (always the case for OLS).
    Converged,
    /// The optimizer stopped before meeting its criterion. The parameters are
    /// the last accepted iterate and may still be diagnostically useful.
    FailedToConverge,
}

/// Complete result from a model fit.
///
/// Contains the parameter estimates, fit statistics, and optionally Wald
/// inference statistics (standard errors, z-statistics, p-values, intervals).
#[derive(Debug, Clone)]
pub struct EstimationResult {
    // ========== Core Results ==========
    /// Names of the estimated parameters, in order.
    pub parameter_names: Vec<String>,

    /// Parameter estimates as a column vector.
    pub parameters: Matrix,

    /// Asymptotic covariance of the estimates (negative inverse Hessian).
    pub covariance: Option<Matrix>,

    /// Fitted values on the response scale.
    pub fitted_values: Matrix,

    /// Residuals (y - fitted_values).
    pub residuals: Matrix,

    // ========== Fit Statistics ==========
    /// Maximized log-likelihood.
    pub log_likelihood: f64,

    /// Number of observations.
    pub n_observations: usize,

    /// Number of estimated parameters.
    pub n_parameters: usize,

    /// Akaike Information Criterion.
    pub aic: f64,

    /// Bayesian Information Criterion.
    pub bic: f64,

    // ========== Optimizer State ==========
    /// Number of optimizer iterations (0 for closed-form fits).
    pub iterations: usize,

    /// Convergence status.
    pub status: ModelStatus,

    // ========== Inference Statistics (Optional) ==========
    /// Standard errors of the estimates.
    pub std_errors: Option<Matrix>,

    /// z-statistics (estimate / standard error).
    pub z_statistics: Option<Matrix>,

    /// Two-sided p-values of the z-statistics.
    pub p_values: Option<Matrix>,

    /// Lower bounds of the Wald confidence intervals.
    pub conf_interval_lower: Option<Matrix>,

    /// Upper bounds of the Wald confidence intervals.
    pub conf_interval_upper: Option<Matrix>,

    /// Confidence level used for intervals.
    pub confidence_level: f64,
}

impl EstimationResult {
    /// Create a result with the core fields filled and inference left empty.
    pub(crate) fn new(
        parameter_names: Vec<String>,
        parameters: Matrix,
        fitted_values: Matrix,
        residuals: Matrix,
        log_likelihood: f64,
        iterations: usize,
        status: ModelStatus,
    ) -> Self {
        let n_observations = fitted_values.nrows();
        let n_parameters = parameters.nrows();
        let k = n_parameters as f64;
        let n = n_observations as f64;

        Self {
            parameter_names,
            parameters,
            covariance: None,
            fitted_values,
            residuals,
            log_likelihood,
            n_observations,
            n_parameters,
            aic: 2.0 * k - 2.0 * log_likelihood,
            bic: k * n.ln() - 2.0 * log_likelihood,
            iterations,
            status,
            std_errors: None,
            z_statistics: None,
            p_values: None,
            conf_interval_lower: None,
            conf_interval_upper: None,
            confidence_level: 0.95,
        }
    }

    /// True when the fit converged.
    pub fn is_converged(&self) -> bool {
        self.status == ModelStatus::Converged
    }

    /// Estimate of the named parameter.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.parameter_names
            .iter()
            .position(|n| n == name)
            .map(|i| self.parameters.at(i, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_information_criteria() {
        let result = EstimationResult::new(
            vec!["a".to_string(), "b".to_string()],
            Matrix::column(&[1.0, 2.0]),
            Matrix::zeros(10, 1),
            Matrix::zeros(10, 1),
            -5.0,
            3,
            ModelStatus::Converged,
        );
        assert!((result.aic - 14.0).abs() < 1e-12);
        assert!((result.bic - (2.0 * 10.0_f64.ln() + 10.0)).abs() < 1e-12);
        assert_eq!(result.parameter("b"), Some(2.0));
        assert_eq!(result.parameter("c"), None);
        assert!(result.is_converged());
    }
}
