//! Optimizer options and configuration.

use thiserror::Error;

/// Rule used to declare convergence of the Newton iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConvergenceCriterion {
    /// |ℓ(k+1) - ℓ(k)| <= tolerance * (1 + |ℓ(k)|) (default).
    #[default]
    ObjectiveChange,
    /// Largest absolute component of the projected gradient <= tolerance.
    GradientNorm,
}

/// Configuration options for the optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    /// Maximum number of Newton iterations (default: 100).
    pub max_iterations: usize,
    /// Convergence tolerance (default: 1e-8).
    pub tolerance: f64,
    /// Convergence rule (default: objective change).
    pub criterion: ConvergenceCriterion,
    /// Maximum number of step halvings per iteration (default: 50).
    pub max_step_halvings: usize,
    /// Whether to compute standard errors and inference statistics (default: true).
    pub compute_inference: bool,
    /// Confidence level for Wald intervals (default: 0.95).
    pub confidence_level: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
            criterion: ConvergenceCriterion::ObjectiveChange,
            max_step_halvings: 50,
            compute_inference: true,
            confidence_level: 0.95,
        }
    }
}

/// Errors that can occur when validating optimizer options.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(usize),
    #[error("confidence_level must be in (0, 1), got {0}")]
    InvalidConfidenceLevel(f64),
}

impl OptimizerOptions {
    /// Create a new builder for optimizer options.
    pub fn builder() -> OptimizerOptionsBuilder {
        OptimizerOptionsBuilder::default()
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !(self.tolerance > 0.0) {
            return Err(OptionsError::InvalidTolerance(self.tolerance));
        }
        if self.max_iterations < 1 {
            return Err(OptionsError::InvalidMaxIterations(self.max_iterations));
        }
        if self.confidence_level <= 0.0 || self.confidence_level >= 1.0 {
            return Err(OptionsError::InvalidConfidenceLevel(self.confidence_level));
        }
        Ok(())
    }
}

/// Builder for `OptimizerOptions`.
#[derive(Debug, Clone, Default)]
pub struct OptimizerOptionsBuilder {
    options: OptimizerOptions,
}

impl OptimizerOptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of iterations.
    pub fn max_iterations(mut self, max_iter: usize) -> Self {
        self.options.max_iterations = max_iter;
        self
    }

    /// Set the convergence tolerance.
    pub fn tolerance(mut self, tol: f64) -> Self {
        self.options.tolerance = tol;
        self
    }

    /// Set the convergence criterion.
    pub fn criterion(mut self, criterion: ConvergenceCriterion) -> Self {
        self.options.criterion = criterion;
        self
    }

    /// Set the maximum number of step halvings per iteration.
    pub fn max_step_halvings(mut self, halvings: usize) -> Self {
        self.options.max_step_halvings = halvings;
        self
    }

    /// Set whether to compute inference statistics.
    pub fn compute_inference(mut self, compute: bool) -> Self {
        self.options.compute_inference = compute;
        self
    }

    /// Set the confidence level for confidence intervals.
    pub fn confidence_level(mut self, level: f64) -> Self {
        self.options.confidence_level = level;
        self
    }

    /// Build and validate the options.
    pub fn build(self) -> Result<OptimizerOptions, OptionsError> {
        self.options.validate()?;
        Ok(self.options)
    }

    /// Build the options without validation.
    pub fn build_unchecked(self) -> OptimizerOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = OptimizerOptions::default();
        assert_eq!(opts.max_iterations, 100);
        assert!((opts.tolerance - 1e-8).abs() < 1e-20);
        assert_eq!(opts.criterion, ConvergenceCriterion::ObjectiveChange);
        assert!(opts.compute_inference);
    }

    #[test]
    fn test_builder() {
        let opts = OptimizerOptions::builder()
            .max_iterations(20)
            .criterion(ConvergenceCriterion::GradientNorm)
            .build()
            .unwrap();
        assert_eq!(opts.max_iterations, 20);
        assert_eq!(opts.criterion, ConvergenceCriterion::GradientNorm);
    }

    #[test]
    fn test_validation_invalid_tolerance() {
        let result = OptimizerOptions::builder().tolerance(0.0).build();
        assert!(matches!(result, Err(OptionsError::InvalidTolerance(_))));
    }

    #[test]
    fn test_validation_invalid_max_iterations() {
        let result = OptimizerOptions::builder().max_iterations(0).build();
        assert!(matches!(result, Err(OptionsError::InvalidMaxIterations(_))));
    }

    #[test]
    fn test_validation_invalid_confidence_level() {
        let result = OptimizerOptions::builder().confidence_level(1.0).build();
        assert!(matches!(
            result,
            Err(OptionsError::InvalidConfidenceLevel(_))
        ));
    }

    #[test]
    fn test_build_unchecked_skips_validation() {
        let opts = OptimizerOptions::builder().tolerance(-1.0).build_unchecked();
        assert!(opts.validate().is_err());
    }
}
