//! Generalized linear models fitted by Newton-Raphson on the log-likelihood.
//!
//! The objective is ℓ(β) = Σ ℓ(y_i, μ_i) with μ_i = h(x_i'β). With ℓ' and
//! ℓ'' the derivatives of the observation log-likelihood with respect to μ,
//! and h', h'' those of the inverse link with respect to η:
//!
//! - gradient: Σ ℓ'_i h'_i x_i
//! - Hessian: Σ (ℓ''_i h'_i² + ℓ'_i h''_i) x_i x_i'
//!
//! The asymptotic covariance of β̂ is the negative inverse Hessian at the
//! optimum.
//!
//! # Example
//!
//! ```rust,ignore
//! use copula_glm::prelude::*;
//!
//! let fitted = GeneralizedLinearModel::builder(&table, "dead ~ dbh + species")
//!     .family(FamilyKind::Bernoulli)
//!     .link(Link::Probit)
//!     .build()?
//!     .estimate()?;
//!
//! if !fitted.is_converged() {
//!     // the caller decides whether that is fatal
//! }
//! println!("log-likelihood = {}", fitted.log_likelihood());
//! ```

use crate::core::{
    ConfigurationError, EstimationResult, Family, FamilyKind, Link, ModelStatus,
    OptimizerOptions,
};
use crate::data::{DataStructure, Table, INTERCEPT_NAME};
use crate::inference::{CoefficientInference, CoefficientTable, ReferenceDistribution};
use crate::solvers::newton::{Bounds, NewtonOptimizer, OptimizationResult, OptimizationStatus};
use crate::solvers::traits::{
    check_design, DifferentiableObjective, EstimationError, Evaluation, FittedModel, Model,
};
use crate::utils::{Matrix, MatrixError};

// ========== Objective ==========

/// Log-likelihood of a GLM as a function of β.
#[derive(Debug, Clone, Copy)]
pub struct GlmObjective<'a> {
    x: &'a Matrix,
    y: &'a Matrix,
    family: Family,
}

/// Per-observation quantities at one β.
pub(crate) struct Marginals {
    pub mean: Vec<f64>,
    /// dμ/dη
    pub first: Vec<f64>,
    /// d²μ/dη²
    pub second: Vec<f64>,
}

impl<'a> GlmObjective<'a> {
    pub fn new(x: &'a Matrix, y: &'a Matrix, family: Family) -> Self {
        Self { x, y, family }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub(crate) fn x(&self) -> &Matrix {
        self.x
    }

    pub(crate) fn y(&self) -> &Matrix {
        self.y
    }

    /// η = Xβ, using the first `x.ncols()` entries of `parameters`.
    pub(crate) fn linear_predictor(&self, parameters: &Matrix) -> Vec<f64> {
        let p = self.x.ncols();
        (0..self.x.nrows())
            .map(|i| (0..p).map(|j| self.x.at(i, j) * parameters.at(j, 0)).sum())
            .collect()
    }

    pub(crate) fn marginals(&self, parameters: &Matrix) -> Marginals {
        let link = self.family.link();
        let eta = self.linear_predictor(parameters);
        Marginals {
            mean: eta.iter().map(|&e| link.inverse(e)).collect(),
            first: eta.iter().map(|&e| link.inverse_derivative(e)).collect(),
            second: eta.iter().map(|&e| link.inverse_second_derivative(e)).collect(),
        }
    }

    /// Σ w_i ℓ(y_i, μ_i), or -inf when some μ_i is outside the family's
    /// support. Without `weights` every w_i is 1.
    pub(crate) fn log_likelihood(&self, mean: &[f64], weights: Option<&[f64]>) -> f64 {
        let mut total = 0.0;
        for (i, &mu) in mean.iter().enumerate() {
            if !self.family.is_valid_mean(mu) {
                return f64::NEG_INFINITY;
            }
            let w = observation_weight(weights, i);
            total += w * self.family.log_likelihood(self.y.at(i, 0), mu);
        }
        total
    }

    /// Add the gradient and Hessian of the (weighted) log-likelihood into
    /// the leading p×p block.
    pub(crate) fn accumulate_derivatives(
        &self,
        marginals: &Marginals,
        weights: Option<&[f64]>,
        gradient: &mut Matrix,
        hessian: &mut Matrix,
    ) {
        let p = self.x.ncols();
        for i in 0..self.x.nrows() {
            let y = self.y.at(i, 0);
            let mu = marginals.mean[i];
            let d1 = self.family.log_likelihood_derivative(y, mu);
            let d2 = self.family.log_likelihood_second_derivative(y, mu);
            let h1 = marginals.first[i];
            let h2 = marginals.second[i];

            let w = observation_weight(weights, i);
            let score = w * d1 * h1;
            let weight = w * (d2 * h1 * h1 + d1 * h2);
            for j in 0..p {
                let xij = self.x.at(i, j);
                gradient.accumulate(j, 0, score * xij);
                for k in 0..=j {
                    hessian.accumulate(j, k, weight * xij * self.x.at(i, k));
                }
            }
        }
        for j in 0..p {
            for k in 0..j {
                hessian.put(k, j, hessian.at(j, k));
            }
        }
    }
}

impl DifferentiableObjective for GlmObjective<'_> {
    fn n_parameters(&self) -> usize {
        self.x.ncols()
    }

    fn value(&self, parameters: &Matrix) -> Result<f64, EstimationError> {
        self.check_parameters(parameters)?;
        let link = self.family.link();
        let mean: Vec<f64> = self
            .linear_predictor(parameters)
            .into_iter()
            .map(|e| link.inverse(e))
            .collect();
        Ok(self.log_likelihood(&mean, None))
    }

    fn evaluate(&self, parameters: &Matrix) -> Result<Evaluation, EstimationError> {
        self.check_parameters(parameters)?;
        let p = self.x.ncols();
        let marginals = self.marginals(parameters);
        let value = self.log_likelihood(&marginals.mean, None);

        let mut gradient = Matrix::zeros(p, 1);
        let mut hessian = Matrix::zeros(p, p);
        self.accumulate_derivatives(&marginals, None, &mut gradient, &mut hessian);

        Ok(Evaluation {
            value,
            gradient,
            hessian,
        })
    }

    /// Some linear predictor lies past the range where the link still varies,
    /// or some fitted mean sits on the boundary of the family.
    fn is_saturated(&self, parameters: &Matrix) -> bool {
        let link = self.family.link();
        self.linear_predictor(parameters).into_iter().any(|eta| {
            link.is_saturated(eta) || self.family.is_degenerate_mean(link.inverse(eta))
        })
    }
}

// ========== Shared helpers ==========

fn observation_weight(weights: Option<&[f64]>, i: usize) -> f64 {
    weights.map_or(1.0, |w| w[i])
}

/// Starting values: the intercept at g(ȳ), every other coefficient at 0.
pub(crate) fn default_start(structure: &DataStructure, family: &Family) -> Matrix {
    let mut start = Matrix::zeros(structure.n_covariates(), 1);
    if let Some(j) = structure
        .column_names()
        .iter()
        .position(|c| c == INTERCEPT_NAME)
    {
        let y = structure.y().to_vec();
        start.put(j, 0, family.link().link(family.starting_mean(&y)));
    }
    start
}

/// Check every response against the support of the family.
pub(crate) fn validate_responses(y: &Matrix, family: &Family) -> Result<(), ConfigurationError> {
    for row in 0..y.nrows() {
        family
            .validate_response(y.at(row, 0))
            .map_err(|reason| ConfigurationError::InvalidResponse { row, reason })?;
    }
    Ok(())
}

/// Covariance as the negative inverse Hessian.
pub(crate) fn covariance_from_hessian(hessian: &Matrix) -> Result<Matrix, EstimationError> {
    hessian.scalar_multiply(-1.0).invert().map_err(|e| match e {
        MatrixError::Singular => {
            EstimationError::Numerical("Hessian is singular at the optimum".to_string())
        }
        other => other.into(),
    })
}

/// Covariance at the end of a run. A singular Hessian is an error only when
/// the run converged; otherwise the covariance is left out.
pub(crate) fn fitted_covariance(
    optimum: &OptimizationResult,
) -> Result<Option<Matrix>, EstimationError> {
    if optimum.is_converged() {
        covariance_from_hessian(&optimum.hessian).map(Some)
    } else {
        Ok(covariance_from_hessian(&optimum.hessian).ok())
    }
}

pub(crate) fn model_status(status: OptimizationStatus) -> ModelStatus {
    match status {
        OptimizationStatus::Converged => ModelStatus::Converged,
        OptimizationStatus::MaxIterationsReached
        | OptimizationStatus::LineSearchFailed
        | OptimizationStatus::Unbounded => ModelStatus::FailedToConverge,
    }
}

// ========== Model ==========

/// A generalized linear model ready to be estimated.
#[derive(Debug, Clone)]
pub struct GeneralizedLinearModel {
    structure: DataStructure,
    family: Family,
    start: Matrix,
    options: OptimizerOptions,
    bounds: Option<Bounds>,
}

impl GeneralizedLinearModel {
    /// Start configuring a model over `table` with the given formula.
    pub fn builder<'a>(table: &'a dyn Table, formula: &str) -> GeneralizedLinearModelBuilder<'a> {
        GeneralizedLinearModelBuilder::new(table, formula)
    }

    pub fn structure(&self) -> &DataStructure {
        &self.structure
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn starting_values(&self) -> &Matrix {
        &self.start
    }
}

impl Model for GeneralizedLinearModel {
    type Fitted = FittedGlm;

    fn estimate(self) -> Result<FittedGlm, EstimationError> {
        let objective = GlmObjective::new(self.structure.x(), self.structure.y(), self.family);
        let mut optimizer = NewtonOptimizer::new(self.options.clone())?;
        if let Some(bounds) = self.bounds.clone() {
            optimizer = optimizer.with_bounds(bounds);
        }

        let optimum = optimizer.maximize(&objective, &self.start)?;
        let covariance = fitted_covariance(&optimum)?;

        let eta = objective.linear_predictor(&optimum.parameters);
        let link = self.family.link();
        let fitted = Matrix::from_fn(eta.len(), 1, |i, _| link.inverse(eta[i]));
        let residuals = self.structure.y().subtract(&fitted)?;

        let mut result = EstimationResult::new(
            self.structure.column_names().to_vec(),
            optimum.parameters,
            fitted,
            residuals,
            optimum.value,
            optimum.iterations,
            model_status(optimum.status),
        );
        result.covariance = covariance;
        if self.options.compute_inference {
            CoefficientInference::apply(
                &mut result,
                ReferenceDistribution::Normal,
                self.options.confidence_level,
            );
        }

        Ok(FittedGlm {
            structure: self.structure,
            family: self.family,
            result,
            linear_predictor: Matrix::column(&eta),
            optimization_status: optimum.status,
        })
    }
}

// ========== Builder ==========

/// Builder for [`GeneralizedLinearModel`]. Every configuration error is
/// raised by [`build`](Self::build), never by `estimate`.
pub struct GeneralizedLinearModelBuilder<'a> {
    table: &'a dyn Table,
    formula: String,
    kind: FamilyKind,
    link: Option<Link>,
    extra_parameter: Option<f64>,
    starting_values: Option<Vec<f64>>,
    options: OptimizerOptions,
    bounds: Option<Bounds>,
}

impl<'a> GeneralizedLinearModelBuilder<'a> {
    /// Create a builder for a Bernoulli model with its default link.
    pub fn new(table: &'a dyn Table, formula: &str) -> Self {
        Self {
            table,
            formula: formula.to_string(),
            kind: FamilyKind::Bernoulli,
            link: None,
            extra_parameter: None,
            starting_values: None,
            options: OptimizerOptions::default(),
            bounds: None,
        }
    }

    /// Set the distributional family.
    pub fn family(mut self, kind: FamilyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the link function (default: the family's default link).
    pub fn link(mut self, link: Link) -> Self {
        self.link = Some(link);
        self
    }

    /// Set the family's extra parameter (θ, shape or variance).
    pub fn extra_parameter(mut self, value: f64) -> Self {
        self.extra_parameter = Some(value);
        self
    }

    /// Set the starting values of β, one per design column.
    pub fn starting_values(mut self, values: &[f64]) -> Self {
        self.starting_values = Some(values.to_vec());
        self
    }

    pub fn options(mut self, options: OptimizerOptions) -> Self {
        self.options = options;
        self
    }

    /// Constrain the coefficients to a box.
    pub fn bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Validate the configuration and assemble the model.
    pub fn build(self) -> Result<GeneralizedLinearModel, EstimationError> {
        self.options.validate()?;
        let structure = DataStructure::new(self.table, &self.formula)?;
        let family = Family::create(
            self.kind,
            self.link.unwrap_or_else(|| self.kind.default_link()),
            self.extra_parameter,
        )?;
        validate_responses(structure.y(), &family)?;

        let p = structure.n_covariates();
        let start = match &self.starting_values {
            Some(values) if values.len() != p => {
                return Err(ConfigurationError::StartingValuesLength {
                    expected: p,
                    got: values.len(),
                }
                .into());
            }
            Some(values) => Matrix::column(values),
            None => default_start(&structure, &family),
        };

        if let Some(bounds) = &self.bounds {
            if bounds.len() != p {
                return Err(ConfigurationError::InvalidParameter {
                    name: "bounds",
                    reason: format!("{} bounds for {} coefficients", bounds.len(), p),
                }
                .into());
            }
        }
        let start = match &self.bounds {
            Some(bounds) if self.starting_values.is_none() => bounds.clip(&start),
            _ => start,
        };
        if let Some(bounds) = &self.bounds {
            bounds.check(&start)?;
        }

        Ok(GeneralizedLinearModel {
            structure,
            family,
            start,
            options: self.options,
            bounds: self.bounds,
        })
    }
}

// ========== Fitted model ==========

/// A fitted generalized linear model.
#[derive(Debug, Clone)]
pub struct FittedGlm {
    structure: DataStructure,
    family: Family,
    result: EstimationResult,
    linear_predictor: Matrix,
    optimization_status: OptimizationStatus,
}

impl FittedGlm {
    pub fn structure(&self) -> &DataStructure {
        &self.structure
    }

    pub fn family(&self) -> Family {
        self.family
    }

    /// η = Xβ̂ at the fitted design.
    pub fn linear_predictor(&self) -> &Matrix {
        &self.linear_predictor
    }

    /// Detailed reason the optimizer stopped.
    pub fn optimization_status(&self) -> OptimizationStatus {
        self.optimization_status
    }

    /// Model deviance Σ d(y_i, μ̂_i).
    pub fn deviance(&self) -> f64 {
        self.family.deviance(
            &self.structure.y().to_vec(),
            &self.result.fitted_values.to_vec(),
        )
    }

    /// Linear predictor for new design rows.
    pub fn predict_linear(&self, x: &Matrix) -> Result<Matrix, MatrixError> {
        check_design(x, self.result.n_parameters)?;
        x.multiply(&self.result.parameters)
    }

    pub fn summary(&self) -> CoefficientTable {
        CoefficientTable::from_result(&self.result)
    }
}

impl FittedModel for FittedGlm {
    fn result(&self) -> &EstimationResult {
        &self.result
    }

    /// Predicted means h(Xβ̂) for new design rows.
    fn predict(&self, x: &Matrix) -> Result<Matrix, MatrixError> {
        let eta = self.predict_linear(x)?;
        let link = self.family.link();
        Ok(Matrix::from_fn(eta.nrows(), 1, |i, _| link.inverse(eta.at(i, 0))))
    }
}
