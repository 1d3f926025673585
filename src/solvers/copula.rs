//! Copula-augmented GLM for clustered binary responses.
//!
//! Within each cluster every pair of observations (i, j) contributes a
//! Farlie-Gumbel-Morgenstern correction to the product of its Bernoulli
//! margins:
//!
//! ```text
//! P(y_i, y_j) = m(y_i) · m(y_j) · (1 + θ_ij · e_i · e_j),   e = y - p
//! ```
//!
//! The objective over [β; γ] is the pairwise composite log-likelihood, the
//! sum of ln P(y_i, y_j) over every pair plus ℓ_i for observations that sit
//! alone in their cluster:
//!
//! ```text
//! Σ_i w_i ℓ_i(β) + Σ_pairs ln(1 + θ_ij · e_i · e_j),   w_i = max(k_i - 1, 1)
//! ```
//!
//! where k_i is the size of the cluster of observation i. Every term is the
//! log of a probability, so the objective never exceeds 0.
//!
//! The dependence θ_ij is either a constant γ₀ or g⁻¹(γ₀ + γ₁ d_ij), where
//! d_ij is the Euclidean distance between the two observations over the
//! coordinate fields of the specification. P(y_i, y_j) is a distribution
//! only when the correction is non-negative for all four outcomes, i.e.
//!
//! ```text
//! -1 / max(p_i p_j, q_i q_j) <= θ_ij <= 1 / max(p_i q_j, q_i p_j),   q = 1 - p
//! ```
//!
//! A pair outside that range, or whose observed correction is not positive,
//! makes the objective -inf, which the line search rejects.
//!
//! The likelihood surface can be far from concave in γ, so a grid search
//! over the first dependence parameter is the recommended way to start.

use super::glm::{
    default_start, fitted_covariance, model_status, validate_responses, GlmObjective,
};
use super::newton::{grid_search, Bounds, GridSearch, NewtonOptimizer, OptimizationStatus};
use super::traits::{
    check_design, DifferentiableObjective, EstimationError, Evaluation, FittedModel, Model,
};
use crate::core::{
    ConfigurationError, EstimationResult, Family, FamilyKind, Link, OptimizerOptions,
};
use crate::data::{HierarchicalStructure, Table};
use crate::inference::{CoefficientInference, CoefficientTable, ReferenceDistribution};
use crate::utils::{Matrix, MatrixError};
use log::debug;

// ========== Specification ==========

/// How the dependence parameter is driven.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependence {
    /// θ = γ₀ for every pair.
    Constant,
    /// θ_ij = g⁻¹(γ₀ + γ₁ · d_ij) over the named coordinate fields.
    Distance { coordinates: String },
}

/// Form, link, starting values and bounds of the dependence parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CopulaSpecification {
    dependence: Dependence,
    link: Link,
    initial: Vec<f64>,
    bounds: Bounds,
}

impl CopulaSpecification {
    /// Constant dependence θ, bounded to [-1, 1].
    pub fn constant(initial: f64) -> Self {
        Self {
            dependence: Dependence::Constant,
            link: Link::Identity,
            initial: vec![initial],
            bounds: Bounds::unbounded(1).with(0, -1.0, 1.0),
        }
    }

    /// Dependence decaying with the distance over `coordinates` (e.g. `"x + y"`).
    ///
    /// With the log link both parameters are bounded above by 0, which keeps
    /// θ in (0, 1] and non-increasing with distance. With the identity link
    /// the intercept is bounded to [-1, 1] and the slope above by 0.
    pub fn distance(link: Link, coordinates: &str, intercept: f64, slope: f64) -> Self {
        let bounds = match link {
            Link::Log => Bounds::unbounded(2)
                .with(0, f64::NEG_INFINITY, 0.0)
                .with(1, f64::NEG_INFINITY, 0.0),
            Link::Identity => Bounds::unbounded(2)
                .with(0, -1.0, 1.0)
                .with(1, f64::NEG_INFINITY, 0.0),
            _ => Bounds::unbounded(2),
        };
        Self {
            dependence: Dependence::Distance {
                coordinates: coordinates.to_string(),
            },
            link,
            initial: vec![intercept, slope],
            bounds,
        }
    }

    /// Replace the bounds of dependence parameter `index`.
    pub fn with_bounds(
        mut self,
        index: usize,
        lower: f64,
        upper: f64,
    ) -> Result<Self, ConfigurationError> {
        self.bounds.set(index, lower, upper)?;
        Ok(self)
    }

    pub fn dependence(&self) -> &Dependence {
        &self.dependence
    }

    pub fn link(&self) -> Link {
        self.link
    }

    pub fn initial(&self) -> &[f64] {
        &self.initial
    }

    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Number of dependence parameters (1 or 2).
    pub fn n_parameters(&self) -> usize {
        self.initial.len()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        match self.dependence {
            Dependence::Constant => vec!["dependence".to_string()],
            Dependence::Distance { .. } => vec![
                "dependence (Intercept)".to_string(),
                "dependence distance".to_string(),
            ],
        }
    }

    /// θ for parameters `gamma` at distance `distance`.
    pub fn dependence_at(&self, gamma: &[f64], distance: f64) -> f64 {
        let z = pair_covariates(distance);
        let zeta: f64 = gamma.iter().zip(z.iter()).map(|(g, z)| g * z).sum();
        self.link.inverse(zeta)
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.link == Link::Inverse {
            return Err(ConfigurationError::InvalidParameter {
                name: "dependence_link",
                reason: "the inverse link is not supported for the dependence".to_string(),
            });
        }
        if self.initial.iter().any(|v| !v.is_finite()) {
            return Err(ConfigurationError::InvalidParameter {
                name: "dependence_initial",
                reason: format!("starting values must be finite, got {:?}", self.initial),
            });
        }
        self.bounds.check(&Matrix::column(&self.initial))
    }
}

/// Covariate vector z of a pair at distance `distance`.
fn pair_covariates(distance: f64) -> [f64; 2] {
    [1.0, distance]
}

/// True when `1 + θ (a - p_i)(b - p_j) >= 0` for all four outcomes (a, b).
pub fn is_admissible_dependence(theta: f64, p_i: f64, p_j: f64) -> bool {
    [(0.0, 0.0), (0.0, 1.0), (1.0, 0.0), (1.0, 1.0)]
        .iter()
        .all(|&(a, b)| 1.0 + theta * (a - p_i) * (b - p_j) >= 0.0)
}

// ========== Objective ==========

#[derive(Debug, Clone, Copy)]
struct Pair {
    i: usize,
    j: usize,
    distance: f64,
}

/// Pairwise composite log-likelihood of the copula model.
pub struct CopulaObjective<'a> {
    marginal: GlmObjective<'a>,
    specification: &'a CopulaSpecification,
    pairs: Vec<Pair>,
    /// Number of pairs each observation enters, at least 1.
    weights: Vec<f64>,
}

impl<'a> CopulaObjective<'a> {
    /// Pairs are taken within each cluster of `structure`.
    pub fn new(
        structure: &'a HierarchicalStructure,
        family: Family,
        specification: &'a CopulaSpecification,
    ) -> Self {
        let data = structure.structure();
        let pairs: Vec<Pair> = match (&specification.dependence, structure.distances()) {
            (Dependence::Distance { .. }, Some(recorders)) => recorders
                .iter()
                .flat_map(|r| r.pairs())
                .map(|(i, j, distance)| Pair { i, j, distance })
                .collect(),
            _ => structure
                .clusters()
                .iter()
                .flat_map(|c| {
                    let members = &c.members;
                    (0..members.len()).flat_map(move |a| {
                        ((a + 1)..members.len()).map(move |b| Pair {
                            i: members[a],
                            j: members[b],
                            distance: 0.0,
                        })
                    })
                })
                .collect(),
        };

        let mut counts = vec![0usize; data.n_observations()];
        for pair in &pairs {
            counts[pair.i] += 1;
            counts[pair.j] += 1;
        }
        let weights = counts.into_iter().map(|c| c.max(1) as f64).collect();

        Self {
            marginal: GlmObjective::new(data.x(), data.y(), family),
            specification,
            pairs,
            weights,
        }
    }

    pub fn n_pairs(&self) -> usize {
        self.pairs.len()
    }

    fn n_coefficients(&self) -> usize {
        self.marginal.x().ncols()
    }

    fn gamma(&self, parameters: &Matrix) -> Vec<f64> {
        let p = self.n_coefficients();
        (0..self.specification.n_parameters())
            .map(|m| parameters.at(p + m, 0))
            .collect()
    }

    fn residual(&self, mean: &[f64], i: usize) -> f64 {
        self.marginal.y().at(i, 0) - mean[i]
    }
}

impl DifferentiableObjective for CopulaObjective<'_> {
    fn n_parameters(&self) -> usize {
        self.n_coefficients() + self.specification.n_parameters()
    }

    fn value(&self, parameters: &Matrix) -> Result<f64, EstimationError> {
        self.check_parameters(parameters)?;
        let link = self.marginal.family().link();
        let mean: Vec<f64> = self
            .marginal
            .linear_predictor(parameters)
            .into_iter()
            .map(|e| link.inverse(e))
            .collect();
        let mut value = self.marginal.log_likelihood(&mean, Some(self.weights.as_slice()));
        if !value.is_finite() {
            return Ok(value);
        }

        let gamma = self.gamma(parameters);
        for pair in &self.pairs {
            let theta = self.specification.dependence_at(&gamma, pair.distance);
            let u = 1.0 + theta * self.residual(&mean, pair.i) * self.residual(&mean, pair.j);
            if !(u > 0.0) || !is_admissible_dependence(theta, mean[pair.i], mean[pair.j]) {
                return Ok(f64::NEG_INFINITY);
            }
            value += u.ln();
        }
        Ok(value)
    }

    fn evaluate(&self, parameters: &Matrix) -> Result<Evaluation, EstimationError> {
        self.check_parameters(parameters)?;
        let p = self.n_coefficients();
        let q = self.specification.n_parameters();
        let x = self.marginal.x();
        let dependence_link = self.specification.link;

        let marginals = self.marginal.marginals(parameters);
        let weights = Some(self.weights.as_slice());
        let mut value = self.marginal.log_likelihood(&marginals.mean, weights);
        let mut gradient = Matrix::zeros(p + q, 1);
        let mut hessian = Matrix::zeros(p + q, p + q);
        self.marginal
            .accumulate_derivatives(&marginals, weights, &mut gradient, &mut hessian);

        let gamma = self.gamma(parameters);
        let mut dr = vec![0.0; p];
        for pair in &self.pairs {
            let (i, j) = (pair.i, pair.j);
            let e_i = self.residual(&marginals.mean, i);
            let e_j = self.residual(&marginals.mean, j);
            let (h1_i, h1_j) = (marginals.first[i], marginals.first[j]);
            let (h2_i, h2_j) = (marginals.second[i], marginals.second[j]);

            let z = pair_covariates(pair.distance);
            let zeta: f64 = (0..q).map(|m| gamma[m] * z[m]).sum();
            let theta = dependence_link.inverse(zeta);
            let g1 = dependence_link.inverse_derivative(zeta);
            let g2 = dependence_link.inverse_second_derivative(zeta);

            let r = e_i * e_j;
            let u = 1.0 + theta * r;
            let (p_i, p_j) = (marginals.mean[i], marginals.mean[j]);
            if !(u > 0.0) || !is_admissible_dependence(theta, p_i, p_j) {
                value = f64::NEG_INFINITY;
                break;
            }
            value += u.ln();

            // dr/dβ
            for k in 0..p {
                dr[k] = -(e_j * h1_i * x.at(i, k) + e_i * h1_j * x.at(j, k));
            }

            let a = theta / u;
            let a2 = a * a;
            for k in 0..p {
                gradient.accumulate(k, 0, a * dr[k]);
                for l in 0..=k {
                    let d2r = -e_j * h2_i * x.at(i, k) * x.at(i, l)
                        - e_i * h2_j * x.at(j, k) * x.at(j, l)
                        + h1_i * h1_j * (x.at(i, k) * x.at(j, l) + x.at(j, k) * x.at(i, l));
                    hessian.accumulate(k, l, a * d2r - a2 * dr[k] * dr[l]);
                }
            }

            let gamma_weight = r * g2 / u - (r * g1 / u).powi(2);
            for m in 0..q {
                gradient.accumulate(p + m, 0, r * g1 * z[m] / u);
                for n in 0..=m {
                    hessian.accumulate(p + m, p + n, gamma_weight * z[m] * z[n]);
                }
                for k in 0..p {
                    hessian.accumulate(p + m, k, dr[k] * g1 * z[m] / (u * u));
                }
            }
        }

        // The blocks above fill the lower triangle only.
        for row in 0..(p + q) {
            for col in 0..row {
                hessian.put(col, row, hessian.at(row, col));
            }
        }

        Ok(Evaluation {
            value,
            gradient,
            hessian,
        })
    }

    fn is_saturated(&self, parameters: &Matrix) -> bool {
        self.marginal.is_saturated(parameters)
    }
}

// ========== Model ==========

/// A Bernoulli GLM whose clustered observations are coupled by a copula.
#[derive(Debug, Clone)]
pub struct CopulaModel {
    structure: HierarchicalStructure,
    family: Family,
    specification: CopulaSpecification,
    coefficients: Option<Matrix>,
    options: OptimizerOptions,
    grid: Option<GridSearch>,
}

impl CopulaModel {
    /// Start configuring a copula model.
    ///
    /// `cluster_field` groups the observations; pairs are only formed within
    /// a cluster.
    pub fn builder<'a>(
        table: &'a dyn Table,
        formula: &str,
        cluster_field: &str,
        specification: CopulaSpecification,
    ) -> CopulaModelBuilder<'a> {
        CopulaModelBuilder {
            table,
            formula: formula.to_string(),
            cluster_field: cluster_field.to_string(),
            specification,
            link: Link::Logit,
            starting_values: None,
            options: OptimizerOptions::default(),
            grid: None,
        }
    }

    pub fn structure(&self) -> &HierarchicalStructure {
        &self.structure
    }

    pub fn specification(&self) -> &CopulaSpecification {
        &self.specification
    }

    /// Starting coefficients from the independent (marginal) fit.
    fn marginal_start(&self) -> Result<Matrix, EstimationError> {
        let data = self.structure.structure();
        let objective = GlmObjective::new(data.x(), data.y(), self.family);
        let optimizer = NewtonOptimizer::new(self.options.clone())?;
        let optimum = optimizer.maximize(&objective, &default_start(data, &self.family))?;
        debug!(
            "marginal fit: log-likelihood {:.6} after {} iterations",
            optimum.value, optimum.iterations
        );
        Ok(optimum.parameters)
    }
}

impl Model for CopulaModel {
    type Fitted = FittedCopulaModel;

    fn estimate(self) -> Result<FittedCopulaModel, EstimationError> {
        let coefficients = match &self.coefficients {
            Some(c) => c.clone(),
            None => self.marginal_start()?,
        };
        let p = coefficients.nrows();
        let q = self.specification.n_parameters();

        let objective = CopulaObjective::new(&self.structure, self.family, &self.specification);
        debug!(
            "copula objective over {} pairs in {} clusters",
            objective.n_pairs(),
            self.structure.clusters().len()
        );

        let mut start = Matrix::from_fn(p + q, 1, |i, _| {
            if i < p {
                coefficients.at(i, 0)
            } else {
                self.specification.initial[i - p]
            }
        });
        if let Some(grid) = &self.grid {
            let grid = GridSearch::new(p + grid.index, grid.lower, grid.upper, grid.steps);
            start = grid_search(&objective, &start, &grid)?;
        }

        let mut bounds = Bounds::unbounded(p + q);
        for m in 0..q {
            bounds.set(
                p + m,
                self.specification.bounds.lower()[m],
                self.specification.bounds.upper()[m],
            )?;
        }
        let optimizer = NewtonOptimizer::new(self.options.clone())?.with_bounds(bounds);
        let optimum = optimizer.maximize(&objective, &start)?;
        let covariance = fitted_covariance(&optimum)?;

        let marginals = objective.marginal.marginals(&optimum.parameters);
        let marginal_log_likelihood = objective.marginal.log_likelihood(&marginals.mean, None);
        let fitted = Matrix::column(&marginals.mean);
        let residuals = self.structure.structure().y().subtract(&fitted)?;

        let mut names = self.structure.structure().column_names().to_vec();
        names.extend(self.specification.parameter_names());

        let mut result = EstimationResult::new(
            names,
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

        Ok(FittedCopulaModel {
            structure: self.structure,
            family: self.family,
            specification: self.specification,
            result,
            n_coefficients: p,
            marginal_log_likelihood,
            optimization_status: optimum.status,
        })
    }
}

// ========== Builder ==========

/// Builder for [`CopulaModel`]. Configuration errors surface in [`build`](Self::build).
pub struct CopulaModelBuilder<'a> {
    table: &'a dyn Table,
    formula: String,
    cluster_field: String,
    specification: CopulaSpecification,
    link: Link,
    starting_values: Option<Vec<f64>>,
    options: OptimizerOptions,
    grid: Option<GridSearch>,
}

impl CopulaModelBuilder<'_> {
    /// Link of the Bernoulli margins (default: logit).
    pub fn link(mut self, link: Link) -> Self {
        self.link = link;
        self
    }

    /// Starting coefficients β; by default they come from the independent fit.
    pub fn starting_values(mut self, values: &[f64]) -> Self {
        self.starting_values = Some(values.to_vec());
        self
    }

    pub fn options(mut self, options: OptimizerOptions) -> Self {
        self.options = options;
        self
    }

    /// Search `steps` evenly spaced values of the first dependence parameter
    /// in `[lower, upper]` before the Newton iterations.
    pub fn grid_search(mut self, lower: f64, upper: f64, steps: usize) -> Self {
        self.grid = Some(GridSearch::new(0, lower, upper, steps));
        self
    }

    pub fn build(self) -> Result<CopulaModel, EstimationError> {
        self.options.validate()?;
        self.specification.validate()?;

        let mut structure =
            HierarchicalStructure::new(self.table, &self.formula, &self.cluster_field)?;
        if let Dependence::Distance { coordinates } = &self.specification.dependence {
            structure = structure.with_distances(self.table, coordinates)?;
        }

        let family = Family::create(FamilyKind::Bernoulli, self.link, None)?;
        validate_responses(structure.structure().y(), &family)?;

        let p = structure.structure().n_covariates();
        let coefficients = match &self.starting_values {
            Some(values) if values.len() != p => {
                return Err(ConfigurationError::StartingValuesLength {
                    expected: p,
                    got: values.len(),
                }
                .into());
            }
            Some(values) => Some(Matrix::column(values)),
            None => None,
        };

        if let Some(grid) = &self.grid {
            grid.validate()?;
            let bounds = &self.specification.bounds;
            if grid.lower < bounds.lower()[0] || grid.upper > bounds.upper()[0] {
                return Err(ConfigurationError::InvalidBounds {
                    index: 0,
                    lower: grid.lower,
                    upper: grid.upper,
                }
                .into());
            }
        }

        Ok(CopulaModel {
            structure,
            family,
            specification: self.specification,
            coefficients,
            options: self.options,
            grid: self.grid,
        })
    }
}

// ========== Fitted model ==========

/// A fitted copula model. Parameters are [β; γ].
#[derive(Debug, Clone)]
pub struct FittedCopulaModel {
    structure: HierarchicalStructure,
    family: Family,
    specification: CopulaSpecification,
    result: EstimationResult,
    n_coefficients: usize,
    marginal_log_likelihood: f64,
    optimization_status: OptimizationStatus,
}

impl FittedCopulaModel {
    pub fn structure(&self) -> &HierarchicalStructure {
        &self.structure
    }

    pub fn specification(&self) -> &CopulaSpecification {
        &self.specification
    }

    /// Coefficients β of the marginal model.
    pub fn coefficients(&self) -> Vec<f64> {
        (0..self.n_coefficients)
            .map(|j| self.result.parameters.at(j, 0))
            .collect()
    }

    /// Dependence parameters γ.
    pub fn dependence_parameters(&self) -> Vec<f64> {
        (self.n_coefficients..self.result.n_parameters)
            .map(|j| self.result.parameters.at(j, 0))
            .collect()
    }

    /// Fitted θ between two observations `distance` apart.
    pub fn dependence_at(&self, distance: f64) -> f64 {
        self.specification
            .dependence_at(&self.dependence_parameters(), distance)
    }

    /// Σ ℓ_i at the fitted β, without the pairwise corrections.
    pub fn marginal_log_likelihood(&self) -> f64 {
        self.marginal_log_likelihood
    }

    pub fn optimization_status(&self) -> OptimizationStatus {
        self.optimization_status
    }

    pub fn summary(&self) -> CoefficientTable {
        CoefficientTable::from_result(&self.result)
    }
}

impl FittedModel for FittedCopulaModel {
    fn result(&self) -> &EstimationResult {
        &self.result
    }

    /// Marginal probabilities for new design rows (one column per β).
    fn predict(&self, x: &Matrix) -> Result<Matrix, MatrixError> {
        check_design(x, self.n_coefficients)?;
        let link = self.family.link();
        let beta = Matrix::column(&self.coefficients());
        let eta = x.multiply(&beta)?;
        Ok(Matrix::from_fn(eta.nrows(), 1, |i, _| link.inverse(eta.at(i, 0))))
    }
}
