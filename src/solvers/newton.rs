//! Newton-Raphson maximizer with bounds, step halving and grid search.
//!
//! Each iteration is a pure function from one [`IterationState`] to the
//! next:
//!
//! 1. Parameters sitting on a bound with the gradient pointing outward are
//!    held fixed; the remaining ones are free.
//! 2. The Newton direction `d = (-H)⁻¹ g` is solved over the free
//!    parameters. When `-H` is not positive definite a ridge `λI` is added,
//!    with λ growing tenfold until the Cholesky factorization succeeds.
//! 3. The step is halved until the objective is finite and does not
//!    decrease. Proposed parameters are clipped into their bounds.
//!
//! The loop stops when the convergence criterion holds, when the iteration
//! cap is reached or when no step length improves the objective. A run that
//! meets the criterion only because the objective saturated is reported as
//! `Unbounded`. Every outcome is an [`OptimizationStatus`], not an error.

use super::traits::{DifferentiableObjective, EstimationError, Evaluation};
use crate::core::{ConfigurationError, ConvergenceCriterion, OptimizerOptions, OptionsError};
use crate::utils::Matrix;
use log::{debug, warn};

/// Decreases of the objective below this relative size are rounding noise.
const ROUNDING_TOLERANCE: f64 = 1e-12;

/// Number of ridge increments tried before giving up on a direction.
const MAX_RIDGE_ATTEMPTS: usize = 40;

// ========== Bounds ==========

/// Per-parameter box constraints `lower <= x <= upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// No constraint on any of the `n` parameters.
    pub fn unbounded(n: usize) -> Self {
        Self {
            lower: vec![f64::NEG_INFINITY; n],
            upper: vec![f64::INFINITY; n],
        }
    }

    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Result<Self, ConfigurationError> {
        if lower.len() != upper.len() {
            return Err(ConfigurationError::InvalidParameter {
                name: "bounds",
                reason: format!(
                    "{} lower bounds but {} upper bounds",
                    lower.len(),
                    upper.len()
                ),
            });
        }
        let mut bounds = Self::unbounded(lower.len());
        for (index, (&lo, &hi)) in lower.iter().zip(&upper).enumerate() {
            bounds.set(index, lo, hi)?;
        }
        Ok(bounds)
    }

    /// Constrain parameter `index` to `[lower, upper]`.
    pub fn set(&mut self, index: usize, lower: f64, upper: f64) -> Result<(), ConfigurationError> {
        if index >= self.lower.len() {
            return Err(ConfigurationError::InvalidParameter {
                name: "bounds",
                reason: format!(
                    "parameter index {} out of range for {} parameters",
                    index,
                    self.lower.len()
                ),
            });
        }
        if lower.is_nan() || upper.is_nan() || lower > upper {
            return Err(ConfigurationError::InvalidBounds {
                index,
                lower,
                upper,
            });
        }
        self.lower[index] = lower;
        self.upper[index] = upper;
        Ok(())
    }

    /// Builder form of [`set`](Self::set) for bounds known to be valid.
    pub(crate) fn with(mut self, index: usize, lower: f64, upper: f64) -> Self {
        debug_assert!(index < self.len() && lower <= upper);
        self.lower[index] = lower;
        self.upper[index] = upper;
        self
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    /// Fail when `parameters` has the wrong length or lies outside the box.
    pub fn check(&self, parameters: &Matrix) -> Result<(), ConfigurationError> {
        if parameters.nrows() != self.len() {
            return Err(ConfigurationError::StartingValuesLength {
                expected: self.len(),
                got: parameters.nrows(),
            });
        }
        for index in 0..self.len() {
            let value = parameters.at(index, 0);
            if !(value >= self.lower[index] && value <= self.upper[index]) {
                return Err(ConfigurationError::StartOutsideBounds {
                    index,
                    value,
                    lower: self.lower[index],
                    upper: self.upper[index],
                });
            }
        }
        Ok(())
    }

    /// Project `parameters` onto the box.
    pub fn clip(&self, parameters: &Matrix) -> Matrix {
        Matrix::from_fn(parameters.nrows(), 1, |i, _| {
            parameters.at(i, 0).clamp(self.lower[i], self.upper[i])
        })
    }

    /// True when parameter `index` sits on a bound and the gradient points outward.
    fn is_active(&self, index: usize, value: f64, gradient: f64) -> bool {
        (value <= self.lower[index] && gradient < 0.0)
            || (value >= self.upper[index] && gradient > 0.0)
    }
}

// ========== Iteration State ==========

/// How an optimization run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizationStatus {
    Converged,
    MaxIterationsReached,
    /// No step length along the Newton direction improved the objective.
    LineSearchFailed,
    /// The objective stopped changing only because it saturated (for
    /// example fitted probabilities of exactly 0 or 1 under separation).
    /// The maximum is not attained at finite parameters.
    Unbounded,
}

/// Snapshot of the optimizer between two iterations.
#[derive(Debug, Clone)]
pub struct IterationState {
    pub parameters: Matrix,
    pub value: f64,
    pub gradient: Matrix,
    pub hessian: Matrix,
    pub iteration: usize,
    /// `None` while the optimizer should keep iterating.
    pub status: Option<OptimizationStatus>,
}

impl IterationState {
    pub fn is_finished(&self) -> bool {
        self.status.is_some()
    }
}

/// Final state of an optimization run.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub parameters: Matrix,
    pub value: f64,
    pub gradient: Matrix,
    pub hessian: Matrix,
    pub iterations: usize,
    pub status: OptimizationStatus,
}

impl OptimizationResult {
    pub fn is_converged(&self) -> bool {
        self.status == OptimizationStatus::Converged
    }
}

impl From<IterationState> for OptimizationResult {
    fn from(state: IterationState) -> Self {
        Self {
            parameters: state.parameters,
            value: state.value,
            gradient: state.gradient,
            hessian: state.hessian,
            iterations: state.iteration,
            status: state
                .status
                .unwrap_or(OptimizationStatus::MaxIterationsReached),
        }
    }
}

// ========== Optimizer ==========

/// Newton-Raphson maximizer of a [`DifferentiableObjective`].
#[derive(Debug, Clone)]
pub struct NewtonOptimizer {
    options: OptimizerOptions,
    bounds: Option<Bounds>,
}

impl NewtonOptimizer {
    pub fn new(options: OptimizerOptions) -> Result<Self, OptionsError> {
        options.validate()?;
        Ok(Self {
            options,
            bounds: None,
        })
    }

    /// Constrain the parameters to a box.
    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }

    pub fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// Evaluate the objective at `start` and check it against the bounds.
    pub fn initial_state<O>(
        &self,
        objective: &O,
        start: &Matrix,
    ) -> Result<IterationState, EstimationError>
    where
        O: DifferentiableObjective + ?Sized,
    {
        objective.check_parameters(start)?;
        if let Some(bounds) = &self.bounds {
            if bounds.len() != objective.n_parameters() {
                return Err(ConfigurationError::InvalidParameter {
                    name: "bounds",
                    reason: format!(
                        "{} bounds for {} parameters",
                        bounds.len(),
                        objective.n_parameters()
                    ),
                }
                .into());
            }
            bounds.check(start)?;
        }

        let evaluation = objective.evaluate(start)?;
        if !evaluation.value.is_finite() {
            return Err(EstimationError::Numerical(format!(
                "objective is not finite at the starting values ({})",
                evaluation.value
            )));
        }
        check_derivatives(&evaluation)?;

        Ok(IterationState {
            parameters: start.clone(),
            value: evaluation.value,
            gradient: evaluation.gradient,
            hessian: evaluation.hessian,
            iteration: 0,
            status: None,
        })
    }

    /// Perform one Newton iteration.
    pub fn step<O>(
        &self,
        objective: &O,
        state: IterationState,
    ) -> Result<IterationState, EstimationError>
    where
        O: DifferentiableObjective + ?Sized,
    {
        if state.is_finished() {
            return Ok(state);
        }
        if state.iteration >= self.options.max_iterations {
            return Ok(IterationState {
                status: Some(OptimizationStatus::MaxIterationsReached),
                ..state
            });
        }

        let free = self.free_parameters(&state);
        if free.is_empty()
            || (self.options.criterion == ConvergenceCriterion::GradientNorm
                && self.projected_gradient_norm(&state) <= self.options.tolerance)
        {
            return Ok(IterationState {
                status: Some(self.stopping_status(objective, &state)),
                ..state
            });
        }

        let direction = newton_direction(&state.hessian, &state.gradient, &free)?;
        let slack = self.options.tolerance.min(ROUNDING_TOLERANCE) * (1.0 + state.value.abs());

        let mut step_length = 1.0;
        for _ in 0..=self.options.max_step_halvings {
            let candidate = self.project(&Matrix::from_fn(state.parameters.nrows(), 1, |i, _| {
                state.parameters.at(i, 0) + step_length * direction.at(i, 0)
            }));
            let value = objective.value(&candidate)?;

            if value.is_finite() && value >= state.value - slack {
                let evaluation = objective.evaluate(&candidate)?;
                check_derivatives(&evaluation)?;
                let iteration = state.iteration + 1;
                debug!(
                    "iteration {}: objective {:.10} (change {:.3e}, step length {})",
                    iteration,
                    evaluation.value,
                    evaluation.value - state.value,
                    step_length
                );

                let mut next = IterationState {
                    parameters: candidate,
                    value: evaluation.value,
                    gradient: evaluation.gradient,
                    hessian: evaluation.hessian,
                    iteration,
                    status: None,
                };
                if self.has_converged(&state, &next) {
                    next.status = Some(self.stopping_status(objective, &next));
                } else if iteration >= self.options.max_iterations {
                    next.status = Some(OptimizationStatus::MaxIterationsReached);
                }
                return Ok(next);
            }
            step_length *= 0.5;
        }

        debug!(
            "iteration {}: no step length improves the objective",
            state.iteration + 1
        );
        Ok(IterationState {
            status: Some(OptimizationStatus::LineSearchFailed),
            ..state
        })
    }

    /// Maximize `objective` starting from `start`.
    pub fn maximize<O>(
        &self,
        objective: &O,
        start: &Matrix,
    ) -> Result<OptimizationResult, EstimationError>
    where
        O: DifferentiableObjective + ?Sized,
    {
        let mut state = self.initial_state(objective, start)?;
        while !state.is_finished() {
            state = self.step(objective, state)?;
        }

        let result = OptimizationResult::from(state);
        if !result.is_converged() {
            warn!(
                "optimizer stopped without converging after {} iterations ({:?})",
                result.iterations, result.status
            );
        }
        Ok(result)
    }

    fn project(&self, parameters: &Matrix) -> Matrix {
        match &self.bounds {
            Some(bounds) => bounds.clip(parameters),
            None => parameters.clone(),
        }
    }

    fn free_parameters(&self, state: &IterationState) -> Vec<usize> {
        (0..state.parameters.nrows())
            .filter(|&i| match &self.bounds {
                Some(bounds) => {
                    !bounds.is_active(i, state.parameters.at(i, 0), state.gradient.at(i, 0))
                }
                None => true,
            })
            .collect()
    }

    /// Largest absolute gradient component over the free parameters.
    fn projected_gradient_norm(&self, state: &IterationState) -> f64 {
        self.free_parameters(state)
            .into_iter()
            .fold(0.0_f64, |acc, i| acc.max(state.gradient.at(i, 0).abs()))
    }

    /// `Converged`, unless the objective has saturated at `state`.
    fn stopping_status<O>(&self, objective: &O, state: &IterationState) -> OptimizationStatus
    where
        O: DifferentiableObjective + ?Sized,
    {
        if objective.is_saturated(&state.parameters) {
            OptimizationStatus::Unbounded
        } else {
            OptimizationStatus::Converged
        }
    }

    fn has_converged(&self, previous: &IterationState, next: &IterationState) -> bool {
        match self.options.criterion {
            ConvergenceCriterion::ObjectiveChange => {
                (next.value - previous.value).abs()
                    <= self.options.tolerance * (1.0 + previous.value.abs())
            }
            ConvergenceCriterion::GradientNorm => {
                self.projected_gradient_norm(next) <= self.options.tolerance
            }
        }
    }
}

fn check_derivatives(evaluation: &Evaluation) -> Result<(), EstimationError> {
    if !evaluation.gradient.is_finite() || !evaluation.hessian.is_finite() {
        return Err(EstimationError::Numerical(
            "gradient or Hessian is not finite".to_string(),
        ));
    }
    Ok(())
}

/// Ascent direction over the `free` parameters, zero elsewhere.
fn newton_direction(
    hessian: &Matrix,
    gradient: &Matrix,
    free: &[usize],
) -> Result<Matrix, EstimationError> {
    let information = hessian.sub_matrix(free, free)?.scalar_multiply(-1.0);
    let g = gradient.sub_matrix(free, &[0])?;
    let k = free.len();
    let scale = information.max_abs().max(1.0);

    let mut ridge = 0.0;
    for _ in 0..MAX_RIDGE_ATTEMPTS {
        let shifted = information.add(&Matrix::identity(k).scalar_multiply(ridge))?;
        if let Ok(solution) = shifted.solve_positive_definite(&g) {
            if ridge > 0.0 {
                debug!("Hessian regularized with ridge {:.3e}", ridge);
            }
            let mut direction = Matrix::zeros(hessian.nrows(), 1);
            for (position, &index) in free.iter().enumerate() {
                direction.put(index, 0, solution.at(position, 0));
            }
            return Ok(direction);
        }
        ridge = if ridge == 0.0 { 1e-8 * scale } else { ridge * 10.0 };
    }

    Err(EstimationError::Numerical(
        "Hessian could not be regularized into a negative definite matrix".to_string(),
    ))
}

// ========== Grid Search ==========

/// One-dimensional grid over a single parameter, the others held fixed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSearch {
    /// Position of the parameter in the parameter vector.
    pub index: usize,
    pub lower: f64,
    pub upper: f64,
    /// Number of evenly spaced values, including both ends (at least 2).
    pub steps: usize,
}

impl GridSearch {
    pub fn new(index: usize, lower: f64, upper: f64, steps: usize) -> Self {
        Self {
            index,
            lower,
            upper,
            steps,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.lower.is_finite() && self.upper.is_finite()) || self.lower > self.upper {
            return Err(ConfigurationError::InvalidBounds {
                index: self.index,
                lower: self.lower,
                upper: self.upper,
            });
        }
        if self.steps < 2 {
            return Err(ConfigurationError::InvalidParameter {
                name: "steps",
                reason: format!("a grid needs at least 2 points, got {}", self.steps),
            });
        }
        Ok(())
    }

    /// The grid values in increasing order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        let width = (self.upper - self.lower) / (self.steps - 1) as f64;
        (0..self.steps).map(move |k| self.lower + width * k as f64)
    }
}

/// Evaluate the objective over `grid` and return the best parameter vector.
///
/// Parameters other than `grid.index` keep their value from `start`.
pub fn grid_search<O>(
    objective: &O,
    start: &Matrix,
    grid: &GridSearch,
) -> Result<Matrix, EstimationError>
where
    O: DifferentiableObjective + ?Sized,
{
    objective.check_parameters(start)?;
    grid.validate()?;
    if grid.index >= objective.n_parameters() {
        return Err(ConfigurationError::InvalidParameter {
            name: "grid",
            reason: format!(
                "parameter index {} out of range for {} parameters",
                grid.index,
                objective.n_parameters()
            ),
        }
        .into());
    }

    let mut best: Option<(f64, Matrix)> = None;
    for value in grid.values() {
        let mut candidate = start.clone();
        candidate.put(grid.index, 0, value);
        let objective_value = objective.value(&candidate)?;
        debug!(
            "grid search: parameter {} = {}: objective {}",
            grid.index, value, objective_value
        );
        if objective_value.is_finite()
            && best.as_ref().map_or(true, |(b, _)| objective_value > *b)
        {
            best = Some((objective_value, candidate));
        }
    }

    best.map(|(_, parameters)| parameters).ok_or_else(|| {
        EstimationError::Numerical("objective is not finite at any grid point".to_string())
    })
}
