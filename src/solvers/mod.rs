//! Estimators: the Newton optimizer and the models built on it.

mod copula;
mod glm;
mod newton;
mod ols;
mod traits;

pub use copula::{
    is_admissible_dependence, CopulaModel, CopulaModelBuilder, CopulaObjective,
    CopulaSpecification, Dependence, FittedCopulaModel,
};
pub use glm::{FittedGlm, GeneralizedLinearModel, GeneralizedLinearModelBuilder, GlmObjective};
pub use newton::{
    grid_search, Bounds, GridSearch, IterationState, NewtonOptimizer, OptimizationResult,
    OptimizationStatus,
};
pub use ols::{solve_normal_equations, FittedLinearModel, LinearModel};
pub use traits::{DifferentiableObjective, EstimationError, Evaluation, FittedModel, Model};
