//! Likelihood-based estimation of linear, generalized linear and
//! copula-augmented generalized linear models.
//!
//! Models are built from a [`Table`](data::Table) and a model definition of
//! the form `"response ~ x1 + x2 + x1:x2"`. Configuration errors (unknown
//! fields, incompatible links, starting values outside their bounds) are
//! raised when the model is built; estimation returns a fitted model whose
//! status tells whether the optimizer converged.
//!
//! # Example
//!
//! ```rust,ignore
//! use copula_glm::prelude::*;
//!
//! let fitted = GeneralizedLinearModel::builder(&table, "dead ~ dbh")
//!     .family(FamilyKind::Bernoulli)
//!     .build()?
//!     .estimate()?;
//! println!("{}", fitted.summary());
//!
//! // Mortality correlated within plots, decaying with distance
//! let spec = CopulaSpecification::distance(Link::Log, "x + y", -1.0, -0.1);
//! let fitted = CopulaModel::builder(&table, "dead ~ dbh", "plot", spec)
//!     .grid_search(-3.0, 0.0, 13)
//!     .build()?
//!     .estimate()?;
//! println!("θ at 10 m = {}", fitted.dependence_at(10.0));
//! ```

pub mod core;
pub mod data;
pub mod distributions;
pub mod inference;
pub mod solvers;
pub mod utils;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        ConfigurationError, ConvergenceCriterion, EstimationResult, Family, FamilyKind, Link,
        ModelStatus, OptimizerOptions, OptimizerOptionsBuilder,
    };
    pub use crate::data::{
        DataSet, DataStructure, DistanceRecorder, FieldType, HierarchicalStructure, Table, Value,
    };
    pub use crate::distributions::{
        Distribution, GaussianDistribution, MonteCarloEstimate, UniformDistribution,
    };
    pub use crate::inference::CoefficientTable;
    pub use crate::solvers::{
        Bounds, CopulaModel, CopulaSpecification, DifferentiableObjective, EstimationError,
        FittedCopulaModel, FittedGlm, FittedLinearModel, FittedModel, GeneralizedLinearModel,
        LinearModel, Model, NewtonOptimizer, OptimizationStatus,
    };
    pub use crate::utils::Matrix;
}

pub use crate::core::{ConfigurationError, Family, FamilyKind, Link, OptimizerOptions};
pub use crate::solvers::{EstimationError, FittedModel, Model};
pub use crate::utils::Matrix;
