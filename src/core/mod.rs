//! Core types for model estimation.

mod error;
mod family;
mod link;
mod options;
mod result;

pub use error::ConfigurationError;
pub use family::{Family, FamilyKind};
pub use link::Link;
pub use options::{
    ConvergenceCriterion, OptimizerOptions, OptimizerOptionsBuilder, OptionsError,
};
pub use result::{EstimationResult, ModelStatus};
