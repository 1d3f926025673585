//! Statistical inference (standard errors, p-values, confidence intervals).

mod coefficient;
mod summary;

pub use coefficient::{CoefficientInference, ReferenceDistribution};
pub use summary::{CoefficientRow, CoefficientTable};
