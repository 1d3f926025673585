//! Configuration errors raised when a model, family or distribution is built.

use super::family::FamilyKind;
use super::link::Link;
use crate::data::DistanceError;
use crate::utils::MatrixError;
use thiserror::Error;

/// Errors raised at construction time, never deferred to fitting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("link {link:?} is not admissible for the {family:?} family")]
    IncompatibleLink { family: FamilyKind, link: Link },

    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("malformed model definition '{formula}': {reason}")]
    MalformedFormula { formula: String, reason: String },

    #[error("unknown field '{0}'")]
    UnknownField(String),

    #[error("field '{field}' must be numeric")]
    NonNumericField { field: String },

    #[error("variance matrix must be symmetric positive definite")]
    NonPositiveDefiniteVariance,

    #[error("invalid bounds for parameter {index}: lower {lower} must not exceed upper {upper}")]
    InvalidBounds { index: usize, lower: f64, upper: f64 },

    #[error("starting value {value} of parameter {index} lies outside [{lower}, {upper}]")]
    StartOutsideBounds {
        index: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },

    #[error("invalid response at row {row}: {reason}")]
    InvalidResponse { row: usize, reason: String },

    #[error("invalid record {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    #[error("expected {expected} starting values, got {got}")]
    StartingValuesLength { expected: usize, got: usize },

    #[error(transparent)]
    Matrix(#[from] MatrixError),

    #[error(transparent)]
    Distance(#[from] DistanceError),
}
