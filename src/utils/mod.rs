//! Linear algebra utilities.

mod matrix;

pub use matrix::{detect_constant_columns, Matrix, MatrixError};
