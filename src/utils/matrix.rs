//! Dense matrix type used throughout the estimation engine.
//!
//! `Matrix` wraps a `faer::Mat<f64>` and adds dimension-checked operations.
//! Every operation that requires conformable operands returns a
//! [`MatrixError`] instead of panicking, and every operation returns a new
//! instance except the explicit in-place setters.

use faer::linalg::solvers::{Llt, Solve};
use faer::{Col, Mat, Side};
use thiserror::Error;

/// Relative tolerance on the diagonal of R below which a matrix is singular.
const SINGULARITY_TOLERANCE: f64 = 1e-13;

/// Errors raised by matrix operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatrixError {
    #[error(
        "dimension mismatch in {operation}: left is {left_rows}x{left_cols}, right is {right_rows}x{right_cols}"
    )]
    DimensionMismatch {
        operation: &'static str,
        left_rows: usize,
        left_cols: usize,
        right_rows: usize,
        right_cols: usize,
    },

    #[error("index ({row}, {col}) out of bounds for a {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("matrix is singular or nearly singular")]
    Singular,

    #[error("matrix is not positive definite")]
    NotPositiveDefinite,

    #[error("expected {expected} values, got {got}")]
    InvalidLength { expected: usize, got: usize },
}

/// A dense, row/column indexed matrix of `f64` values.
#[derive(Debug, Clone)]
pub struct Matrix {
    data: Mat<f64>,
}

impl PartialEq for Matrix {
    fn eq(&self, other: &Self) -> bool {
        self.nrows() == other.nrows()
            && self.ncols() == other.ncols()
            && (0..self.nrows())
                .all(|i| (0..self.ncols()).all(|j| self.data[(i, j)] == other.data[(i, j)]))
    }
}

impl Matrix {
    // ========== Constructors ==========

    /// Create a matrix filled with zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: Mat::zeros(nrows, ncols),
        }
    }

    /// Create a matrix with every entry set to `value`.
    pub fn filled(nrows: usize, ncols: usize, value: f64) -> Self {
        Self {
            data: Mat::from_fn(nrows, ncols, |_, _| value),
        }
    }

    /// Create an identity matrix of size `n`.
    pub fn identity(n: usize) -> Self {
        Self {
            data: Mat::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 }),
        }
    }

    /// Create a matrix by evaluating `f(i, j)` at every position.
    pub fn from_fn(nrows: usize, ncols: usize, f: impl FnMut(usize, usize) -> f64) -> Self {
        Self {
            data: Mat::from_fn(nrows, ncols, f),
        }
    }

    /// Create a matrix from row-major values.
    pub fn from_vec(nrows: usize, ncols: usize, values: Vec<f64>) -> Result<Self, MatrixError> {
        if values.len() != nrows * ncols {
            return Err(MatrixError::InvalidLength {
                expected: nrows * ncols,
                got: values.len(),
            });
        }
        Ok(Self::from_fn(nrows, ncols, |i, j| values[i * ncols + j]))
    }

    /// Create a matrix from explicit rows. All rows must have the same length.
    pub fn from_rows(rows: &[&[f64]]) -> Result<Self, MatrixError> {
        let nrows = rows.len();
        let ncols = rows.first().map_or(0, |r| r.len());
        if let Some(bad) = rows.iter().find(|r| r.len() != ncols) {
            return Err(MatrixError::InvalidLength {
                expected: ncols,
                got: bad.len(),
            });
        }
        Ok(Self::from_fn(nrows, ncols, |i, j| rows[i][j]))
    }

    /// Create a column vector.
    pub fn column(values: &[f64]) -> Self {
        Self::from_fn(values.len(), 1, |i, _| values[i])
    }

    /// Wrap an existing faer matrix.
    pub fn from_faer(data: Mat<f64>) -> Self {
        Self { data }
    }

    /// Create a column vector from a faer column.
    pub fn from_col(col: &Col<f64>) -> Self {
        Self::from_fn(col.nrows(), 1, |i, _| col[i])
    }

    // ========== Shape and access ==========

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    /// True when the matrix has a single column.
    pub fn is_column_vector(&self) -> bool {
        self.ncols() == 1
    }

    /// True when the matrix has as many rows as columns.
    pub fn is_square(&self) -> bool {
        self.nrows() == self.ncols()
    }

    /// Borrow the underlying faer matrix.
    pub fn as_faer(&self) -> &Mat<f64> {
        &self.data
    }

    /// Get the value at `(row, col)` with bounds checking.
    pub fn get_value_at(&self, row: usize, col: usize) -> Result<f64, MatrixError> {
        self.check_index(row, col)?;
        Ok(self.data[(row, col)])
    }

    /// Set the value at `(row, col)` with bounds checking.
    pub fn set_value_at(&mut self, row: usize, col: usize, value: f64) -> Result<(), MatrixError> {
        self.check_index(row, col)?;
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Unchecked read used by hot loops inside the crate.
    #[inline]
    pub(crate) fn at(&self, row: usize, col: usize) -> f64 {
        self.data[(row, col)]
    }

    /// Unchecked write used by hot loops inside the crate.
    #[inline]
    pub(crate) fn put(&mut self, row: usize, col: usize, value: f64) {
        self.data[(row, col)] = value;
    }

    /// Add `value` to the entry at `(row, col)`.
    #[inline]
    pub(crate) fn accumulate(&mut self, row: usize, col: usize, value: f64) {
        self.data[(row, col)] += value;
    }

    fn check_index(&self, row: usize, col: usize) -> Result<(), MatrixError> {
        if row >= self.nrows() || col >= self.ncols() {
            return Err(MatrixError::IndexOutOfBounds {
                row,
                col,
                rows: self.nrows(),
                cols: self.ncols(),
            });
        }
        Ok(())
    }

    /// Row-major copy of all values.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.nrows() * self.ncols());
        for i in 0..self.nrows() {
            for j in 0..self.ncols() {
                out.push(self.data[(i, j)]);
            }
        }
        out
    }

    /// Values of a single row.
    pub fn row(&self, i: usize) -> Vec<f64> {
        (0..self.ncols()).map(|j| self.data[(i, j)]).collect()
    }

    // ========== Arithmetic ==========

    fn check_same_shape(&self, other: &Matrix, operation: &'static str) -> Result<(), MatrixError> {
        if self.nrows() != other.nrows() || self.ncols() != other.ncols() {
            return Err(self.mismatch(other, operation));
        }
        Ok(())
    }

    fn mismatch(&self, other: &Matrix, operation: &'static str) -> MatrixError {
        MatrixError::DimensionMismatch {
            operation,
            left_rows: self.nrows(),
            left_cols: self.ncols(),
            right_rows: other.nrows(),
            right_cols: other.ncols(),
        }
    }

    pub fn add(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        self.check_same_shape(other, "add")?;
        Ok(Self::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.data[(i, j)] + other.data[(i, j)]
        }))
    }

    pub fn subtract(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        self.check_same_shape(other, "subtract")?;
        Ok(Self::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.data[(i, j)] - other.data[(i, j)]
        }))
    }

    /// Matrix product `self · other`.
    pub fn multiply(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        if self.ncols() != other.nrows() {
            return Err(self.mismatch(other, "multiply"));
        }
        Ok(Self {
            data: &self.data * &other.data,
        })
    }

    pub fn scalar_multiply(&self, scalar: f64) -> Matrix {
        Self::from_fn(self.nrows(), self.ncols(), |i, j| scalar * self.data[(i, j)])
    }

    pub fn element_wise_multiply(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        self.check_same_shape(other, "element_wise_multiply")?;
        Ok(Self::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.data[(i, j)] * other.data[(i, j)]
        }))
    }

    /// Element-wise quotient. Division by zero follows IEEE semantics.
    pub fn element_wise_divide(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        self.check_same_shape(other, "element_wise_divide")?;
        Ok(Self::from_fn(self.nrows(), self.ncols(), |i, j| {
            self.data[(i, j)] / other.data[(i, j)]
        }))
    }

    pub fn transpose(&self) -> Matrix {
        Self::from_fn(self.ncols(), self.nrows(), |i, j| self.data[(j, i)])
    }

    /// Sum of all entries.
    pub fn sum(&self) -> f64 {
        self.to_vec().iter().sum()
    }

    /// Inner product of two column vectors of equal length.
    pub fn inner_product(&self, other: &Matrix) -> Result<f64, MatrixError> {
        if !self.is_column_vector() || !other.is_column_vector() || self.nrows() != other.nrows()
        {
            return Err(self.mismatch(other, "inner_product"));
        }
        Ok((0..self.nrows())
            .map(|i| self.data[(i, 0)] * other.data[(i, 0)])
            .sum())
    }

    /// Largest absolute entry (0 for an empty matrix).
    pub fn max_abs(&self) -> f64 {
        self.to_vec().iter().fold(0.0_f64, |acc, v| acc.max(v.abs()))
    }

    /// True when every entry is finite.
    pub fn is_finite(&self) -> bool {
        self.to_vec().iter().all(|v| v.is_finite())
    }

    // ========== Structure ==========

    /// Diagonal entries as a column vector.
    pub fn diagonal_vector(&self) -> Matrix {
        let n = self.nrows().min(self.ncols());
        Self::from_fn(n, 1, |i, _| self.data[(i, i)])
    }

    /// Create a square matrix with `values` on the diagonal.
    pub fn diagonal(values: &[f64]) -> Matrix {
        let n = values.len();
        Self::from_fn(n, n, |i, j| if i == j { values[i] } else { 0.0 })
    }

    /// Extract the rows and columns listed, in the order given.
    pub fn sub_matrix(&self, rows: &[usize], cols: &[usize]) -> Result<Matrix, MatrixError> {
        for &i in rows {
            for &j in cols {
                self.check_index(i, j)?;
            }
        }
        Ok(Self::from_fn(rows.len(), cols.len(), |i, j| {
            self.data[(rows[i], cols[j])]
        }))
    }

    /// Extract the contiguous block `[row_start, row_end] x [col_start, col_end]` (inclusive).
    pub fn sub_matrix_range(
        &self,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> Result<Matrix, MatrixError> {
        let rows: Vec<usize> = (row_start..=row_end).collect();
        let cols: Vec<usize> = (col_start..=col_end).collect();
        self.sub_matrix(&rows, &cols)
    }

    /// Stack `other` below `self`.
    pub fn stack_rows(&self, other: &Matrix) -> Result<Matrix, MatrixError> {
        if self.ncols() != other.ncols() {
            return Err(self.mismatch(other, "stack_rows"));
        }
        let n = self.nrows();
        Ok(Self::from_fn(n + other.nrows(), self.ncols(), |i, j| {
            if i < n {
                self.data[(i, j)]
            } else {
                other.data[(i - n, j)]
            }
        }))
    }

    /// True when the matrix is square and `|a_ij - a_ji| <= tolerance` everywhere.
    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        self.is_square()
            && (0..self.nrows()).all(|i| {
                (0..i).all(|j| (self.data[(i, j)] - self.data[(j, i)]).abs() <= tolerance)
            })
    }

    // ========== Decompositions ==========

    fn check_square(&self) -> Result<(), MatrixError> {
        if !self.is_square() {
            return Err(MatrixError::NotSquare {
                rows: self.nrows(),
                cols: self.ncols(),
            });
        }
        Ok(())
    }

    /// Inverse of a square matrix, computed from its QR decomposition.
    pub fn invert(&self) -> Result<Matrix, MatrixError> {
        self.check_square()?;
        let n = self.nrows();
        if n == 0 {
            return Ok(Matrix::zeros(0, 0));
        }
        if !self.is_finite() {
            return Err(MatrixError::Singular);
        }

        let qr = self.data.qr();
        let q = qr.compute_Q();
        let r = qr.R();

        let scale = (0..n).fold(0.0_f64, |acc, i| acc.max(r[(i, i)].abs()));
        if scale == 0.0 || (0..n).any(|i| r[(i, i)].abs() <= SINGULARITY_TOLERANCE * scale) {
            return Err(MatrixError::Singular);
        }

        // Solve R x = Q' e_col for every column of the identity.
        let mut inverse = Mat::zeros(n, n);
        for col in 0..n {
            let mut sol = vec![0.0; n];
            for i in (0..n).rev() {
                let mut sum = q[(col, i)];
                for j in (i + 1)..n {
                    sum -= r[(i, j)] * sol[j];
                }
                sol[i] = sum / r[(i, i)];
            }
            for (i, value) in sol.into_iter().enumerate() {
                inverse[(i, col)] = value;
            }
        }

        Ok(Self { data: inverse })
    }

    fn llt(&self) -> Result<Llt<f64>, MatrixError> {
        self.check_square()?;
        if !self.is_finite() {
            return Err(MatrixError::NotPositiveDefinite);
        }
        self.data
            .llt(Side::Lower)
            .map_err(|_| MatrixError::NotPositiveDefinite)
    }

    /// Lower-triangular Cholesky factor `L` with `self = L·L'`.
    pub fn cholesky(&self) -> Result<Matrix, MatrixError> {
        let factor = self.llt()?;
        Ok(Self {
            data: factor.L().to_owned(),
        })
    }

    /// Solve `self · x = rhs` for a symmetric positive definite `self`.
    pub fn solve_positive_definite(&self, rhs: &Matrix) -> Result<Matrix, MatrixError> {
        if rhs.nrows() != self.nrows() {
            return Err(self.mismatch(rhs, "solve_positive_definite"));
        }
        let factor = self.llt()?;
        Ok(Self {
            data: factor.solve(rhs.data.as_ref()),
        })
    }

    /// Determinant, from faer's LU decomposition with partial pivoting.
    pub fn determinant(&self) -> Result<f64, MatrixError> {
        self.check_square()?;
        if self.nrows() == 0 {
            return Ok(1.0);
        }
        Ok(self.data.determinant())
    }
}

/// Flag columns whose values are all equal within `tolerance`.
pub fn detect_constant_columns(x: &Matrix, tolerance: f64) -> Vec<bool> {
    let n_cols = x.ncols();
    let n_rows = x.nrows();

    if n_rows == 0 {
        return vec![true; n_cols];
    }

    (0..n_cols)
        .map(|j| {
            let first = x.at(0, j);
            (1..n_rows).all(|i| (x.at(i, j) - first).abs() < tolerance)
        })
        .collect()
}
