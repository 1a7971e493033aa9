//! Dense linear algebra helpers.
//!
//! Score matrices live in `ndarray` containers; determinants and eigen-decompositions are
//! delegated to `nalgebra`. This module holds the conversions between the two and the few
//! derived quantities (cofactors, axis rescaling) the analyses need.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

use crate::error::{AnalysisError, Result};
use crate::utils::Direction;

pub fn to_nalgebra(x: ArrayView2<f64>) -> DMatrix<f64> {
    let (rows, cols) = x.dim();
    DMatrix::from_fn(rows, cols, |i, j| x[[i, j]])
}

pub fn from_nalgebra(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

pub fn determinant(x: ArrayView2<f64>) -> Result<f64> {
    ensure_square(x, "determinant")?;
    Ok(to_nalgebra(x).determinant())
}

/// Signed minor of entry `(row, col)`.
pub fn cofactor(x: ArrayView2<f64>, row: usize, col: usize) -> Result<f64> {
    let n = ensure_square(x, "cofactor")?;
    if row >= n || col >= n {
        return Err(AnalysisError::invalid(format!(
            "cofactor index ({}, {}) outside a {}x{} matrix",
            row, col, n, n
        )));
    }
    Ok(signed_minor(&to_nalgebra(x), row, col))
}

/// Matrix of all cofactors, `c[i][j] = (-1)^(i+j) * minor(i, j)`.
pub fn cofactor_matrix(x: ArrayView2<f64>) -> Result<Array2<f64>> {
    let n = ensure_square(x, "cofactor")?;
    let m = to_nalgebra(x);
    Ok(Array2::from_shape_fn((n, n), |(i, j)| signed_minor(&m, i, j)))
}

fn signed_minor(m: &DMatrix<f64>, row: usize, col: usize) -> f64 {
    if m.nrows() == 1 {
        return 1.0;
    }
    let minor = m.clone().remove_row(row).remove_column(col).determinant();
    if (row + col) % 2 == 0 {
        minor
    } else {
        -minor
    }
}

fn ensure_square(x: ArrayView2<f64>, operation: &str) -> Result<usize> {
    let (rows, cols) = x.dim();
    if rows != cols || rows == 0 {
        return Err(AnalysisError::invalid(format!(
            "{} requires a non-empty square matrix, got {}x{}",
            operation, rows, cols
        )));
    }
    Ok(rows)
}

/// Multiplies every row (or column) of a matrix by its own factor.
pub trait Rescale {
    fn rescale(&mut self, factors: &[f64], direction: &Direction) -> Result<()>;
}

impl Rescale for Array2<f64> {
    fn rescale(&mut self, factors: &[f64], direction: &Direction) -> Result<()> {
        match direction {
            Direction::ROW => {
                if factors.len() != self.nrows() {
                    return Err(AnalysisError::invalid(format!(
                        "Length of factors ({}) does not match number of rows ({})",
                        factors.len(),
                        self.nrows()
                    )));
                }
                for (mut row, &f) in self.rows_mut().into_iter().zip(factors) {
                    row.mapv_inplace(|v| v * f);
                }
            }
            Direction::COLUMN => {
                if factors.len() != self.ncols() {
                    return Err(AnalysisError::invalid(format!(
                        "Length of factors ({}) does not match number of columns ({})",
                        factors.len(),
                        self.ncols()
                    )));
                }
                for (mut col, &f) in self.columns_mut().into_iter().zip(factors) {
                    col.mapv_inplace(|v| v * f);
                }
            }
        }
        Ok(())
    }
}
