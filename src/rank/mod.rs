//! # Rank analysis
//!
//! Pivoted Gaussian elimination of a value matrix with first-order propagation of element
//! variances through the same swaps and row operations. The diagonal of the reduced matrix,
//! compared against its propagated standard deviation, indicates how many rows carry
//! significant information (the numerical rank of the data).
//!
//! Errors are supplied in standard-deviation units through an [`ErrorModel`] and squared
//! internally. Reduction runs once, on the first query, and is cached.

use log::debug;
use ndarray::{Array1, Array2, ArrayView2};
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::{AnalysisError, Result};
use crate::scores::ScoreMatrix;
use crate::statistics::distributions::two_tailed_normal_p;
use crate::utils::Direction;

/// How the measurement errors of the value matrix are specified.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorModel {
    /// One standard deviation per element. `NaN` marks a missing error.
    Elementwise(Array2<f64>),
    /// One standard deviation per row, shared by every column of that row.
    PerRow(Vec<f64>),
    /// One standard deviation for the whole matrix.
    Common(f64),
    /// No errors known; each element gets a rough estimate of its rounding error.
    RoundingEstimate,
}

/// Rough rounding error of a double: `10^floor(log10|v|) * 5e-16`, zero for zero.
pub fn rounding_error(value: f64) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    10f64.powf(value.abs().log10().floor()) * 5e-16
}

/// Output of one reduction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reduction {
    /// Upper-triangular reduced values; rows past the diagonal length are zero.
    pub values: Array2<f64>,
    /// Propagated standard deviations, shaped like `values`.
    pub errors: Array2<f64>,
    pub diagonal_values: Array1<f64>,
    pub diagonal_errors: Array1<f64>,
    /// `|value / error|` per diagonal position; zero when both are zero.
    pub ratios: Array1<f64>,
    /// Two-tailed standard normal probability of each ratio.
    pub probability_values: Array1<f64>,
    /// McMullen-Jaskunas-Tinoco criterion `sqrt(Σ_{j>=i} v[i][j]²) / (nColumns - i)`.
    pub mcmullen_values: Array1<f64>,
}

/// Reduces `values` with element variances `variances` (same shape).
pub fn reduce(values: ArrayView2<f64>, variances: ArrayView2<f64>) -> Result<Reduction> {
    if values.dim() != variances.dim() {
        return Err(AnalysisError::invalid(format!(
            "value matrix is {:?} but variance matrix is {:?}",
            values.dim(),
            variances.dim()
        )));
    }
    let (n_rows, n_cols) = values.dim();
    if n_rows == 0 || n_cols == 0 {
        return Err(AnalysisError::InsufficientData {
            operation: "rank reduction",
            what: "matrix elements",
            required: 1,
            actual: 0,
        });
    }
    let n_diagonal = n_rows.min(n_cols);

    let mut v = values.to_owned();
    let mut e = variances.to_owned();

    for i in 0..n_diagonal - 1 {
        let (pivot_row, pivot_col) = find_pivot(&v, i);
        swap_rows(&mut v, i, pivot_row);
        swap_rows(&mut e, i, pivot_row);
        swap_columns(&mut v, i, pivot_col);
        swap_columns(&mut e, i, pivot_col);

        let pivot = v[[i, i]];
        let pivot_variance = e[[i, i]];
        for j in (i + 1)..n_rows {
            // Column i of row j is overwritten first; keep the pre-step values
            let vji = v[[j, i]];
            let eji = e[[j, i]];
            let ratio1 = if vji == pivot { 1.0 } else { vji / pivot };
            for k in i..n_cols {
                let vik = v[[i, k]];
                let ratio2 = if vik == pivot { 1.0 } else { vik / pivot };
                v[[j, k]] -= ratio1 * vik;
                e[[j, k]] += e[[i, k]] * ratio1 * ratio1
                    + eji * ratio2 * ratio2
                    + pivot_variance * ratio1 * ratio1 * ratio2 * ratio2;
            }
        }
    }

    e.mapv_inplace(f64::sqrt);
    for i in 0..n_rows {
        for j in 0..n_cols.min(i) {
            v[[i, j]] = 0.0;
            e[[i, j]] = 0.0;
        }
        if i >= n_diagonal {
            v.row_mut(i).fill(0.0);
            e.row_mut(i).fill(0.0);
        }
    }

    let diagonal_values = Array1::from_shape_fn(n_diagonal, |i| v[[i, i]]);
    let diagonal_errors = Array1::from_shape_fn(n_diagonal, |i| e[[i, i]]);
    let ratios = Array1::from_iter(diagonal_values.iter().zip(diagonal_errors.iter()).map(
        |(&value, &error)| {
            if value == 0.0 && error == 0.0 {
                0.0
            } else {
                (value / error).abs()
            }
        },
    ));
    let probability_values = ratios
        .iter()
        .map(|&r| two_tailed_normal_p(r))
        .collect::<Result<Array1<f64>>>()?;
    let mcmullen_values = Array1::from_shape_fn(n_diagonal, |i| {
        let sum: f64 = v.row(i).iter().skip(i).map(|&x| x * x).sum();
        sum.sqrt() / (n_cols - i) as f64
    });

    debug!(
        "rank reduction of {}x{} matrix: diagonal ratios {:?}",
        n_rows, n_cols, ratios
    );

    Ok(Reduction {
        values: v,
        errors: e,
        diagonal_values,
        diagonal_errors,
        ratios,
        probability_values,
        mcmullen_values,
    })
}

/// Largest magnitude in the submatrix starting at `(from, from)`, first in row-major order.
fn find_pivot(v: &Array2<f64>, from: usize) -> (usize, usize) {
    let (n_rows, n_cols) = v.dim();
    let mut best = (from, from);
    let mut max = v[[from, from]].abs();
    for r in from..n_rows {
        for c in from..n_cols {
            if v[[r, c]].abs() > max {
                max = v[[r, c]].abs();
                best = (r, c);
            }
        }
    }
    best
}

fn swap_rows(m: &mut Array2<f64>, a: usize, b: usize) {
    if a != b {
        for c in 0..m.ncols() {
            m.swap([a, c], [b, c]);
        }
    }
}

fn swap_columns(m: &mut Array2<f64>, a: usize, b: usize) {
    if a != b {
        for r in 0..m.nrows() {
            m.swap([r, a], [r, b]);
        }
    }
}

/// A value matrix with its measurement errors, reduced lazily on first query.
#[derive(Debug, Clone)]
pub struct RankModel {
    values: Array2<f64>,
    errors: Array2<f64>,
    n_missing_errors: usize,
    substitution: Direction,
    reduction: OnceLock<Result<Reduction>>,
}

impl RankModel {
    /// Builds a model, filling missing errors from the mean of their row.
    pub fn new(values: Array2<f64>, model: ErrorModel) -> Result<Self> {
        Self::with_substitution(values, model, Direction::ROW)
    }

    /// Builds a model, filling missing errors from the mean of their row or column.
    pub fn with_substitution(
        values: Array2<f64>,
        model: ErrorModel,
        substitution: Direction,
    ) -> Result<Self> {
        let (n_rows, n_cols) = values.dim();
        if n_rows == 0 || n_cols == 0 {
            return Err(AnalysisError::InsufficientData {
                operation: "rank analysis",
                what: "matrix elements",
                required: 1,
                actual: 0,
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::invalid("rank analysis values must be finite"));
        }

        let mut errors = match model {
            ErrorModel::Elementwise(errors) => {
                if errors.dim() != values.dim() {
                    return Err(AnalysisError::invalid(format!(
                        "error matrix is {:?} but value matrix is {:?}",
                        errors.dim(),
                        values.dim()
                    )));
                }
                errors
            }
            ErrorModel::PerRow(row_errors) => {
                if row_errors.len() != n_rows {
                    return Err(AnalysisError::invalid(format!(
                        "{} row errors supplied for {} rows",
                        row_errors.len(),
                        n_rows
                    )));
                }
                Array2::from_shape_fn((n_rows, n_cols), |(i, _)| row_errors[i])
            }
            ErrorModel::Common(error) => {
                if !error.is_finite() {
                    return Err(AnalysisError::invalid("common error must be finite"));
                }
                Array2::from_elem((n_rows, n_cols), error)
            }
            ErrorModel::RoundingEstimate => values.mapv(rounding_error),
        };
        if errors.iter().any(|e| e.is_infinite()) {
            return Err(AnalysisError::invalid("errors must be finite or NaN for missing"));
        }
        errors.mapv_inplace(f64::abs);
        let n_missing_errors = substitute_missing(&mut errors, substitution)?;
        if n_missing_errors > 0 {
            debug!(
                "substituted {} missing errors with {:?} means",
                n_missing_errors, substitution
            );
        }

        Ok(RankModel {
            values,
            errors,
            n_missing_errors,
            substitution,
            reduction: OnceLock::new(),
        })
    }

    /// Item × person scores with each item's standard deviation as its row error.
    pub fn from_scores(scores: &ScoreMatrix) -> Result<Self> {
        let sds = scores.item_standard_deviations().to_vec();
        Self::new(scores.data().to_owned(), ErrorModel::PerRow(sds))
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_columns(&self) -> usize {
        self.values.ncols()
    }

    pub fn n_diagonal_elements(&self) -> usize {
        self.n_rows().min(self.n_columns())
    }

    pub fn n_missing_errors(&self) -> usize {
        self.n_missing_errors
    }

    pub fn substitution(&self) -> Direction {
        self.substitution
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Errors as standard deviations, after missing-value substitution.
    pub fn errors(&self) -> &Array2<f64> {
        &self.errors
    }

    pub fn reduction(&self) -> Result<&Reduction> {
        self.reduction
            .get_or_init(|| {
                let variances = self.errors.mapv(|e| e * e);
                reduce(self.values.view(), variances.view())
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn reduced_values(&self) -> Result<&Array2<f64>> {
        Ok(&self.reduction()?.values)
    }

    pub fn reduced_errors(&self) -> Result<&Array2<f64>> {
        Ok(&self.reduction()?.errors)
    }

    pub fn reduced_values_diagonal(&self) -> Result<&Array1<f64>> {
        Ok(&self.reduction()?.diagonal_values)
    }

    pub fn reduced_errors_diagonal(&self) -> Result<&Array1<f64>> {
        Ok(&self.reduction()?.diagonal_errors)
    }

    pub fn reduced_ratios_diagonal(&self) -> Result<&Array1<f64>> {
        Ok(&self.reduction()?.ratios)
    }

    pub fn probability_values(&self) -> Result<&Array1<f64>> {
        Ok(&self.reduction()?.probability_values)
    }

    pub fn mcmullen_values(&self) -> Result<&Array1<f64>> {
        Ok(&self.reduction()?.mcmullen_values)
    }
}

/// Replaces `NaN` errors with the mean of the supplied errors in the same row or column.
///
/// The mean is taken over standard deviations, before squaring. Averaging the variances
/// instead gives a larger substitute whenever the supplied errors differ.
fn substitute_missing(errors: &mut Array2<f64>, direction: Direction) -> Result<usize> {
    let lane_means: Vec<Option<f64>> = match direction {
        Direction::ROW => errors.rows().into_iter().map(|lane| nan_mean(lane.iter())).collect(),
        Direction::COLUMN => errors
            .columns()
            .into_iter()
            .map(|lane| nan_mean(lane.iter()))
            .collect(),
    };

    let mut missing = 0;
    for ((i, j), e) in errors.indexed_iter_mut() {
        if e.is_nan() {
            let lane = if direction.is_row() { i } else { j };
            *e = lane_means[lane].ok_or_else(|| {
                AnalysisError::invalid(format!(
                    "{} {} has no supplied errors to substitute from",
                    if direction.is_row() { "row" } else { "column" },
                    lane
                ))
            })?;
            missing += 1;
        }
    }
    Ok(missing)
}

fn nan_mean<'a>(values: impl Iterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| !v.is_nan())
        .fold((0.0, 0usize), |(s, c), &v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
