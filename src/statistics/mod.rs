//! Covariance, correlation and partial-correlation matrices of item scores, plus the
//! sphericity statistics built on top of them.

use ndarray::{Array2, ArrayView2, Axis};
use serde::Serialize;

use crate::dense::cofactor_matrix;
use crate::error::{AnalysisError, Result};
use crate::scores::ScoreMatrix;
use crate::utils::VarianceDenominator;

pub mod distributions;
pub mod sphericity;

pub use sphericity::{bartlett, kmo, BartlettTest, Kmo};

/// Item × item association matrices derived from one score matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixStats {
    pub covariance: Array2<f64>,
    pub correlation: Array2<f64>,
    pub partial_correlation: Array2<f64>,
}

impl MatrixStats {
    pub fn compute(scores: &ScoreMatrix) -> Result<Self> {
        let covariance = covariance(scores.data(), scores.denominator())?;
        let correlation = correlation(covariance.view());
        let partial_correlation = partial_correlation(correlation.view())?;
        Ok(MatrixStats {
            covariance,
            correlation,
            partial_correlation,
        })
    }
}

/// Covariance of the rows of an item × person matrix,
/// `(X - rowMeans)(X - rowMeans)^T / denom`.
pub fn covariance(data: ArrayView2<f64>, denominator: VarianceDenominator) -> Result<Array2<f64>> {
    let n_persons = data.ncols();
    let required = match denominator {
        VarianceDenominator::Sample => 2,
        VarianceDenominator::Population => 1,
    };
    if n_persons < required {
        return Err(AnalysisError::InsufficientData {
            operation: "covariance",
            what: "persons",
            required,
            actual: n_persons,
        });
    }
    let means = data.sum_axis(Axis(1)) / n_persons as f64;
    let centered = &data - &means.insert_axis(Axis(1));
    let mut cov = centered.dot(&centered.t());
    cov /= denominator.divisor(n_persons);
    Ok(cov)
}

/// Correlation matrix from a covariance matrix.
///
/// Entries whose ratio is not a number (zero-variance items) are set to zero and the diagonal
/// is exactly one.
pub fn correlation(covariance: ArrayView2<f64>) -> Array2<f64> {
    let n = covariance.nrows();
    Array2::from_shape_fn((n, n), |(i, j)| {
        if i == j {
            return 1.0;
        }
        let r = covariance[[i, j]] / (covariance[[i, i]] * covariance[[j, j]]).sqrt();
        if r.is_nan() {
            0.0
        } else {
            r
        }
    })
}

/// Partial correlations from the cofactors `C` of the correlation matrix:
/// `-C[i][j] / sqrt(C[i][i] * C[j][j])`, with one on the diagonal and one wherever the three
/// cofactors involved are all exactly zero.
///
/// Only the upper triangle is computed; the lower one mirrors it, so the result is exactly
/// symmetric even when the cofactors of a near-singular matrix are rounding noise.
pub fn partial_correlation(correlation: ArrayView2<f64>) -> Result<Array2<f64>> {
    let c = cofactor_matrix(correlation)?;
    let n = c.nrows();
    let mut partial = Array2::ones((n, n));
    for i in 0..n {
        for j in (i + 1)..n {
            if c[[i, j]] == 0.0 && c[[i, i]] == 0.0 && c[[j, j]] == 0.0 {
                continue;
            }
            let value = -c[[i, j]] / (c[[i, i]] * c[[j, j]]).sqrt();
            partial[[i, j]] = value;
            partial[[j, i]] = value;
        }
    }
    Ok(partial)
}
