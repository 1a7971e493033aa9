//! Ordering of a raw eigen-decomposition and the quantities derived from it.

use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

use super::RawEigen;
use crate::error::{AnalysisError, Result};
use crate::utils::{cumulative, descending_order};

/// Eigenvalues and eigenvectors as produced by the decomposition, together with a descending
/// view of them.
///
/// Eigenvectors are stored as columns: column `j` of `vectors` belongs to `values[j]`.
/// `permutation[k]` is the decomposition index of the `k`-th largest eigenvalue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EigenSpectrum {
    values: Array1<f64>,
    vectors: Array2<f64>,
    ordered_values: Array1<f64>,
    ordered_vectors: Array2<f64>,
    permutation: Vec<usize>,
}

impl EigenSpectrum {
    pub fn from_decomposition(raw: RawEigen) -> Result<Self> {
        let n = raw.values.len();
        if raw.vectors.dim() != (n, n) {
            return Err(AnalysisError::invalid(format!(
                "{} eigenvalues but eigenvector matrix is {:?}",
                n,
                raw.vectors.dim()
            )));
        }
        let values = raw.values;
        let permutation = descending_order(&values.to_vec());
        let ordered_values = values.select(Axis(0), &permutation);
        let ordered_vectors = raw.vectors.select(Axis(1), &permutation);

        Ok(EigenSpectrum {
            values,
            vectors: raw.vectors,
            ordered_values,
            ordered_vectors,
            permutation,
        })
    }

    pub fn n_components(&self) -> usize {
        self.values.len()
    }

    /// Eigenvalues in decomposition order.
    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    /// Eigenvectors as columns, in decomposition order.
    pub fn vectors(&self) -> &Array2<f64> {
        &self.vectors
    }

    pub fn ordered_values(&self) -> &Array1<f64> {
        &self.ordered_values
    }

    /// Eigenvectors as columns, matching [`ordered_values`](Self::ordered_values).
    pub fn ordered_vectors(&self) -> &Array2<f64> {
        &self.ordered_vectors
    }

    pub fn permutation(&self) -> &[usize] {
        &self.permutation
    }

    pub fn total(&self) -> f64 {
        self.values.sum()
    }

    /// Each ordered eigenvalue as a percentage of the eigenvalue total.
    pub fn proportion_percentage(&self) -> Array1<f64> {
        let total = self.total();
        self.ordered_values.mapv(|v| 100.0 * v / total)
    }

    pub fn cumulative_percentage(&self) -> Array1<f64> {
        Array1::from(cumulative(&self.proportion_percentage().to_vec()))
    }

    /// Number of leading eigenvalues that are at least one.
    pub fn greater_than_one_limit(&self) -> usize {
        self.ordered_values
            .iter()
            .position(|&v| v < 1.0)
            .unwrap_or(self.n_components())
    }

    /// Item × component loadings, `vector[i][j] * sqrt(|value[j]|)` on the ordered spectrum.
    pub fn loading_factors(&self) -> Array2<f64> {
        let scale = self.ordered_values.mapv(|v| v.abs().sqrt());
        &self.ordered_vectors * &scale
    }

    /// Per-item sum of squared loadings over the first `n_factors` components.
    pub fn communalities(&self, n_factors: usize) -> Result<Array1<f64>> {
        self.check_factors(n_factors)?;
        let loadings = self.loading_factors();
        Ok(loadings
            .columns()
            .into_iter()
            .take(n_factors)
            .fold(Array1::zeros(loadings.nrows()), |acc, col| {
                acc + &col.mapv(|v| v * v)
            }))
    }

    /// Square roots of the communalities; items without any loading get weight one.
    pub fn communality_weights(&self, n_factors: usize) -> Result<Array1<f64>> {
        Ok(self
            .communalities(n_factors)?
            .mapv(|c| if c == 0.0 { 1.0 } else { c.sqrt() }))
    }

    pub(crate) fn check_factors(&self, n_factors: usize) -> Result<()> {
        if n_factors == 0 || n_factors > self.n_components() {
            return Err(AnalysisError::configuration(
                "number of factors",
                n_factors,
                format!("must be between 1 and {}", self.n_components()),
            ));
        }
        Ok(())
    }
}
